use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use foodgram_api::{build_router, config::Config, connect, ingredients, AppState};

#[derive(Parser, Debug)]
#[command(name = "foodgram", version, about = "Foodgram recipe-sharing API")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default).
    Serve {
        /// Overrides BIND_ADDR.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Load ingredients from a JSON array of {name, measurement_unit}.
    LoadIngredients { path: PathBuf },
    /// Delete every ingredient.
    DeleteIngredients,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let args = Args::parse();
    let mut config = Config::load()?;
    let pool = connect(&config).await?;

    match args.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            serve(pool, config).await
        }
        Command::LoadIngredients { path } => {
            let created = ingredients::load_from_file(&pool, &path).await?;
            info!("Loaded {} new ingredients from {}", created, path.display());
            Ok(())
        }
        Command::DeleteIngredients => {
            let deleted = ingredients::delete_all(&pool).await?;
            info!("Deleted {} ingredients", deleted);
            Ok(())
        }
    }
}

async fn serve(pool: sqlx::PgPool, config: Config) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&config.media_root)
        .await
        .with_context(|| format!("cannot create media root {}", config.media_root.display()))?;

    let bind_addr = config.bind_addr.clone();
    let app = build_router(AppState::new(pool, config));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("cannot bind {bind_addr}"))?;
    info!("Foodgram API listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}
