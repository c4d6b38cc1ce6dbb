use axum::{
    http::{StatusCode, Uri},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod images;
pub mod ingredients;
pub mod membership;
pub mod models;
pub mod pagination;
pub mod recipes;
pub mod users;

use config::Config;
use images::MediaStore;

pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub media: MediaStore,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Arc<Self> {
        let media = MediaStore::new(config.media_root.clone(), config.image_output);
        Arc::new(Self { db, config, media })
    }
}

/// Opens the pool and brings the schema up to date.
pub async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    info!("Connecting to PostgreSQL...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready.");
    Ok(pool)
}

pub fn build_router(state: Arc<AppState>) -> Router {
    use handlers::{auth, ingredients, recipes, users};

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    let media = ServeDir::new(state.media.root());

    Router::new()
        .route("/readyz", get(health_check))
        .route("/auth/token/login/", post(auth::login))
        .route("/auth/token/logout/", post(auth::logout))
        .route("/users/", get(users::list_users).post(users::create_user))
        .route("/users/me/", get(users::me))
        .route(
            "/users/me/avatar/",
            get(users::get_avatar)
                .put(users::put_avatar)
                .patch(users::put_avatar)
                .delete(users::delete_avatar),
        )
        .route("/users/set_password/", post(users::set_password))
        .route("/users/subscriptions/", get(users::subscriptions))
        .route("/users/:id/", get(users::get_user))
        .route(
            "/users/:id/subscribe/",
            post(users::subscribe).delete(users::unsubscribe),
        )
        .route("/ingredients/", get(ingredients::list_ingredients))
        .route("/ingredients/:id/", get(ingredients::get_ingredient))
        .route(
            "/recipes/",
            get(recipes::list_recipes).post(recipes::create_recipe),
        )
        .route(
            "/recipes/download_shopping_cart/",
            get(recipes::download_shopping_cart),
        )
        .route(
            "/recipes/:id/",
            get(recipes::get_recipe)
                .patch(recipes::update_recipe)
                .delete(recipes::delete_recipe),
        )
        .route(
            "/recipes/:id/favorite/",
            post(recipes::favorite).delete(recipes::unfavorite),
        )
        .route(
            "/recipes/:id/shopping_cart/",
            post(recipes::add_to_cart).delete(recipes::remove_from_cart),
        )
        .route("/recipes/:id/get-link/", get(recipes::get_link))
        .route("/s/:code", get(recipes::follow_short_link))
        .nest_service("/media", media)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "foodgram-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn not_found(uri: Uri) -> impl IntoResponse {
    tracing::debug!("No route for {}", uri.path());
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "detail": "Not found." })),
    )
}
