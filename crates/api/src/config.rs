use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::{anyhow, Context};
use tracing::info;

/// How stored images are rendered in responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOutput {
    /// Absolute URL under `/media/`.
    Url,
    /// `data:image/<ext>;base64,...` rebuilt from the stored file.
    DataUri,
}

impl FromStr for ImageOutput {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "url" => Ok(ImageOutput::Url),
            "data_uri" | "datauri" | "base64" => Ok(ImageOutput::DataUri),
            other => Err(format!("unknown image output mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub token_ttl_minutes: i64,
    pub media_root: PathBuf,
    pub page_size: u32,
    pub image_output: ImageOutput,
}

impl Config {
    /// Reads `.env` (if any) and the process environment.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            bind_addr: try_load("BIND_ADDR", "0.0.0.0:8000")?,
            db_max_connections: try_load("DB_MAX_CONNECTIONS", "20")?,
            jwt_secret: required("JWT_SECRET")?,
            token_ttl_minutes: try_load("TOKEN_TTL_MINUTES", "60")?,
            media_root: try_load("MEDIA_ROOT", "./media")?,
            page_size: try_load("PAGE_SIZE", "6")?,
            image_output: try_load("IMAGE_OUTPUT", "url")?,
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse()
        .map_err(|e| anyhow!("Invalid {key} value '{raw}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_output_modes_parse() {
        assert_eq!("url".parse::<ImageOutput>().unwrap(), ImageOutput::Url);
        assert_eq!("DATA_URI".parse::<ImageOutput>().unwrap(), ImageOutput::DataUri);
        assert!("gif".parse::<ImageOutput>().is_err());
    }

    #[test]
    fn defaults_apply_when_variable_is_missing() {
        let size: u32 = try_load("FOODGRAM_TEST_UNSET_PAGE_SIZE", "6").unwrap();
        assert_eq!(size, 6);
        let bad: anyhow::Result<u32> = try_load("FOODGRAM_TEST_UNSET_BAD", "six");
        assert!(bad.is_err());
    }
}
