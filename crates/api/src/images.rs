//! Conversion between inbound image payloads, files under the media root and
//! the representation sent back to clients.

use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;
use tracing::{info, warn};

use crate::config::ImageOutput;
use crate::error::{AppError, AppResult};
use crate::extract::Origin;

pub const ALLOWED_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "webp", "bmp"];

/// Public URL prefix the media root is served under.
pub const MEDIA_URL: &str = "/media/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub ext: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedImage {
    /// New bytes that still have to be written to the store.
    Fresh(ImageData),
    /// The image already stored under this reference is kept as is.
    Existing(String),
}

fn checked_ext(field: &str, ext: &str) -> AppResult<String> {
    let ext = ext.trim().to_ascii_lowercase();
    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(AppError::field(
            field,
            format!("Unsupported image type '{ext}'."),
        ))
    }
}

/// Parses `data:image/<ext>;base64,<data>`.
pub fn decode_data_uri(field: &str, payload: &str) -> AppResult<ImageData> {
    let invalid = || AppError::field(field, "Upload a valid image. Expected a base64 data URI.");

    let (header, data) = payload.split_once(";base64,").ok_or_else(invalid)?;
    let ext = header.strip_prefix("data:image/").ok_or_else(invalid)?;
    let ext = checked_ext(field, ext)?;
    let bytes = general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|_| invalid())?;
    if bytes.is_empty() {
        return Err(AppError::field(field, "The submitted file is empty."));
    }
    Ok(ImageData { ext, bytes })
}

/// Builds image data from a multipart file field.
pub fn decode_upload(
    field: &str,
    file_name: Option<&str>,
    content_type: Option<&str>,
    bytes: Vec<u8>,
) -> AppResult<ImageData> {
    if bytes.is_empty() {
        return Err(AppError::field(field, "The submitted file is empty."));
    }
    let ext = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .or_else(|| content_type.and_then(|ct| ct.strip_prefix("image/")))
        .ok_or_else(|| AppError::field(field, "Upload a valid image."))?;
    let ext = checked_ext(field, ext)?;
    Ok(ImageData { ext, bytes })
}

/// Decodes a required JSON image value. `current` is the reference already
/// stored for the object being edited; sending it back (raw or as its media
/// URL) keeps the stored file.
pub fn decode(field: &str, payload: Option<&str>, current: Option<&str>) -> AppResult<DecodedImage> {
    let payload = payload.map(str::trim).unwrap_or_default();
    if payload.is_empty() {
        return Err(AppError::field(field, "This field is required."));
    }
    if payload.starts_with("data:") {
        return decode_data_uri(field, payload).map(DecodedImage::Fresh);
    }
    if let Some(current) = current.filter(|c| !c.is_empty()) {
        let media_suffix = format!("{MEDIA_URL}{current}");
        if payload == current || payload.ends_with(&media_suffix) {
            return Ok(DecodedImage::Existing(current.to_string()));
        }
    }
    Err(AppError::field(
        field,
        "Upload a valid image. Expected a base64 data URI.",
    ))
}

pub fn to_data_uri(ext: &str, bytes: &[u8]) -> String {
    format!(
        "data:image/{};base64,{}",
        ext,
        general_purpose::STANDARD.encode(bytes)
    )
}

/// File store for uploaded images, rooted at `MEDIA_ROOT`.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
    output: ImageOutput,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>, output: ImageOutput) -> Self {
        Self {
            root: root.into(),
            output,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a stored reference to a path under the root, refusing anything
    /// that could escape it.
    fn resolve(&self, stored: &str) -> Option<PathBuf> {
        let relative = Path::new(stored);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        (safe && !stored.is_empty()).then(|| self.root.join(relative))
    }

    /// Writes `image` to `<root>/<folder>/<random>.<ext>` and returns the
    /// stored reference (`<folder>/<random>.<ext>`).
    pub async fn store(&self, folder: &str, image: &ImageData) -> AppResult<String> {
        let mut name = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut name);
        let stored = format!("{}/{}.{}", folder, hex::encode(name), image.ext);
        let path = self
            .resolve(&stored)
            .ok_or_else(|| anyhow::anyhow!("invalid media folder '{folder}'"))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        tokio::fs::write(&path, &image.bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        info!("Stored image {} ({} bytes)", stored, image.bytes.len());
        Ok(stored)
    }

    /// Output representation of a stored image. Never fails: an unreadable
    /// file is rendered as `None`.
    pub async fn encode(&self, stored: Option<&str>, origin: &Origin) -> Option<String> {
        let stored = stored.filter(|s| !s.is_empty())?;
        match self.output {
            ImageOutput::Url => Some(origin.join(&format!("{MEDIA_URL}{stored}"))),
            ImageOutput::DataUri => {
                let path = self.resolve(stored)?;
                match tokio::fs::read(&path).await {
                    Ok(bytes) => {
                        let ext = path
                            .extension()
                            .and_then(|e| e.to_str())
                            .unwrap_or("png");
                        Some(to_data_uri(ext, &bytes))
                    }
                    Err(e) => {
                        warn!("Image {} unreadable, rendering null: {}", stored, e);
                        None
                    }
                }
            }
        }
    }

    /// Best-effort removal of a stored file.
    pub async fn discard(&self, stored: &str) {
        let Some(path) = self.resolve(stored) else {
            return;
        };
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!("Failed to remove image {}: {}", stored, e);
        }
    }
}
