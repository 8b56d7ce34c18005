//! Filesystem store for uploaded document images.
//!
//! Images are written under `root` using keys of the form
//! `documents/{document_type}/{YYYY/MM/DD/HHMMSS}-{suffix}{ext}` and served
//! back through `GET /api/images/{key}`.

use chrono::Utc;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

const DEFAULT_EXTENSION: &str = ".jpg";

#[derive(Debug, thiserror::Error)]
pub enum ImageStoreError {
    #[error("Invalid document type")]
    InvalidDocumentType,

    #[error("Image is empty")]
    EmptyImage,

    #[error("Invalid image key: {0}")]
    InvalidKey(String),

    #[error("Failed to write image {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub key: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
    public_base_url: String,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Store an image for a classified document and return its key and URL.
    pub async fn put(
        &self,
        document_type: &str,
        file_name: Option<&str>,
        data: &[u8],
    ) -> Result<StoredImage, ImageStoreError> {
        let safe_type = document_type.trim().to_lowercase().replace(' ', "_");
        if safe_type.is_empty() || safe_type.contains(['/', '\\', '.']) {
            return Err(ImageStoreError::InvalidDocumentType);
        }
        if data.is_empty() {
            return Err(ImageStoreError::EmptyImage);
        }

        let timestamp = Utc::now().format("%Y/%m/%d/%H%M%S");
        let suffix = &Uuid::new_v4().simple().to_string()[..8];
        let key = format!(
            "documents/{}/{}-{}{}",
            safe_type,
            timestamp,
            suffix,
            extension_of(file_name)
        );

        let path = self.root.join(&key);
        let io_err = |source| ImageStoreError::Io {
            key: key.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&path, data).await.map_err(io_err)?;

        debug!("ImageStore: stored '{}' ({} bytes)", key, data.len());
        Ok(StoredImage {
            url: self.url_for(&key),
            key,
        })
    }

    /// URL at which an image key can be viewed.
    pub fn url_for(&self, key: &str) -> String {
        format!("{}/api/images/{}", self.public_base_url, key)
    }

    /// Read an image back. Returns `Ok(None)` when the key does not exist.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ImageStoreError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ImageStoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    /// Remove a stored image. Missing keys are not an error.
    pub async fn delete(&self, key: &str) -> Result<(), ImageStoreError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("ImageStore: removed '{}'", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ImageStoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, ImageStoreError> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(ImageStoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

/// File extension (with dot) from an upload name, defaulting to `.jpg`.
fn extension_of(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Content type for a stored key, from its extension.
pub fn content_type_for(key: &str) -> &'static str {
    match Path::new(key)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("tif") | Some("tiff") => "image/tiff",
        Some("heic") => "image/heic",
        _ => "image/jpeg",
    }
}
