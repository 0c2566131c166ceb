//! Image store: turns a data URL or remote image into a stable public URL.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ImageBackend, ImageStoreConfig};

#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("invalid image: {0}")]
    InvalidInput(String),

    #[error("failed to fetch image: {0}")]
    Fetch(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("image store not configured: {0}")]
    NotConfigured(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A place detection images are published to.
#[async_trait]
pub trait ImageStore: Send + Sync {
    fn name(&self) -> &str;

    /// Store `image` (a `data:` URL, raw base64, or an http(s) URL) and
    /// return its public URL.
    async fn store(&self, image: &str) -> Result<String, ImageStoreError>;
}

/// Build the configured store.
pub fn build_image_store(
    config: &ImageStoreConfig,
    images_dir: &Path,
    public_url: &str,
    timeout: Duration,
) -> Result<Arc<dyn ImageStore>, ImageStoreError> {
    let client = Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ImageStoreError::NotConfigured(e.to_string()))?;

    match config.backend {
        ImageBackend::Local => Ok(Arc::new(LocalImageStore::new(
            images_dir.to_path_buf(),
            public_url,
            client,
        ))),
        ImageBackend::Cloudinary => {
            let require = |value: &Option<String>, key: &str| {
                value
                    .clone()
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| ImageStoreError::NotConfigured(format!("missing {}", key)))
            };
            Ok(Arc::new(CloudinaryStore {
                cloud_name: require(&config.cloud_name, "cloud_name")?,
                api_key: require(&config.api_key, "api_key")?,
                api_secret: require(&config.api_secret, "api_secret")?,
                client,
            }))
        }
    }
}

/// Decode a `data:<mime>;base64,<payload>` URL.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>, ImageStoreError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| ImageStoreError::InvalidInput("not a data URL".into()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| ImageStoreError::InvalidInput("data URL has no payload".into()))?;
    if !meta.ends_with(";base64") {
        return Err(ImageStoreError::InvalidInput(
            "only base64 data URLs are supported".into(),
        ));
    }
    decode_base64(payload)
}

fn decode_base64(payload: &str) -> Result<Vec<u8>, ImageStoreError> {
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| ImageStoreError::InvalidInput(format!("bad base64: {}", e)))
}

fn is_remote(image: &str) -> bool {
    image.starts_with("http://") || image.starts_with("https://")
}

/// Stores images under a content-addressed directory served at `/files`.
pub struct LocalImageStore {
    root: PathBuf,
    public_url: String,
    client: Client,
}

impl LocalImageStore {
    pub fn new(root: PathBuf, public_url: &str, client: Client) -> Self {
        Self {
            root,
            public_url: public_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn load_bytes(&self, image: &str) -> Result<Vec<u8>, ImageStoreError> {
        if image.starts_with("data:") {
            return decode_data_url(image);
        }
        if is_remote(image) {
            let response = self
                .client
                .get(image)
                .send()
                .await
                .map_err(|e| ImageStoreError::Fetch(e.to_string()))?;
            if !response.status().is_success() {
                return Err(ImageStoreError::Fetch(format!(
                    "{} returned {}",
                    image,
                    response.status()
                )));
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| ImageStoreError::Fetch(e.to_string()))?;
            return Ok(bytes.to_vec());
        }
        decode_base64(image)
    }

    /// Relative path for content with hex digest `hash`.
    fn relative_path(hash: &str, extension: &str) -> PathBuf {
        PathBuf::from(&hash[..2]).join(format!("{}.{}", &hash[..16], extension))
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn store(&self, image: &str) -> Result<String, ImageStoreError> {
        let bytes = self.load_bytes(image).await?;
        let kind = infer::get(&bytes)
            .filter(|k| k.mime_type().starts_with("image/"))
            .ok_or_else(|| ImageStoreError::InvalidInput("content is not an image".into()))?;

        let hash = hex::encode(Sha256::digest(&bytes));
        let relative = Self::relative_path(&hash, kind.extension());
        let path = self.root.join(&relative);

        if !tokio::fs::try_exists(&path).await? {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &bytes).await?;
            debug!("Stored {} bytes at {}", bytes.len(), path.display());
        }

        let url_path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Ok(format!("{}/files/{}", self.public_url, url_path))
    }
}

/// Signed uploads to a Cloudinary account.
pub struct CloudinaryStore {
    cloud_name: String,
    api_key: String,
    api_secret: String,
    client: Client,
}

#[derive(Deserialize)]
struct CloudinaryResponse {
    secure_url: String,
}

/// Request signature: SHA-256 hex of the sorted `k=v` pairs joined by `&`,
/// followed by the API secret.
pub fn sign_params(params: &BTreeMap<&str, String>, api_secret: &str) -> String {
    let joined = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl ImageStore for CloudinaryStore {
    fn name(&self) -> &str {
        "cloudinary"
    }

    async fn store(&self, image: &str) -> Result<String, ImageStoreError> {
        // Cloudinary accepts data URLs and remote URLs as the file field.
        let file = if image.starts_with("data:") || is_remote(image) {
            image.to_string()
        } else {
            format!("data:image/png;base64,{}", image)
        };

        let timestamp = Utc::now().timestamp().to_string();
        let mut params = BTreeMap::new();
        params.insert("timestamp", timestamp.clone());
        params.insert("transformation", "q_auto".to_string());
        let signature = sign_params(&params, &self.api_secret);

        let form = reqwest::multipart::Form::new()
            .text("file", file)
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("transformation", "q_auto")
            .text("signature", signature);

        let url = format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.cloud_name
        );
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ImageStoreError::Upload(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ImageStoreError::Upload(format!("{}: {}", status, body)));
        }

        let parsed: CloudinaryResponse = response
            .json()
            .await
            .map_err(|e| ImageStoreError::Upload(e.to_string()))?;
        info!("Uploaded image to {}", parsed.secure_url);
        Ok(parsed.secure_url)
    }
}
