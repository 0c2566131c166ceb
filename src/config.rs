//! Configuration management for arcus using the prefer crate.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ingest::{RetryPolicy, TransmitterConfig};
use crate::repository::diesel_context::DieselDbContext;
use crate::repository::DbError;

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "arcus.db";

/// Subdirectory of the data directory holding locally stored images.
const IMAGES_SUBDIR: &str = "images";

pub const DEFAULT_BIND: &str = "127.0.0.1:3030";

/// 50 MiB; a batch of two high-resolution pages fits comfortably.
pub const DEFAULT_MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Where detection images are published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageBackend {
    #[default]
    Local,
    Cloudinary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageStoreConfig {
    #[serde(default)]
    pub backend: ImageBackend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
}

impl ImageStoreConfig {
    /// Fill unset credentials from `CLOUDINARY_*` environment variables.
    pub fn with_env_overrides(mut self) -> Self {
        let env = |key: &str| std::env::var(key).ok().filter(|s| !s.is_empty());
        if let Some(name) = env("CLOUDINARY_CLOUD_NAME") {
            self.cloud_name = Some(name);
        }
        if let Some(key) = env("CLOUDINARY_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(secret) = env("CLOUDINARY_API_SECRET") {
            self.api_secret = Some(secret);
        }
        self
    }
}

/// Upload pipeline tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Pages per batch.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Batches in flight per wave.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Total attempts per batch, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Failed batches tolerated before the upload is aborted.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,
    /// Longest side of a rendered page, in pixels.
    #[serde(default = "default_max_image_dimension")]
    pub max_image_dimension: u32,
    #[serde(default = "default_render_scale")]
    pub render_scale: f32,
}

fn default_chunk_size() -> usize {
    2
}

fn default_concurrency() -> usize {
    3
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_failure_threshold() -> usize {
    3
}

fn default_max_image_dimension() -> u32 {
    4096
}

fn default_render_scale() -> f32 {
    1.5
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            failure_threshold: default_failure_threshold(),
            max_image_dimension: default_max_image_dimension(),
            render_scale: default_render_scale(),
        }
    }
}

impl IngestConfig {
    pub fn transmitter_config(&self) -> TransmitterConfig {
        TransmitterConfig {
            concurrency: self.concurrency.max(1),
            retry: RetryPolicy::new(
                self.max_attempts,
                Duration::from_millis(self.base_delay_ms),
            ),
            failure_threshold: self.failure_threshold,
        }
    }
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename inside `data_dir`.
    pub database_filename: String,
    /// Database URL (overrides data_dir/database_filename if set).
    pub database_url: Option<String>,
    /// Address the server listens on.
    pub bind: String,
    /// Request body ceiling; larger requests get 413.
    pub max_body_bytes: usize,
    /// Externally visible base URL of this server, used for local image URLs.
    pub public_url: String,
    /// Server the `upload` command talks to.
    pub api_url: String,
    /// Owner id sent by the `upload` command.
    pub user_id: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    pub ingest: IngestConfig,
    pub image_store: ImageStoreConfig,
}

impl Default for Settings {
    fn default() -> Self {
        // ~/.local/share/arcus, falling back to the home dir, then CWD
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("arcus");

        Self {
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            bind: DEFAULT_BIND.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            public_url: format!("http://{}", DEFAULT_BIND),
            api_url: format!("http://{}", DEFAULT_BIND),
            user_id: None,
            request_timeout: 60,
            ingest: IngestConfig::default(),
            image_store: ImageStoreConfig::default(),
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        match self.database_url {
            Some(ref url) => url.clone(),
            None => format!("sqlite:{}", self.database_path().display()),
        }
    }

    /// Get the full path to the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join(IMAGES_SUBDIR)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Ensure all directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for dir in [self.data_dir.clone(), self.images_dir()] {
            fs::create_dir_all(&dir).map_err(|e| {
                std::io::Error::new(
                    e.kind(),
                    format!("Failed to create directory '{}': {}", dir.display(), e),
                )
            })?;
        }
        Ok(())
    }

    /// Create a database context using the configured database URL or path.
    pub fn create_db_context(&self) -> Result<DieselDbContext, DbError> {
        DieselDbContext::from_url(&self.database_url())
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_body_bytes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub image_store: ImageStoreConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers arcus config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("arcus").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("Ignoring config file {}: {}", path.display(), e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            // No config file found
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let mut config = Self::parse(&contents, path)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, String> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        match ext {
            "toml" => {
                toml::from_str(contents).map_err(|e| format!("Failed to parse TOML config: {}", e))
            }
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved against `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref bind) = self.bind {
            settings.bind = bind.clone();
            if self.public_url.is_none() {
                settings.public_url = format!("http://{}", bind);
            }
        }
        if let Some(max) = self.max_body_bytes {
            settings.max_body_bytes = max;
        }
        if let Some(ref public_url) = self.public_url {
            settings.public_url = public_url.clone();
        }
        if let Some(ref api_url) = self.api_url {
            settings.api_url = api_url.clone();
        }
        if let Some(ref user_id) = self.user_id {
            settings.user_id = Some(user_id.clone());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        settings.ingest = self.ingest.clone();
        settings.image_store = self.image_store.clone();
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Data directory (--data flag).
    pub data: Option<PathBuf>,
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

/// Load settings: defaults, then the config file, then the environment,
/// then `--data`. Returns (Settings, Config).
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await.unwrap_or_else(|e| {
            tracing::warn!("{}", e);
            Config::default()
        }),
        None => Config::load().await,
    };

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let base_dir = config.base_dir().unwrap_or_else(|| cwd.clone());

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings, &base_dir);
    apply_env_overrides(&mut settings);

    if let Some(ref data) = options.data {
        settings.data_dir = if data.is_absolute() {
            data.clone()
        } else {
            cwd.join(data)
        };
    }

    (settings, config)
}

fn apply_env_overrides(settings: &mut Settings) {
    if let Some(url) = env_var("DATABASE_URL") {
        tracing::debug!(
            "Using DATABASE_URL from environment: {}",
            crate::repository::util::redact_url_password(&url)
        );
        settings.database_url = Some(url);
    }
    if let Some(api_url) = env_var("ARCUS_API_URL") {
        settings.api_url = api_url;
    }
    if let Some(user_id) = env_var("ARCUS_USER_ID") {
        settings.user_id = Some(user_id);
    }
    settings.image_store = settings.image_store.clone().with_env_overrides();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml_with_defaults() {
        let config = Config::parse(
            r#"
data_dir = "~/plans"
bind = "0.0.0.0:8080"

[ingest]
chunk_size = 5

[image_store]
backend = "cloudinary"
cloud_name = "demo"
"#,
            Path::new("arcus.toml"),
        )
        .unwrap();

        assert_eq!(config.ingest.chunk_size, 5);
        assert_eq!(config.ingest.concurrency, 3);
        assert_eq!(config.ingest.max_attempts, 3);
        assert_eq!(config.image_store.backend, ImageBackend::Cloudinary);
        assert_eq!(config.image_store.cloud_name.as_deref(), Some("demo"));
    }

    #[test]
    fn test_parse_yaml_and_json() {
        let yaml = Config::parse("ingest:\n  concurrency: 1\n", Path::new("arcus.yaml")).unwrap();
        assert_eq!(yaml.ingest.concurrency, 1);

        let json = Config::parse(r#"{"request_timeout": 5}"#, Path::new("arcus.json")).unwrap();
        assert_eq!(json.request_timeout, Some(5));
        assert_eq!(json.image_store.backend, ImageBackend::Local);
    }

    #[test]
    fn test_apply_to_settings_resolves_relative_paths() {
        let config = Config {
            data_dir: Some("data".into()),
            bind: Some("0.0.0.0:9000".into()),
            ..Default::default()
        };
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, Path::new("/srv/arcus"));

        assert_eq!(settings.data_dir, PathBuf::from("/srv/arcus/data"));
        assert_eq!(settings.public_url, "http://0.0.0.0:9000");
        assert_eq!(
            settings.database_url(),
            "sqlite:/srv/arcus/data/arcus.db"
        );
        assert_eq!(settings.images_dir(), PathBuf::from("/srv/arcus/data/images"));
    }

    #[test]
    fn test_transmitter_config() {
        let ingest = IngestConfig {
            concurrency: 0,
            base_delay_ms: 250,
            ..Default::default()
        };
        let config = ingest.transmitter_config();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(250));
    }
}
