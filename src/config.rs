use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub library: LibraryConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub thumbnails: ThumbnailConfig,

    #[serde(default)]
    pub images: ImageConfig,

    #[serde(default)]
    pub trash: TrashConfig,

    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Root folder of the photo library. Sub-folders are user albums.
    #[serde(default = "default_library_root")]
    pub root: PathBuf,

    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,

    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,

    /// How often the watcher re-fingerprints the library root.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Where favorite flags are kept (the library root stays untouched).
    #[serde(default = "default_favorites_path")]
    pub favorites_path: PathBuf,
}

fn default_library_root() -> PathBuf {
    dirs::picture_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn default_image_extensions() -> Vec<String> {
    vec![
        "jpg".to_string(),
        "jpeg".to_string(),
        "png".to_string(),
        "gif".to_string(),
        "webp".to_string(),
        "heic".to_string(),
        "heif".to_string(),
        "tif".to_string(),
        "tiff".to_string(),
    ]
}

fn default_video_extensions() -> Vec<String> {
    vec![
        "mov".to_string(),
        "mp4".to_string(),
        "m4v".to_string(),
        "avi".to_string(),
        "mkv".to_string(),
    ]
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_favorites_path() -> PathBuf {
    data_dir().join("favorites.json")
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: default_library_root(),
            image_extensions: default_image_extensions(),
            video_extensions: default_video_extensions(),
            poll_interval_secs: default_poll_interval_secs(),
            favorites_path: default_favorites_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Json,
    Sqlite,
}

impl StorageBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(StorageBackend::Json),
            "sqlite" => Some(StorageBackend::Sqlite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    #[serde(default = "default_json_path")]
    pub json_path: PathBuf,

    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,
}

fn default_json_path() -> PathBuf {
    data_dir().join("decisions.json")
}

fn default_sqlite_path() -> PathBuf {
    data_dir().join("decisions.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            json_path: default_json_path(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    #[serde(default = "default_thumb_cache_path")]
    pub path: PathBuf,

    /// Edge length of grid thumbnails.
    #[serde(default = "default_thumb_cache_size")]
    pub size: u32,

    /// Size of the placeholder delivered before the real thumbnail.
    #[serde(default = "default_degraded_size")]
    pub degraded_size: u32,
}

fn default_thumb_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("prune/thumbnails")
}

fn default_thumb_cache_size() -> u32 {
    320
}

fn default_degraded_size() -> u32 {
    64
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            path: default_thumb_cache_path(),
            size: default_thumb_cache_size(),
            degraded_size: default_degraded_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Longest edge of the image delivered for full-screen review.
    #[serde(default = "default_high_quality_size")]
    pub high_quality_size: u32,
}

fn default_high_quality_size() -> u32 {
    2000
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            high_quality_size: default_high_quality_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrashConfig {
    /// Where deleted photos are moved. Emptying the trash is recoverable from here.
    #[serde(default = "default_trash_path")]
    pub path: PathBuf,
}

fn default_trash_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("prune/recently-deleted")
}

impl Default for TrashConfig {
    fn default() -> Self {
        Self {
            path: default_trash_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Prune orphaned decisions after every rebuild triggered by a library change.
    #[serde(default = "default_prune_on_change")]
    pub prune_on_change: bool,
}

fn default_prune_on_change() -> bool {
    true
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            prune_on_change: default_prune_on_change(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            library: LibraryConfig::default(),
            storage: StorageConfig::default(),
            thumbnails: ThumbnailConfig::default(),
            images: ImageConfig::default(),
            trash: TrashConfig::default(),
            reconcile: ReconcileConfig::default(),
        }
    }
}

/// Per-application data directory. Decisions never leave it.
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("prune")
}

impl Config {
    /// Load from `PRUNE_CONFIG` or the default location, creating a default file
    /// on first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("prune")
    }

    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("PRUNE_CONFIG") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Path of the decision file for the configured backend.
    pub fn decisions_path(&self) -> &Path {
        match self.storage.backend {
            StorageBackend::Json => &self.storage.json_path,
            StorageBackend::Sqlite => &self.storage.sqlite_path,
        }
    }
}
