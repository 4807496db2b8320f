/// Application configuration
///
/// Read from `<config_dir>/image-feed/config.toml` unless a path is given
/// on the command line. Every key is optional; a missing file means all
/// defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::feed::card::LayoutSettings;
use crate::state::filters::DEFAULT_SCOPE;

const APP_DIR: &str = "image-feed";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Catalog location; defaults to the user data directory
    pub database_path: Option<PathBuf>,
    /// Thumbnail location; defaults to the user cache directory
    pub thumbnail_dir: Option<PathBuf>,
    /// Username of the viewer; None browses anonymously
    pub viewer: Option<String>,
    /// Page size when the filters don't set one
    pub page_limit: i64,
    /// Show NSFW images instead of placeholders
    pub show_nsfw: bool,
    /// Narrowest grid column
    pub min_column_width: f32,
    /// Widest list column
    pub max_list_width: f32,
    /// Gap between cards
    pub gap: f32,
    /// Filter scope used when none is given on the command line
    pub filter_scope: String,
    /// Images scanned per ingestion batch
    pub scan_batch_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        let layout = LayoutSettings::default();
        Self {
            database_path: None,
            thumbnail_dir: None,
            viewer: None,
            page_limit: 50,
            show_nsfw: false,
            min_column_width: layout.min_column_width,
            max_list_width: layout.max_list_width,
            gap: layout.gap,
            filter_scope: DEFAULT_SCOPE.to_string(),
            scan_batch_size: 64,
        }
    }
}

impl AppConfig {
    /// Where the config file lives when no path is given
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
    }

    /// Load the config at `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("no config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `path` (or the default location), falling back to the
    /// defaults with a warning if the file can't be used.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => return Self::default(),
        };
        Self::load(&path).unwrap_or_else(|err| {
            warn!("{}; falling back to defaults", err);
            Self::default()
        })
    }

    /// Path of the SQLite catalog
    pub fn database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("catalog.db")
        })
    }

    /// Directory generated thumbnails are written to
    pub fn thumbnail_dir(&self) -> PathBuf {
        self.thumbnail_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("thumbnails")
        })
    }

    pub fn layout_settings(&self) -> LayoutSettings {
        LayoutSettings {
            min_column_width: self.min_column_width.max(1.0),
            max_list_width: self.max_list_width.max(1.0),
            gap: self.gap.max(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "viewer = \"ada\"\npage_limit = 20\nshow_nsfw = true\n").unwrap();

        let config = AppConfig::load(&path).unwrap();

        assert_eq!(config.viewer.as_deref(), Some("ada"));
        assert_eq!(config.page_limit, 20);
        assert!(config.show_nsfw);
        assert_eq!(config.filter_scope, DEFAULT_SCOPE);
    }

    #[test]
    fn test_malformed_file_is_an_error_but_load_or_default_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "page_limit = \"lots\"").unwrap();

        assert!(matches!(AppConfig::load(&path), Err(ConfigError::Parse { .. })));
        assert_eq!(AppConfig::load_or_default(Some(&path)), AppConfig::default());
    }

    #[test]
    fn test_explicit_paths_win() {
        let config = AppConfig {
            database_path: Some(PathBuf::from("/tmp/feed.db")),
            thumbnail_dir: Some(PathBuf::from("/tmp/thumbs")),
            ..AppConfig::default()
        };
        assert_eq!(config.database_path(), PathBuf::from("/tmp/feed.db"));
        assert_eq!(config.thumbnail_dir(), PathBuf::from("/tmp/thumbs"));
    }
}
