/// User settings consumed by the presentation layer.
///
/// Constructed once at startup and passed by reference to whatever needs it.
/// The rename engine itself takes no settings; only the filtered views and
/// frontend defaults read them.
use crate::model::FileItem;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unable to write settings file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Ordering applied by the filtered views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Case-insensitive name order.
    Name,
    /// Directories first, then case-insensitive name order.
    #[default]
    KindThenName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Hide entries whose name ends with one of `backup_suffixes`.
    pub hide_backup_files: bool,

    pub backup_suffixes: Vec<String>,

    pub sort_order: SortOrder,

    /// Default for the "include subdirectories" switch.
    pub include_subdirectories: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hide_backup_files: true,
            backup_suffixes: vec![".bak".to_string()],
            sort_order: SortOrder::default(),
            include_subdirectories: true,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(write_err)
    }

    /// Whether an item should be visible under these settings.
    pub fn is_visible(&self, item: &FileItem) -> bool {
        !(self.hide_backup_files
            && self
                .backup_suffixes
                .iter()
                .any(|suffix| !suffix.is_empty() && item.name.ends_with(suffix.as_str())))
    }
}
