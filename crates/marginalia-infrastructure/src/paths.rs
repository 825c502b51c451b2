//! Path management for marginalia configuration files.
//!
//! ```text
//! ~/.config/marginalia/
//! ├── config.toml        # Settings
//! └── preferences.toml   # Persisted UI preferences (text size)
//! ```

use std::path::PathBuf;

const APP_DIR: &str = "marginalia";

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Platform config directory could not be determined.
    ConfigDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::ConfigDirNotFound => write!(f, "Cannot find config directory"),
        }
    }
}

impl std::error::Error for PathError {}

pub struct MarginaliaPaths;

impl MarginaliaPaths {
    /// Returns the configuration directory (e.g. `~/.config/marginalia/`).
    pub fn config_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(PathError::ConfigDirNotFound)
    }

    pub fn config_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn preferences_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("preferences.toml"))
    }
}
