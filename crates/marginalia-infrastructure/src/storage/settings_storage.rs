//! Settings file loading.
//!
//! Reads `config.toml`, falls back to defaults for anything missing, then
//! applies environment overrides and validates the result.

use super::atomic_toml::{AtomicTomlError, AtomicTomlFile};
use crate::paths::{MarginaliaPaths, PathError};
use marginalia_core::error::MarginaliaError;
use marginalia_core::settings::Settings;
use std::path::{Path, PathBuf};

pub const ENV_BACKEND_URL: &str = "MARGINALIA_BACKEND_URL";
pub const ENV_MAX_TOKENS: &str = "MARGINALIA_MAX_TOKENS";

/// Errors that can occur while loading settings.
#[derive(Debug)]
pub enum SettingsStorageError {
    Path(PathError),
    File(AtomicTomlError),
    /// An environment override could not be parsed.
    InvalidOverride { key: &'static str, value: String },
    /// The loaded settings failed validation.
    Invalid(MarginaliaError),
}

impl std::fmt::Display for SettingsStorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsStorageError::Path(e) => write!(f, "Path error: {}", e),
            SettingsStorageError::File(e) => write!(f, "Settings file error: {}", e),
            SettingsStorageError::InvalidOverride { key, value } => {
                write!(f, "Invalid value for {}: {:?}", key, value)
            }
            SettingsStorageError::Invalid(e) => write!(f, "Invalid settings: {}", e),
        }
    }
}

impl std::error::Error for SettingsStorageError {}

impl From<PathError> for SettingsStorageError {
    fn from(e: PathError) -> Self {
        SettingsStorageError::Path(e)
    }
}

impl From<AtomicTomlError> for SettingsStorageError {
    fn from(e: AtomicTomlError) -> Self {
        SettingsStorageError::File(e)
    }
}

impl From<SettingsStorageError> for MarginaliaError {
    fn from(e: SettingsStorageError) -> Self {
        match e {
            SettingsStorageError::File(e) => e.into(),
            SettingsStorageError::Invalid(e) => e,
            other => MarginaliaError::config(other.to_string()),
        }
    }
}

pub struct SettingsStorage {
    file: AtomicTomlFile<Settings>,
}

impl SettingsStorage {
    /// Storage at the default location (`~/.config/marginalia/config.toml`).
    pub fn new() -> Result<Self, SettingsStorageError> {
        Ok(Self::with_path(MarginaliaPaths::config_file()?))
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self {
            file: AtomicTomlFile::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Loads settings with overrides from the process environment.
    pub fn load(&self) -> Result<Settings, SettingsStorageError> {
        self.load_with_env(|key| std::env::var(key).ok())
    }

    /// Loads settings, reading overrides through `env`.
    pub fn load_with_env<F>(&self, env: F) -> Result<Settings, SettingsStorageError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = match self.file.load()? {
            Some(settings) => settings,
            None => {
                tracing::debug!(
                    "[Settings] No settings at {}, using defaults",
                    self.path().display()
                );
                Settings::default()
            }
        };

        apply_env_overrides(&mut settings, env)?;
        settings.validate().map_err(SettingsStorageError::Invalid)?;
        Ok(settings)
    }

    pub fn save(&self, settings: &Settings) -> Result<(), SettingsStorageError> {
        settings.validate().map_err(SettingsStorageError::Invalid)?;
        self.file.save(settings)?;
        Ok(())
    }
}

fn apply_env_overrides<F>(settings: &mut Settings, env: F) -> Result<(), SettingsStorageError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = env(ENV_BACKEND_URL).filter(|v| !v.trim().is_empty()) {
        tracing::info!("[Settings] backend_url overridden by {}", ENV_BACKEND_URL);
        settings.backend_url = url.trim().to_string();
    }
    if let Some(raw) = env(ENV_MAX_TOKENS) {
        settings.max_tokens = raw.trim().parse().map_err(|_| {
            SettingsStorageError::InvalidOverride {
                key: ENV_MAX_TOKENS,
                value: raw.clone(),
            }
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let storage = SettingsStorage::with_path(dir.path().join("config.toml"));
        let settings = storage.load_with_env(env_of(&[])).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_env_overrides_apply_after_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "backend_url = \"http://file.example\"\nmax_tokens = 10\n").unwrap();

        let storage = SettingsStorage::with_path(path);
        let settings = storage
            .load_with_env(env_of(&[(ENV_MAX_TOKENS, "2048")]))
            .unwrap();
        assert_eq!(settings.backend_url, "http://file.example");
        assert_eq!(settings.max_tokens, 2048);

        let settings = storage
            .load_with_env(env_of(&[(ENV_BACKEND_URL, "http://env.example")]))
            .unwrap();
        assert_eq!(settings.backend_url, "http://env.example");
        assert_eq!(settings.max_tokens, 10);
    }

    #[test]
    fn test_bad_override_and_invalid_values_are_rejected() {
        let dir = TempDir::new().unwrap();
        let storage = SettingsStorage::with_path(dir.path().join("config.toml"));

        let err = storage
            .load_with_env(env_of(&[(ENV_MAX_TOKENS, "lots")]))
            .unwrap_err();
        assert!(matches!(err, SettingsStorageError::InvalidOverride { .. }));

        let err = storage
            .load_with_env(env_of(&[(ENV_MAX_TOKENS, "0")]))
            .unwrap_err();
        let err: MarginaliaError = err.into();
        assert!(matches!(err, MarginaliaError::Config(_)));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let storage = SettingsStorage::with_path(dir.path().join("config.toml"));
        let mut settings = Settings::default();
        settings.auto_close_delay_ms = 1500;
        storage.save(&settings).unwrap();

        let loaded = storage.load_with_env(env_of(&[])).unwrap();
        assert_eq!(loaded.auto_close_delay_ms, 1500);
    }
}
