//! TOML file storage.

mod atomic_toml;
mod settings_storage;

pub use atomic_toml::{AtomicTomlError, AtomicTomlFile};
pub use settings_storage::{ENV_BACKEND_URL, ENV_MAX_TOKENS, SettingsStorage, SettingsStorageError};
