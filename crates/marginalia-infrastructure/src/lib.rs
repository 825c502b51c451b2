//! File-system backed implementations: path resolution, the settings file
//! and the persisted preference store.

pub mod paths;
pub mod preference_store;
pub mod storage;

pub use paths::{MarginaliaPaths, PathError};
pub use preference_store::{FilePreferenceStore, InMemoryPreferenceStore};
pub use storage::{
    AtomicTomlError, AtomicTomlFile, ENV_BACKEND_URL, ENV_MAX_TOKENS, SettingsStorage,
    SettingsStorageError,
};
