//! Typed TOML file with tmp-file + rename writes.

use marginalia_core::error::MarginaliaError;
use serde::{Serialize, de::DeserializeOwned};
use std::fs::{self, File};
use std::io::Write as IoWrite;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Errors that can occur during TOML file operations.
#[derive(Debug)]
pub enum AtomicTomlError {
    /// File I/O error.
    IoError(std::io::Error),
    /// TOML parse error.
    TomlError(toml::de::Error),
    /// TOML serialization error.
    TomlSerError(toml::ser::Error),
}

impl std::fmt::Display for AtomicTomlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AtomicTomlError::IoError(e) => write!(f, "I/O error: {}", e),
            AtomicTomlError::TomlError(e) => write!(f, "TOML parse error: {}", e),
            AtomicTomlError::TomlSerError(e) => write!(f, "TOML serialization error: {}", e),
        }
    }
}

impl std::error::Error for AtomicTomlError {}

impl From<std::io::Error> for AtomicTomlError {
    fn from(e: std::io::Error) -> Self {
        AtomicTomlError::IoError(e)
    }
}

impl From<toml::de::Error> for AtomicTomlError {
    fn from(e: toml::de::Error) -> Self {
        AtomicTomlError::TomlError(e)
    }
}

impl From<toml::ser::Error> for AtomicTomlError {
    fn from(e: toml::ser::Error) -> Self {
        AtomicTomlError::TomlSerError(e)
    }
}

impl From<AtomicTomlError> for MarginaliaError {
    fn from(e: AtomicTomlError) -> Self {
        match e {
            AtomicTomlError::IoError(e) => e.into(),
            AtomicTomlError::TomlError(e) => e.into(),
            AtomicTomlError::TomlSerError(e) => e.into(),
        }
    }
}

/// A TOML file deserialized as `T`.
///
/// Writes go to a sibling `.tmp` file which is synced and then renamed over
/// the target, so readers never observe a partial file.
pub struct AtomicTomlFile<T> {
    path: PathBuf,
    _phantom: PhantomData<T>,
}

impl<T> AtomicTomlFile<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _phantom: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the file. A missing or empty file yields `Ok(None)`.
    pub fn load(&self) -> Result<Option<T>, AtomicTomlError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(toml::from_str(&content)?))
    }

    pub fn save(&self, data: &T) -> Result<(), AtomicTomlError> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(data)?;

        let tmp_path = self.path.with_extension("toml.tmp");
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(toml_string.as_bytes())?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}
