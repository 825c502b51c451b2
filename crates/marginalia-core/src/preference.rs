//! Persisted panel preferences.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Preference key holding the chosen panel text size.
pub const TEXT_SIZE_KEY: &str = "panel_text_size";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TextSize {
    Small,
    #[default]
    Medium,
    Large,
    XLarge,
}

impl TextSize {
    /// Parses a stored value; anything unrecognised falls back to the default.
    pub fn from_stored(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_default()
    }
}

/// Key/value store for host-persisted preferences.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Reads the text size preference, falling back to the default level.
pub fn load_text_size(store: &dyn PreferenceStore) -> TextSize {
    TextSize::from_stored(store.get(TEXT_SIZE_KEY).as_deref())
}

pub fn save_text_size(store: &dyn PreferenceStore, size: TextSize) -> Result<()> {
    store.set(TEXT_SIZE_KEY, size.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_size_parsing() {
        assert_eq!(TextSize::from_stored(Some("large")), TextSize::Large);
        assert_eq!(TextSize::from_stored(Some("xlarge")), TextSize::XLarge);
        assert_eq!(TextSize::from_stored(Some("huge")), TextSize::Medium);
        assert_eq!(TextSize::from_stored(None), TextSize::Medium);
        assert_eq!(TextSize::Small.to_string(), "small");
    }
}
