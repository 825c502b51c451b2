//! Runtime settings.
//!
//! Loaded from `config.toml` by the infrastructure layer; every field has a
//! default so partial files are accepted.

use crate::error::{MarginaliaError, Result};
use crate::geometry::{PositionEngine, Size, SizeLimits};
use crate::stacking::DEFAULT_BASE_Z;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the streaming endpoint (`{backend_url}/api/stream`).
    pub backend_url: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    /// Number of messages kept per session.
    pub message_window: usize,
    pub auto_close_delay_ms: u64,
    /// Character budget of the default page-context extraction.
    pub context_char_budget: usize,
    pub truncate_context: bool,
    pub panel: PanelSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelSettings {
    pub default_width: f64,
    pub default_height: f64,
    pub min_width: f64,
    pub max_width: f64,
    pub min_height: f64,
    pub max_height: f64,
    pub surface_margin: f64,
    pub anchor_gap: f64,
    pub base_z_index: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8787".to_string(),
            max_tokens: 1024,
            temperature: 0.3,
            request_timeout_secs: 60,
            message_window: 50,
            auto_close_delay_ms: 800,
            context_char_budget: 4000,
            truncate_context: true,
            panel: PanelSettings::default(),
        }
    }
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            default_width: 380.0,
            default_height: 260.0,
            min_width: 280.0,
            max_width: 720.0,
            min_height: 160.0,
            max_height: 640.0,
            surface_margin: 8.0,
            anchor_gap: 6.0,
            base_z_index: DEFAULT_BASE_Z,
        }
    }
}

impl Settings {
    /// Rejects values the coordinator cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.backend_url.trim().is_empty() {
            return Err(MarginaliaError::config("backend_url must not be empty"));
        }
        if self.message_window == 0 {
            return Err(MarginaliaError::config("message_window must be positive"));
        }
        if self.max_tokens == 0 {
            return Err(MarginaliaError::config("max_tokens must be positive"));
        }
        let p = &self.panel;
        if p.min_width <= 0.0 || p.min_height <= 0.0 {
            return Err(MarginaliaError::config("panel minimum size must be positive"));
        }
        if p.min_width > p.max_width || p.min_height > p.max_height {
            return Err(MarginaliaError::config(format!(
                "panel limits inverted: width {}..{}, height {}..{}",
                p.min_width, p.max_width, p.min_height, p.max_height
            )));
        }
        if p.surface_margin < 0.0 || p.anchor_gap < 0.0 {
            return Err(MarginaliaError::config("margins must not be negative"));
        }
        Ok(())
    }

    pub fn auto_close_delay(&self) -> Duration {
        Duration::from_millis(self.auto_close_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Endpoint URL for streamed completions.
    pub fn stream_url(&self) -> String {
        format!("{}/api/stream", self.backend_url.trim_end_matches('/'))
    }

    pub fn position_engine(&self) -> PositionEngine {
        PositionEngine::new(self.panel.surface_margin, self.panel.anchor_gap)
    }

    pub fn size_limits(&self) -> SizeLimits {
        SizeLimits {
            min_width: self.panel.min_width,
            max_width: self.panel.max_width,
            min_height: self.panel.min_height,
            max_height: self.panel.max_height,
        }
    }

    pub fn default_panel_size(&self) -> Size {
        self.size_limits()
            .clamp(Size::new(self.panel.default_width, self.panel.default_height))
    }
}
