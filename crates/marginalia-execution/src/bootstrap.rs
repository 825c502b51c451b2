//! Composition root: wires storage, transport and the orchestrator together.

use std::path::PathBuf;
use std::sync::Arc;

use marginalia_application::{Orchestrator, OrchestratorBuilder};
use marginalia_core::error::{MarginaliaError, Result};
use marginalia_core::geometry::Surface;
use marginalia_core::host::{ContextProvider, PanelRenderer};
use marginalia_core::preference::PreferenceStore;
use marginalia_core::settings::Settings;
use marginalia_infrastructure::{FilePreferenceStore, MarginaliaPaths, SettingsStorage};
use marginalia_interaction::{HttpStreamingEndpoint, StreamingEndpoint};

/// Where bootstrap reads and writes its files.
#[derive(Debug, Clone)]
pub struct BootstrapPaths {
    pub config_file: PathBuf,
    pub preferences_file: PathBuf,
}

impl BootstrapPaths {
    /// `~/.config/marginalia/{config.toml, preferences.toml}`
    pub fn default_locations() -> Result<Self> {
        let config_file = MarginaliaPaths::config_file()
            .map_err(|e| MarginaliaError::config(e.to_string()))?;
        let preferences_file = MarginaliaPaths::preferences_file()
            .map_err(|e| MarginaliaError::config(e.to_string()))?;
        Ok(Self {
            config_file,
            preferences_file,
        })
    }
}

pub struct AppBootstrap {
    pub orchestrator: Orchestrator,
    /// Effective settings after environment overrides.
    pub settings: Settings,
    pub paths: BootstrapPaths,
}

/// Host-supplied pieces that bootstrap cannot construct itself.
pub struct HostBindings {
    pub renderer: Arc<dyn PanelRenderer>,
    pub context_provider: Option<Arc<dyn ContextProvider>>,
    pub surface: Surface,
}

impl HostBindings {
    pub fn new(renderer: Arc<dyn PanelRenderer>) -> Self {
        Self {
            renderer,
            context_provider: None,
            surface: Surface::default(),
        }
    }

    pub fn with_context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.context_provider = Some(provider);
        self
    }

    pub fn with_surface(mut self, surface: Surface) -> Self {
        self.surface = surface;
        self
    }
}

/// Bootstraps from the default config locations.
pub fn bootstrap(host: HostBindings) -> Result<AppBootstrap> {
    bootstrap_at(BootstrapPaths::default_locations()?, host)
}

/// Bootstraps from explicit paths, reading overrides from the process environment.
pub fn bootstrap_at(paths: BootstrapPaths, host: HostBindings) -> Result<AppBootstrap> {
    bootstrap_with_env(paths, host, |key| std::env::var(key).ok())
}

/// Bootstraps with an explicit environment lookup.
///
/// A missing config file is created with defaults so users have something
/// to edit. Overrides are never written back.
pub fn bootstrap_with_env<F>(
    paths: BootstrapPaths,
    host: HostBindings,
    env: F,
) -> Result<AppBootstrap>
where
    F: Fn(&str) -> Option<String>,
{
    let storage = SettingsStorage::with_path(paths.config_file.clone());
    if !storage.path().exists() {
        tracing::info!(
            "[Bootstrap] Writing default settings to {}",
            storage.path().display()
        );
        storage.save(&Settings::default())?;
    }
    let settings = storage.load_with_env(env)?;
    tracing::info!("[Bootstrap] Backend: {}", settings.backend_url);

    let preferences: Arc<dyn PreferenceStore> =
        Arc::new(FilePreferenceStore::open(paths.preferences_file.clone())?);
    let endpoint: Arc<dyn StreamingEndpoint> = Arc::new(HttpStreamingEndpoint::new(&settings)?);

    let mut builder = OrchestratorBuilder::new(endpoint, host.renderer, preferences)
        .settings(settings.clone())
        .surface(host.surface);
    if let Some(provider) = host.context_provider {
        builder = builder.context_provider(provider);
    }
    let orchestrator = builder.build()?;

    tracing::info!("[Bootstrap] Orchestrator ready");
    Ok(AppBootstrap {
        orchestrator,
        settings,
        paths,
    })
}
