//! Process wiring: tracing setup and the composition root.

pub mod bootstrap;
pub mod tracing_layer;

pub use bootstrap::{AppBootstrap, BootstrapPaths, HostBindings, bootstrap, bootstrap_at};
pub use tracing_layer::{HostEventLayer, HostLogEvent};

use tokio::sync::mpsc::UnboundedSender;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter used when neither `RUST_LOG` nor an explicit directive is given.
pub const DEFAULT_LOG_FILTER: &str = "marginalia_core=info,marginalia_interaction=info,\
marginalia_infrastructure=info,marginalia_application=info,marginalia_execution=info";

/// Installs the global subscriber: stderr formatting plus, when `host` is
/// given, forwarding to the host over a channel.
///
/// `RUST_LOG` wins over `filter`. Returns `false` if a global subscriber was
/// already installed.
pub fn init_tracing(filter: Option<&str>, host: Option<UnboundedSender<HostLogEvent>>) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter.unwrap_or(DEFAULT_LOG_FILTER)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(host.map(HostEventLayer::new))
        .try_init()
        .is_ok()
}
