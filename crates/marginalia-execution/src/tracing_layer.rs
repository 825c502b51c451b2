//! Tracing layer that forwards log events to the host.
//!
//! The host (extension shell, devtools panel) receives every event emitted
//! inside the coordinator as a [`HostLogEvent`] over an unbounded channel.

use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Event data sent to the host.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HostLogEvent {
    /// Event target (e.g. "marginalia_application::orchestrator")
    pub target: String,
    /// Log level (INFO, DEBUG, WARN, ERROR)
    pub level: String,
    pub message: String,
    /// Structured fields other than the message
    pub fields: HashMap<String, Value>,
    /// RFC 3339
    pub timestamp: String,
}

pub struct HostEventLayer {
    sender: mpsc::UnboundedSender<HostLogEvent>,
    max_level: Level,
}

impl HostEventLayer {
    /// Forwards events at `DEBUG` and above.
    pub fn new(sender: mpsc::UnboundedSender<HostLogEvent>) -> Self {
        Self {
            sender,
            max_level: Level::DEBUG,
        }
    }

    /// Forwards only events at `max_level` or more severe.
    pub fn with_max_level(mut self, max_level: Level) -> Self {
        self.max_level = max_level;
        self
    }
}

impl<S> Layer<S> for HostEventLayer
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > self.max_level {
            return;
        }

        let mut fields = HashMap::new();
        event.record(&mut FieldVisitor(&mut fields));

        let message = match fields.remove("message") {
            Some(Value::String(message)) => message,
            Some(other) => other.to_string(),
            None => String::new(),
        };

        let host_event = HostLogEvent {
            target: metadata.target().to_string(),
            level: metadata.level().to_string(),
            message,
            fields,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        // Receiver gone: nothing to do.
        let _ = self.sender.send(host_event);
    }
}

/// Collects event fields into a map.
struct FieldVisitor<'a>(&'a mut HashMap<String, Value>);

impl tracing::field::Visit for FieldVisitor<'_> {
    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(
            field.name().to_string(),
            serde_json::json!(format!("{:?}", value)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_events_are_forwarded_with_fields() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber = tracing_subscriber::registry().with(HostEventLayer::new(tx));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(session_id = "s1", nesting = 2u64, "[Orchestrator] Created session");
        });

        let event = rx.try_recv().unwrap();
        assert_eq!(event.level, "INFO");
        assert_eq!(event.message, "[Orchestrator] Created session");
        assert_eq!(event.fields["session_id"], "s1");
        assert_eq!(event.fields["nesting"], 2);
        assert!(!event.fields.contains_key("message"));
        assert!(chrono::DateTime::parse_from_rfc3339(&event.timestamp).is_ok());
    }

    #[test]
    fn test_level_threshold_and_dropped_receiver() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let layer = HostEventLayer::new(tx).with_max_level(Level::WARN);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("[Stream] quiet");
            tracing::warn!("[Orchestrator] loud");
        });
        assert_eq!(rx.try_recv().unwrap().message, "[Orchestrator] loud");
        assert!(rx.try_recv().is_err());

        drop(rx);
        let (tx, rx) = mpsc::unbounded_channel::<HostLogEvent>();
        drop(rx);
        let subscriber = tracing_subscriber::registry().with(HostEventLayer::new(tx));
        tracing::subscriber::with_default(subscriber, || {
            tracing::error!("[AutoClose] nobody listening");
        });
    }
}
