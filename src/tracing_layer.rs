//! Logging setup and the audit event sink.

use async_trait::async_trait;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sandbox_mcp_core::config::LoggingConfig;
use sandbox_mcp_core::{EventEmitter, EventEnvelope, EventSeverity};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured filter. Logs go to stderr so stdout
/// stays clean for command output.
pub fn configure_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)?,
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()?;
    }

    Ok(())
}

/// Writes audit events to the `audit` tracing target.
pub struct TracingEventEmitter;

#[async_trait]
impl EventEmitter for TracingEventEmitter {
    async fn emit(&self, event: EventEnvelope) {
        let payload = event.payload.to_string();
        match event.severity {
            EventSeverity::Info => tracing::info!(
                target: "audit",
                id = %event.id,
                actor = %event.actor,
                event_type = ?event.event_type,
                payload = %payload,
                "audit event"
            ),
            EventSeverity::Warning => tracing::warn!(
                target: "audit",
                id = %event.id,
                actor = %event.actor,
                event_type = ?event.event_type,
                payload = %payload,
                "audit event"
            ),
            EventSeverity::Error => tracing::error!(
                target: "audit",
                id = %event.id,
                actor = %event.actor,
                event_type = ?event.event_type,
                payload = %payload,
                "audit event"
            ),
        }
    }
}
