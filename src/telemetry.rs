use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;

/// Initialize structured logging.
///
/// Logs go to stderr: stdout carries JSON-RPC responses when the protocol
/// gateway is serving. RUST_LOG overrides the configured level.
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json().with_current_span(true).with_span_list(true))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.with_target(false))
            .try_init()?;
    }

    tracing::debug!("Agent lab telemetry initialized with structured logging");
    Ok(())
}

/// Generate a correlation ID for linking related operations
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Create a span with common agent coordination attributes
pub fn create_coordination_span(
    operation: &str,
    agent_id: Option<&str>,
    phase: Option<&str>,
    correlation_id: Option<&str>,
) -> tracing::Span {
    tracing::info_span!(
        "agent_coordination",
        operation = operation,
        agent.id = agent_id,
        phase.name = phase,
        correlation.id = correlation_id,
    )
}
