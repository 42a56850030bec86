//! Log output setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::domain::{GatewayError, LogConfig};

/// Install the global tracing subscriber.
///
/// Fails if the filter directive is invalid or a subscriber is already set.
pub fn init_tracing(config: &LogConfig) -> Result<(), GatewayError> {
    let env_filter = EnvFilter::try_new(&config.level)
        .map_err(|e| GatewayError::Telemetry(e.to_string()))?;

    if config.json {
        // JSON output for containers/production
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .try_init()
            .map_err(|e| GatewayError::Telemetry(e.to_string()))?;
    } else {
        // Pretty output for development
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| GatewayError::Telemetry(e.to_string()))?;
    }

    tracing::info!(level = %config.level, json = config.json, "Logging initialized");
    Ok(())
}
