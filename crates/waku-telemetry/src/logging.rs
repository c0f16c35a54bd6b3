//! Structured logging.
//!
//! Logs carry consistent fields so they can be filtered per component:
//! - `subsystem`: pipeline component (filter-registry, envelope-pipeline, ...)
//! - `filter_id`, `peer_id`, `hash`: routing context where relevant
//! - Additional context fields

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::{TelemetryConfig, TelemetryError};

/// Structured logger handle
pub struct StructuredLogger;

/// Install the global `tracing` subscriber.
///
/// Returns `TelemetryError::LoggerInit` if a global subscriber was already
/// installed (e.g. by a test harness).
pub fn init_logging(config: &TelemetryConfig) -> Result<StructuredLogger, TelemetryError> {
    let env_filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::Config(e.to_string()))?;

    let console_layer = if !config.console_output {
        None
    } else if config.json_logs {
        // JSON output for containers/production
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(config.with_source_location)
                .with_line_number(config.with_source_location)
                .boxed(),
        )
    } else {
        // Pretty output for development
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(config.with_source_location)
                .with_line_number(config.with_source_location)
                .with_ansi(true)
                .boxed(),
        )
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init()
        .map_err(|e| TelemetryError::LoggerInit(e.to_string()))?;

    tracing::debug!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "Structured logging configured"
    );

    Ok(StructuredLogger)
}

/// Helper to create structured log entries with consistent formatting.
#[macro_export]
macro_rules! log_event {
    ($level:ident, $subsystem:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            subsystem = $subsystem,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log an envelope-related event with standard fields.
#[macro_export]
macro_rules! log_envelope_event {
    ($level:ident, $subsystem:expr, $msg:expr, $hash:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            subsystem = $subsystem,
            hash = %$hash,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a peer-related event with standard fields.
#[macro_export]
macro_rules! log_peer_event {
    ($level:ident, $subsystem:expr, $msg:expr, $peer_id:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            subsystem = $subsystem,
            peer_id = %$peer_id,
            $($($field)*,)?
            $msg
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_directive_rejected() {
        let config = TelemetryConfig {
            log_level: "info,[".to_string(),
            ..TelemetryConfig::default()
        };
        assert!(matches!(
            init_logging(&config),
            Err(TelemetryError::Config(_))
        ));
    }

    #[test]
    fn test_macros_expand() {
        let hash = "0xabc";
        let peer = "peer-1";
        log_event!(debug, "test", "plain event", count = 3);
        log_envelope_event!(debug, "test", "envelope event", hash);
        log_peer_event!(debug, "test", "peer event", peer, attempt = 1);
    }
}
