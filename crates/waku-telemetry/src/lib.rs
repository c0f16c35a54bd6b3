//! # Waku Telemetry
//!
//! Structured logging and Prometheus metrics for the message pipeline.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use waku_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! // Logs and metrics are now being collected
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `WAKU_SERVICE_NAME` | `waku-pipeline` | Service name in logs |
//! | `WAKU_LOG_LEVEL` | `info` | Log filter directive (falls back to `RUST_LOG`) |
//! | `WAKU_JSON_LOGS` | `false` | Emit JSON log lines |
//! | `WAKU_CONSOLE_OUTPUT` | `true` | Write logs to stdout |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{init_logging, StructuredLogger};
pub use metrics::{
    encode_metrics, register_metrics, HistogramTimer, MetricsHandle, DISPATCH_QUEUE_DEPTH,
    ENVELOPES_DISPATCHED, ENVELOPES_EXPIRED, ENVELOPES_RECEIVED, ENVELOPE_CACHE,
    ENVELOPE_SIZE_BYTES, ENVELOPE_VALIDATION_FAILURES, FILTERS_INSTALLED,
    FILTER_PEER_OPERATIONS, FILTER_SUBSCRIPTIONS_ACTIVE, MESSAGES_SENT, STORE_QUERIES,
    STORE_QUERY_DURATION,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logger: {0}")]
    LoggerInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Metrics first (no global state beyond the registry)
    let metrics_handle = register_metrics()?;
    let logger = logging::init_logging(&config)?;

    Ok(TelemetryGuard {
        _logger: logger,
        _metrics: metrics_handle,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _logger: StructuredLogger,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry");
    }
}

/// Increment a counter, optionally selecting its label values.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
