//! Telemetry configuration from environment variables.

use serde::{Deserialize, Serialize};
use std::env;

/// Configuration for logging and metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error) or a full
    /// `EnvFilter` directive such as `info,wk_03_filter_manager=debug`
    pub log_level: String,

    /// Whether to enable console output
    pub console_output: bool,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,

    /// Include source file and line in JSON logs
    pub with_source_location: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "waku-pipeline".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
            with_source_location: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `WAKU_SERVICE_NAME`: Service name (default: waku-pipeline)
    /// - `WAKU_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `WAKU_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `WAKU_JSON_LOGS`: Enable JSON logs (default: false in dev, true in containers)
    /// - `WAKU_LOG_SOURCE`: Include file/line in logs (default: false)
    pub fn from_env() -> Self {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading variables through
    /// `lookup` instead of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let is_container =
            lookup("KUBERNETES_SERVICE_HOST").is_some() || lookup("DOCKER_CONTAINER").is_some();
        let flag = |var: &str, default: bool| lookup(var).map(|v| parse_flag(&v)).unwrap_or(default);

        Self {
            service_name: lookup("WAKU_SERVICE_NAME")
                .unwrap_or_else(|| "waku-pipeline".to_string()),

            log_level: lookup("WAKU_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or_else(|| "info".to_string()),

            console_output: flag("WAKU_CONSOLE_OUTPUT", true),
            json_logs: flag("WAKU_JSON_LOGS", is_container),
            with_source_location: flag("WAKU_LOG_SOURCE", false),
        }
    }

    /// Configuration used by tests: quiet, human readable.
    pub fn for_testing() -> Self {
        Self {
            log_level: "warn".to_string(),
            ..Self::default()
        }
    }
}

fn parse_flag(value: &str) -> bool {
    let v = value.to_lowercase();
    v == "true" || v == "1" || v == "yes"
}
