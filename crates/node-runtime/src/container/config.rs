//! # Node Configuration
//!
//! Unified configuration for every subsystem, with environment overrides.
//!
//! ## Environment
//!
//! | Variable | Field |
//! |----------|-------|
//! | `WAKU_LIGHT_CLIENT` | `light_client` |
//! | `WAKU_MIN_PEERS_FOR_FILTER` | `manager.min_peers_for_filter` |
//! | `WAKU_MIN_PEERS_FOR_RELAY` | `sender.min_peers_for_relay` |
//! | `WAKU_PING_INTERVAL_SECS` | `manager.ping_interval` |
//! | `WAKU_PING_TIMEOUT_SECS` | `manager.ping_timeout` |
//! | `WAKU_SUBSCRIBE_TIMEOUT_SECS` | `manager.subscribe_timeout` |
//! | `WAKU_DEFAULT_PUBSUB_TOPIC` | registry and sender default topic |
//! | `WAKU_DISPATCH_WORKERS` | `pipeline.worker_count` |
//! | `WAKU_SKIP_PUBLISH` | `sender.skip_publish` |

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use waku_telemetry::TelemetryConfig;
use wk_01_filter_registry::RegistryConfig;
use wk_02_envelope_pipeline::PipelineConfig;
use wk_03_filter_manager::ManagerConfig;
use wk_04_message_sender::SenderConfig;
use wk_05_store_query::StoreConfig;

/// Complete node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Light clients receive through filter subscriptions and publish
    /// through lightpush; full nodes use relay for both.
    pub light_client: bool,
    pub registry: RegistryConfig,
    pub pipeline: PipelineConfig,
    pub manager: ManagerConfig,
    pub sender: SenderConfig,
    pub store: StoreConfig,
    pub telemetry: TelemetryConfig,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid {section} configuration: {reason}")]
    Invalid {
        section: &'static str,
        reason: String,
    },

    #[error("Cannot parse {var}={value}")]
    Env { var: &'static str, value: String },
}

impl NodeConfig {
    /// Defaults overridden from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overridden from `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self {
            telemetry: TelemetryConfig::from_lookup(&lookup),
            ..Self::default()
        };

        if let Some(v) = parse::<_, bool>(&lookup, "WAKU_LIGHT_CLIENT")? {
            config.light_client = v;
        }
        if let Some(v) = parse(&lookup, "WAKU_MIN_PEERS_FOR_FILTER")? {
            config.manager.min_peers_for_filter = v;
        }
        if let Some(v) = parse(&lookup, "WAKU_MIN_PEERS_FOR_RELAY")? {
            config.sender.min_peers_for_relay = v;
        }
        if let Some(v) = parse(&lookup, "WAKU_PING_INTERVAL_SECS")? {
            config.manager.ping_interval = Duration::from_secs(v);
        }
        if let Some(v) = parse(&lookup, "WAKU_PING_TIMEOUT_SECS")? {
            config.manager.ping_timeout = Duration::from_secs(v);
        }
        if let Some(v) = parse(&lookup, "WAKU_SUBSCRIBE_TIMEOUT_SECS")? {
            config.manager.subscribe_timeout = Duration::from_secs(v);
        }
        if let Some(v) = parse(&lookup, "WAKU_DISPATCH_WORKERS")? {
            config.pipeline.worker_count = v;
        }
        if let Some(v) = parse(&lookup, "WAKU_SKIP_PUBLISH")? {
            config.sender.skip_publish = v;
        }
        if let Some(topic) = lookup("WAKU_DEFAULT_PUBSUB_TOPIC") {
            config.registry.default_pubsub_topic = topic.clone();
            config.sender.default_pubsub_topic = topic;
        }

        config.validate()?;
        Ok(config)
    }

    /// Small, fast settings for tests.
    pub fn for_testing() -> Self {
        Self {
            light_client: false,
            registry: RegistryConfig::for_testing(),
            pipeline: PipelineConfig::for_testing(),
            manager: ManagerConfig::for_testing(),
            sender: SenderConfig::for_testing(),
            store: StoreConfig::for_testing(),
            telemetry: TelemetryConfig::for_testing(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn section(name: &'static str, result: Result<(), String>) -> Result<(), ConfigError> {
            result.map_err(|reason| ConfigError::Invalid {
                section: name,
                reason,
            })
        }

        section("registry", self.registry.validate())?;
        section("pipeline", self.pipeline.validate())?;
        section("manager", self.manager.validate())?;
        section("sender", self.sender.validate())?;
        section("store", self.store.validate())?;
        Ok(())
    }
}

fn parse<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { var, value }),
    }
}
