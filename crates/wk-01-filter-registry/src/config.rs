//! Filter Registry configuration

use serde::{Deserialize, Serialize};
use shared_types::DEFAULT_PUBSUB_TOPIC;

/// Configuration for the filter registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Pubsub topic assigned to filters installed without one
    pub default_pubsub_topic: String,
    /// Store capacity for filters that do not request one
    pub default_store_capacity: usize,
    /// Upper bound on concurrently installed filters
    pub max_filters: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_pubsub_topic: DEFAULT_PUBSUB_TOPIC.to_string(),
            default_store_capacity: 1000,
            max_filters: 10_000,
        }
    }
}

impl RegistryConfig {
    /// Small stores so eviction is easy to exercise
    pub fn for_testing() -> Self {
        Self {
            default_store_capacity: 16,
            max_filters: 64,
            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.default_store_capacity == 0 {
            return Err("default_store_capacity must be > 0".to_string());
        }
        if self.max_filters == 0 {
            return Err("max_filters must be > 0".to_string());
        }
        if !crate::domain::is_valid_pubsub_topic(&self.default_pubsub_topic) {
            return Err(format!(
                "default_pubsub_topic {:?} is not a valid topic",
                self.default_pubsub_topic
            ));
        }
        Ok(())
    }
}
