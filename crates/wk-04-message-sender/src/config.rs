//! Message sender configuration

use serde::{Deserialize, Serialize};
use shared_types::DEFAULT_PUBSUB_TOPIC;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Relay peers required on a topic before publishing to it
    pub min_peers_for_relay: usize,
    /// Bound on envelopes waiting for broadcast
    pub queue_capacity: usize,
    /// Deadline for a single publish
    pub publish_timeout: Duration,
    /// Report success without touching the network
    pub skip_publish: bool,
    /// Topic used when `send` is given none
    pub default_pubsub_topic: String,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            min_peers_for_relay: 1,
            queue_capacity: 1024,
            publish_timeout: Duration::from_secs(10),
            skip_publish: false,
            default_pubsub_topic: DEFAULT_PUBSUB_TOPIC.to_string(),
        }
    }
}

impl SenderConfig {
    pub fn for_testing() -> Self {
        Self {
            queue_capacity: 16,
            publish_timeout: Duration::from_millis(200),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be > 0".to_string());
        }
        if self.publish_timeout.is_zero() {
            return Err("publish_timeout must be > 0".to_string());
        }
        if self.default_pubsub_topic.is_empty() {
            return Err("default_pubsub_topic must not be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SenderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_peers_for_relay, 1);
        assert!(!config.skip_publish);
    }

    #[test]
    fn test_empty_default_topic_invalid() {
        let config = SenderConfig {
            default_pubsub_topic: String::new(),
            ..SenderConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
