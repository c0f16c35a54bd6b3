//! Envelope pipeline configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum payload accepted by default (150 KiB, the relay limit).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 150 * 1024;

/// Configuration for the envelope cache and dispatch queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Dispatch queue capacity. Producers wait when it is full.
    pub queue_capacity: usize,
    /// Number of dispatch workers
    pub worker_count: usize,
    /// Largest payload accepted, in bytes
    pub max_message_size: usize,
    /// How long a record stays in the dedup cache
    pub cache_ttl: Duration,
    /// How often expired records are swept
    pub expiry_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            worker_count: num_cpus::get(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            cache_ttl: Duration::from_secs(20 * 60),
            expiry_interval: Duration::from_secs(10),
        }
    }
}

impl PipelineConfig {
    /// Create config for testing (short ttl, small queue)
    pub fn for_testing() -> Self {
        Self {
            queue_capacity: 16,
            worker_count: 2,
            max_message_size: 1024,
            cache_ttl: Duration::from_millis(200),
            expiry_interval: Duration::from_millis(50),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be > 0".to_string());
        }
        if self.worker_count == 0 {
            return Err("worker_count must be > 0".to_string());
        }
        if self.max_message_size == 0 {
            return Err("max_message_size must be > 0".to_string());
        }
        if self.expiry_interval.is_zero() {
            return Err("expiry_interval must be > 0".to_string());
        }
        if self.cache_ttl < self.expiry_interval {
            return Err("cache_ttl must be >= expiry_interval".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue_capacity, 1024);
        assert!(config.worker_count >= 1);
        assert!(PipelineConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn test_zero_workers_invalid() {
        let config = PipelineConfig {
            worker_count: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ttl_shorter_than_interval_invalid() {
        let config = PipelineConfig {
            cache_ttl: Duration::from_secs(1),
            expiry_interval: Duration::from_secs(5),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
