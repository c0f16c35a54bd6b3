//! Filter health manager configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::BackoffPolicy;

/// Capacity of the application command channel.
pub const DEFAULT_COMMAND_CAPACITY: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Subscriptions each filter is driven toward
    pub min_peers_for_filter: usize,
    /// Health check period
    pub ping_interval: Duration,
    /// Deadline for a single liveness ping
    pub ping_timeout: Duration,
    /// Deadline for a single subscribe attempt
    pub subscribe_timeout: Duration,
    /// Deadline for a single unsubscribe
    pub unsubscribe_timeout: Duration,
    /// Backoff for ping-driven resubscribes
    pub resubscribe_backoff: BackoffPolicy,
    /// Bound on queued application commands
    pub command_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            min_peers_for_filter: 2,
            ping_interval: Duration::from_secs(5),
            ping_timeout: Duration::from_secs(10),
            subscribe_timeout: Duration::from_secs(30),
            unsubscribe_timeout: Duration::from_secs(10),
            resubscribe_backoff: BackoffPolicy::default(),
            command_capacity: DEFAULT_COMMAND_CAPACITY,
        }
    }
}

impl ManagerConfig {
    /// Fast ticks, short deadlines, no backoff
    pub fn for_testing() -> Self {
        Self {
            min_peers_for_filter: 2,
            ping_interval: Duration::from_millis(50),
            ping_timeout: Duration::from_millis(100),
            subscribe_timeout: Duration::from_millis(200),
            unsubscribe_timeout: Duration::from_millis(100),
            resubscribe_backoff: BackoffPolicy::disabled(),
            command_capacity: 16,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.min_peers_for_filter == 0 {
            return Err("min_peers_for_filter must be > 0".to_string());
        }
        if self.ping_interval.is_zero() {
            return Err("ping_interval must be > 0".to_string());
        }
        if self.ping_timeout.is_zero()
            || self.subscribe_timeout.is_zero()
            || self.unsubscribe_timeout.is_zero()
        {
            return Err("timeouts must be > 0".to_string());
        }
        if self.command_capacity == 0 {
            return Err("command_capacity must be > 0".to_string());
        }
        if self.resubscribe_backoff.is_enabled()
            && self.resubscribe_backoff.max < self.resubscribe_backoff.base
        {
            return Err("resubscribe_backoff.max must be >= base".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_peers_for_filter, 2);
        assert_eq!(config.ping_interval, Duration::from_secs(5));
        assert_eq!(config.ping_timeout, Duration::from_secs(10));
        assert_eq!(config.subscribe_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_zero_quorum_invalid() {
        let config = ManagerConfig {
            min_peers_for_filter: 0,
            ..ManagerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeouts_invalid() {
        let zero_unsubscribe = ManagerConfig {
            unsubscribe_timeout: Duration::ZERO,
            ..ManagerConfig::default()
        };
        assert!(zero_unsubscribe.validate().is_err());

        let zero_ping = ManagerConfig {
            ping_timeout: Duration::ZERO,
            ..ManagerConfig::for_testing()
        };
        assert!(zero_ping.validate().is_err());
    }
}
