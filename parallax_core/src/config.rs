//! Switchboard configuration.
//!
//! Covers the tunables a deployment actually changes: per-subscription
//! queue depth, what to do when a slow subscriber falls behind, and the
//! worker dequeue timeout that bounds shutdown latency. Loadable from a
//! TOML fragment; every field has a default so an empty config is valid.
//!
//! ```toml
//! [subscription]
//! capacity = 8
//! overflow = "drop_oldest"
//! dequeue_timeout_ms = 100
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ParallaxResult;

/// What the publisher side does when a subscription's queue is full.
///
/// Publishers never wait unboundedly on a slow subscriber; `BlockPublisher`
/// exists for consumers that must observe every event and accept coupling
/// their producer to their own rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Discard the oldest queued event to make room. Bounds memory and
    /// never stalls the publisher.
    #[default]
    DropOldest,
    /// Block the publishing thread until the worker drains one slot.
    BlockPublisher,
    /// Treat overflow as a programming error: log it, drop the event, and
    /// trip a debug assertion.
    Assert,
}

/// Per-subscription queue configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Nominal queue depth. The soft watermark at which the overflow
    /// policy engages.
    pub capacity: usize,
    /// Behavior when the queue is at capacity.
    pub overflow: OverflowPolicy,
    /// Worker timed-dequeue period in milliseconds. Bounds how long a
    /// stop request can go unobserved.
    pub dequeue_timeout_ms: u64,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            capacity: 8,
            overflow: OverflowPolicy::default(),
            dequeue_timeout_ms: 100,
        }
    }
}

impl SubscriptionConfig {
    /// Dequeue timeout as a [`Duration`].
    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }
}

/// Top-level switchboard configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardConfig {
    /// Defaults applied to subscriptions created without an explicit
    /// [`SubscriptionConfig`].
    pub subscription: SubscriptionConfig,
}

impl SwitchboardConfig {
    /// Parse a configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> ParallaxResult<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Load a configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> ParallaxResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SwitchboardConfig::default();
        assert_eq!(config.subscription.capacity, 8);
        assert_eq!(config.subscription.overflow, OverflowPolicy::DropOldest);
        assert_eq!(config.subscription.dequeue_timeout(), Duration::from_millis(100));
    }

    #[test]
    fn test_empty_toml_is_valid() {
        let config = SwitchboardConfig::from_toml_str("").unwrap();
        assert_eq!(config, SwitchboardConfig::default());
    }

    #[test]
    fn test_parse_overflow_policy() {
        let config = SwitchboardConfig::from_toml_str(
            r#"
            [subscription]
            capacity = 64
            overflow = "block_publisher"
            "#,
        )
        .unwrap();
        assert_eq!(config.subscription.capacity, 64);
        assert_eq!(config.subscription.overflow, OverflowPolicy::BlockPublisher);
        // Unspecified field keeps its default
        assert_eq!(config.subscription.dequeue_timeout_ms, 100);
    }

    #[test]
    fn test_bad_policy_is_a_config_error() {
        let err = SwitchboardConfig::from_toml_str(
            r#"
            [subscription]
            overflow = "drop_newest"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchboard.toml");
        std::fs::write(&path, "[subscription]\ncapacity = 32\n").unwrap();
        let config = SwitchboardConfig::from_file(&path).unwrap();
        assert_eq!(config.subscription.capacity, 32);
    }
}
