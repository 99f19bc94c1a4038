//! Injector timing configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default bound on waiting for a stop to be confirmed (µs).
pub const DEFAULT_STOP_TIMEOUT_US: u64 = 500;

/// Default sleep between stopped-state probes (µs).
pub const DEFAULT_POLL_INTERVAL_US: u64 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectorConfig {
    /// How long to wait for the target to reach the stopped state
    pub stop_timeout_us: u64,
    /// Sleep between stopped-state probes while waiting
    pub poll_interval_us: u64,
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            stop_timeout_us: DEFAULT_STOP_TIMEOUT_US,
            poll_interval_us: DEFAULT_POLL_INTERVAL_US,
        }
    }
}

impl InjectorConfig {
    /// Create a new configuration builder
    pub fn builder() -> InjectorConfigBuilder {
        InjectorConfigBuilder::default()
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_micros(self.stop_timeout_us)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }
}

/// Builder for InjectorConfig
#[derive(Debug, Clone, Default)]
pub struct InjectorConfigBuilder {
    stop_timeout: Option<Duration>,
    poll_interval: Option<Duration>,
}

impl InjectorConfigBuilder {
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = Some(timeout);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Build the configuration
    pub fn build(self) -> InjectorConfig {
        let default = InjectorConfig::default();
        InjectorConfig {
            stop_timeout_us: self
                .stop_timeout
                .map_or(default.stop_timeout_us, whole_micros),
            poll_interval_us: self
                .poll_interval
                .map_or(default.poll_interval_us, whole_micros),
        }
    }
}

/// Microseconds in `d`, saturating at `u64::MAX`.
fn whole_micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}
