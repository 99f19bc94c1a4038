//! Fault campaigns: repeated random injections into a running workload.
//!
//! Faults arrive as a Poisson process, so the gap between two injections
//! is exponentially distributed around the configured mean.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Default mean time between injections (seconds).
pub const DEFAULT_MEAN_INTERVAL_SECS: f64 = 60.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    /// Mean time between injected faults
    pub mean_interval_secs: f64,
    /// Stop injecting after this many successful faults
    pub max_faults: Option<u32>,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            mean_interval_secs: DEFAULT_MEAN_INTERVAL_SECS,
            max_faults: None,
        }
    }
}

impl CampaignConfig {
    pub fn mean_interval(&self) -> Duration {
        Duration::from_secs_f64(self.mean_interval_secs.max(0.0))
    }
}

/// Draws the delay before each injection.
pub struct FaultClock<R> {
    mean: Duration,
    rng: R,
}

impl<R: RngCore> FaultClock<R> {
    pub fn new(mean: Duration, rng: R) -> Self {
        Self { mean, rng }
    }

    pub fn next_delay(&mut self) -> Duration {
        // 1 - u lies in (0, 1], so the log is finite
        let u: f64 = self.rng.gen_range(0.0..1.0);
        let factor = -(1.0 - u).ln();
        Duration::from_secs_f64(self.mean.as_secs_f64() * factor)
    }
}

/// Running totals for one campaign.
#[derive(Debug, Clone, Default)]
pub struct CampaignStats {
    pub faults: u32,
    pub failed_attempts: u32,
    pub injecting: Duration,
    pub total: Duration,
}

impl CampaignStats {
    /// Account for one injection attempt that took `elapsed`.
    pub fn record_attempt(&mut self, elapsed: Duration, outcome: Result<(), &Error>) {
        self.injecting += elapsed;
        match outcome {
            Ok(()) => self.faults += 1,
            Err(_) => self.failed_attempts += 1,
        }
    }

    pub fn running(&self) -> Duration {
        self.total.saturating_sub(self.injecting)
    }

    /// Share of the total spent injecting, as a percentage.
    pub fn injecting_share(&self) -> f64 {
        if self.total.is_zero() {
            return 0.0;
        }
        self.injecting.as_secs_f64() / self.total.as_secs_f64() * 100.0
    }
}

impl fmt::Display for CampaignStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total execution time: {:?}", round_ms(self.total))?;
        writeln!(
            f,
            "Time spent running the process: {:?}",
            round_ms(self.running())
        )?;
        write!(
            f,
            "Time spent injecting faults ({} faults, {} failed): {:?} ({:.2}% of total execution)",
            self.faults,
            self.failed_attempts,
            round_ms(self.injecting),
            self.injecting_share()
        )
    }
}

fn round_ms(d: Duration) -> Duration {
    Duration::from_millis((d.as_secs_f64() * 1000.0).round() as u64)
}
