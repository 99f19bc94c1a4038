//! Optional TOML configuration file.
//!
//! ```toml
//! [injector]
//! stop_timeout_us = 500
//! poll_interval_us = 50
//!
//! [campaign]
//! mean_interval_secs = 60.0
//! max_faults = 10
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use kfi_core::{CampaignConfig, InjectorConfig};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub injector: InjectorConfig,
    pub campaign: CampaignConfig,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

/// Parse `500ms`, `30s`, `2m`, `1h`, or a bare number of seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);

    let value: f64 = number
        .parse()
        .with_context(|| format!("invalid duration '{s}'"))?;
    let nanos_per_unit = match unit {
        "" | "s" => 1e9,
        "us" | "µs" => 1e3,
        "ms" => 1e6,
        "m" => 60e9,
        "h" => 3600e9,
        other => bail!("unknown duration unit '{other}'"),
    };
    let nanos = value * nanos_per_unit;
    if !nanos.is_finite() || nanos >= u64::MAX as f64 {
        bail!("duration out of range '{s}'");
    }
    Ok(Duration::from_nanos(nanos.round() as u64))
}
