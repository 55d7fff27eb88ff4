use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::balancer::DistributionMode;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    /// Period of the rebalance worker.
    pub rebalance_interval: Duration,
    /// Workload the rebalance worker distributes each round.
    pub workload: f64,
    pub mode: DistributionMode,
    /// Longest real wait of the simulated execution backend.
    pub execution_wait_cap: Duration,
    pub high_temperature_c: f64,
    pub optimizer_history: usize,
    pub allocator_initial_intensity: f64,
    pub fleet_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            rebalance_interval: Duration::from_secs(5),
            workload: 1.0,
            mode: DistributionMode::Balanced,
            execution_wait_cap: Duration::from_millis(100),
            high_temperature_c: 80.0,
            optimizer_history: hetsched_signature::DEFAULT_HISTORY_LIMIT,
            allocator_initial_intensity: 7.0,
            fleet_file: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let log_level = lookup("HETSCHED_LOG_LEVEL").unwrap_or(defaults.log_level);

        let rebalance_interval = parse(&lookup, "HETSCHED_REBALANCE_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.rebalance_interval);
        if rebalance_interval.is_zero() {
            anyhow::bail!("HETSCHED_REBALANCE_INTERVAL_SECS must be at least 1");
        }

        let workload: f64 = parse(&lookup, "HETSCHED_WORKLOAD")?.unwrap_or(defaults.workload);
        if !workload.is_finite() || workload < 0.0 {
            anyhow::bail!("HETSCHED_WORKLOAD {workload} must be a non-negative number");
        }

        let mode = parse(&lookup, "HETSCHED_MODE")?.unwrap_or(defaults.mode);

        let execution_wait_cap = parse(&lookup, "HETSCHED_EXECUTION_WAIT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.execution_wait_cap);

        let high_temperature_c =
            parse(&lookup, "HETSCHED_HIGH_TEMPERATURE_C")?.unwrap_or(defaults.high_temperature_c);

        let optimizer_history =
            parse(&lookup, "HETSCHED_OPTIMIZER_HISTORY")?.unwrap_or(defaults.optimizer_history);

        let allocator_initial_intensity = parse(&lookup, "HETSCHED_INITIAL_INTENSITY")?
            .unwrap_or(defaults.allocator_initial_intensity);
        if !(0.0..=14.0).contains(&allocator_initial_intensity) {
            anyhow::bail!(
                "HETSCHED_INITIAL_INTENSITY {allocator_initial_intensity} outside 0-14"
            );
        }

        let fleet_file = lookup("HETSCHED_FLEET_FILE").map(PathBuf::from);

        Ok(Self {
            log_level,
            rebalance_interval,
            workload,
            mode,
            execution_wait_cap,
            high_temperature_c,
            optimizer_history,
            allocator_initial_intensity,
            fleet_file,
        })
    }
}

fn parse<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("{e}"))
                .with_context(|| format!("invalid {key}: {raw:?}"))
        })
        .transpose()
}
