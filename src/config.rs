//! Configuration for a [`crate::breaker::Breaker`].
//!
//! Follows `mcp-agent-mail-core`'s `config.rs`: a plain, doc-commented
//! struct with a `Default` impl carrying the documented defaults, plus a
//! `validate` step that fails fast on out-of-range values rather than
//! silently clamping them.

use std::time::Duration;

use crate::error::{BreakerError, Result};

/// Default percentiles computed per snapshot (spec §6.1).
pub const DEFAULT_PERCENTILES: &[f64] = &[0.0, 0.25, 0.5, 0.75, 0.9, 0.95, 0.99, 0.995, 1.0];

/// Recognised configuration for a `Breaker` (spec §6.1).
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Identifier in errors and snapshots. Default: `"defaultBrake"`.
    pub name: String,
    /// Dashboard grouping key. Default: `"defaultBrakeGroup"`.
    pub group: String,
    /// Bucket rotation period. Default: 1000ms.
    pub bucket_span: Duration,
    /// Ring capacity (number of buckets retained). Default: 60.
    pub bucket_num: usize,
    /// Snapshot publication period. Default: 1200ms.
    pub stat_interval: Duration,
    /// Percentiles computed per snapshot, each in `[0, 1]`.
    pub percentiles: Vec<f64>,
    /// Cooldown duration when no health check is configured. Default:
    /// 30000ms.
    pub circuit_duration: Duration,
    /// Minimum `total` before the threshold check runs. Default: 100.
    ///
    /// Preserved verbatim from the source behaviour (spec §9, Open
    /// Questions): the check is `total > waitThreshold`, strictly greater,
    /// so with the default of 100 the 101st request is the first one that
    /// can trip the breaker, not the 100th.
    pub wait_threshold: u64,
    /// Minimum success ratio before the breaker opens, in `(0, 1]`.
    /// Default: 0.5.
    pub threshold: f64,
    /// Default per-exec timeout. Default: 15000ms.
    pub timeout: Duration,
    /// Probe period while healing via a health check. Default: 5000ms.
    pub health_check_interval: Duration,
    /// Register this breaker with the process-wide [`crate::registry::GlobalRegistry`].
    /// Default: `true`.
    pub register_global: bool,
    /// Prepend `[Breaker: name] ` to surfaced error messages. Default: `true`.
    pub modify_error: bool,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            name: "defaultBrake".to_string(),
            group: "defaultBrakeGroup".to_string(),
            bucket_span: Duration::from_millis(1000),
            bucket_num: 60,
            stat_interval: Duration::from_millis(1200),
            percentiles: DEFAULT_PERCENTILES.to_vec(),
            circuit_duration: Duration::from_millis(30_000),
            wait_threshold: 100,
            threshold: 0.5,
            timeout: Duration::from_millis(15_000),
            health_check_interval: Duration::from_millis(5_000),
            register_global: true,
            modify_error: true,
        }
    }
}

impl BreakerConfig {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Build a config from `BREAKER_*` environment variables, falling back
    /// to the documented default for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_value("BREAKER_NAME") {
            config.name = v;
        }
        if let Some(v) = env_value("BREAKER_GROUP") {
            config.group = v;
        }
        config.bucket_span = Duration::from_millis(env_u64(
            "BREAKER_BUCKET_SPAN_MS",
            config.bucket_span.as_millis() as u64,
        ));
        config.bucket_num = env_usize("BREAKER_BUCKET_NUM", config.bucket_num);
        config.stat_interval = Duration::from_millis(env_u64(
            "BREAKER_STAT_INTERVAL_MS",
            config.stat_interval.as_millis() as u64,
        ));
        config.circuit_duration = Duration::from_millis(env_u64(
            "BREAKER_CIRCUIT_DURATION_MS",
            config.circuit_duration.as_millis() as u64,
        ));
        config.wait_threshold = env_u64("BREAKER_WAIT_THRESHOLD", config.wait_threshold);
        config.threshold = env_f64("BREAKER_THRESHOLD", config.threshold);
        config.timeout =
            Duration::from_millis(env_u64("BREAKER_TIMEOUT_MS", config.timeout.as_millis() as u64));
        config.health_check_interval = Duration::from_millis(env_u64(
            "BREAKER_HEALTH_CHECK_INTERVAL_MS",
            config.health_check_interval.as_millis() as u64,
        ));
        config.register_global = env_bool("BREAKER_REGISTER_GLOBAL", config.register_global);
        config.modify_error = env_bool("BREAKER_MODIFY_ERROR", config.modify_error);
        config
    }

    /// Reject configurations that cannot be satisfied, rather than
    /// silently clamping them at construction time.
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(BreakerError::InvalidThreshold(self.threshold));
        }
        if self.percentiles.is_empty()
            || self
                .percentiles
                .iter()
                .any(|p| !(0.0..=1.0).contains(p) || p.is_nan())
        {
            return Err(BreakerError::InvalidPercentiles(self.percentiles.clone()));
        }
        if self.bucket_num == 0 {
            return Err(BreakerError::InvalidBucketNum(self.bucket_num));
        }
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn env_bool(key: &str, default: bool) -> bool {
    env_value(key).map_or(default, |v| match v.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    })
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_value(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env_value(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env_value(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
