//! Hystrix-shaped JSON snapshot mapping and SSE framing (spec §6.2).
//!
//! Peripheral: not part of the core statistics/breaker path, and only
//! compiled in behind the `dashboard` feature. A dashboard only ever reads
//! a [`crate::stats::TotalStats`] snapshot; it never reaches into
//! `Breaker` or `Circuit` internals.

use serde::Serialize;

use crate::stats::TotalStats;

/// One Hystrix-command-shaped JSON payload.
#[derive(Debug, Serialize)]
pub struct HystrixSnapshot {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: String,
    pub group: String,
    #[serde(rename = "currentTime")]
    pub current_time_ms: i64,
    #[serde(rename = "isCircuitBreakerOpen")]
    pub is_circuit_breaker_open: bool,
    #[serde(rename = "errorPercentage")]
    pub error_percentage: f64,
    #[serde(rename = "errorCount")]
    pub error_count: u64,
    #[serde(rename = "requestCount")]
    pub request_count: u64,
    #[serde(rename = "rollingCountSuccess")]
    pub rolling_count_success: u64,
    #[serde(rename = "rollingCountFailure")]
    pub rolling_count_failure: u64,
    #[serde(rename = "rollingCountTimeout")]
    pub rolling_count_timeout: u64,
    #[serde(rename = "rollingCountShortCircuited")]
    pub rolling_count_short_circuited: u64,
    #[serde(rename = "latencyExecute_mean")]
    pub latency_execute_mean: u64,
    /// Percentile keys are the fractional percentile scaled to a
    /// percentage (`0`, `25`, `50`, ... `100`). Deliberately sparse: only
    /// the percentiles the breaker was configured to compute appear here.
    /// Gaps are not backfilled with interpolated or zeroed values (spec
    /// §9, Open Question).
    #[serde(rename = "latencyExecute")]
    pub latency_execute: std::collections::BTreeMap<String, u32>,
}

/// Current wall-clock time in milliseconds, the same unit Hystrix
/// dashboards expect for `currentTime`.
#[must_use]
pub fn current_time_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl HystrixSnapshot {
    #[must_use]
    pub fn from_total_stats(
        name: &str,
        group: &str,
        is_open: bool,
        current_time_ms: i64,
        stats: &TotalStats,
    ) -> Self {
        let error_count = stats.failed + stats.timed_out;
        let error_percentage = if stats.total == 0 {
            0.0
        } else {
            error_count as f64 / stats.total as f64 * 100.0
        };

        let latency_execute = stats
            .latency_percentiles
            .iter()
            .map(|(p, value)| (percentile_key(*p), *value))
            .collect();

        Self {
            kind: "HystrixCommand",
            name: name.to_string(),
            group: group.to_string(),
            current_time_ms,
            is_circuit_breaker_open: is_open,
            error_percentage,
            error_count,
            request_count: stats.total,
            rolling_count_success: stats.successful,
            rolling_count_failure: stats.failed,
            rolling_count_timeout: stats.timed_out,
            rolling_count_short_circuited: stats.short_circuited,
            latency_execute_mean: stats.latency_mean,
            latency_execute,
        }
    }

    /// Serialize as compact JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Frame this snapshot as a single `text/event-stream` message.
    pub fn to_sse_frame(&self) -> serde_json::Result<String> {
        Ok(format!("data: {}\n\n", self.to_json()?))
    }
}

fn percentile_key(p: f64) -> String {
    let as_percentage = p * 100.0;
    if (as_percentage - as_percentage.round()).abs() < 1e-9 {
        format!("{}", as_percentage.round() as i64)
    } else {
        format!("{as_percentage}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_stats() -> TotalStats {
        TotalStats {
            total: 10,
            successful: 8,
            failed: 1,
            timed_out: 1,
            short_circuited: 0,
            latency_mean: 42,
            latency_percentiles: vec![(0.5, 30), (0.99, 120), (0.995, 150)],
            cumulative: crate::bucket::CumulativeCounters::default(),
        }
    }

    #[test]
    fn maps_error_percentage_from_failed_and_timed_out() {
        let snapshot = HystrixSnapshot::from_total_stats("svc", "grp", false, 0, &sample_stats());
        assert!((snapshot.error_percentage - 20.0).abs() < 1e-9);
        assert_eq!(snapshot.error_count, 2);
    }

    #[test]
    fn percentile_keys_are_sparse_not_backfilled() {
        let snapshot = HystrixSnapshot::from_total_stats("svc", "grp", false, 0, &sample_stats());
        assert_eq!(snapshot.latency_execute.len(), 3);
        assert!(snapshot.latency_execute.contains_key("50"));
        assert!(snapshot.latency_execute.contains_key("99.5"));
        assert!(!snapshot.latency_execute.contains_key("75"));
    }

    #[test]
    fn sse_frame_is_newline_terminated_json() {
        let snapshot = HystrixSnapshot::from_total_stats("svc", "grp", true, 0, &sample_stats());
        let frame = snapshot.to_sse_frame().unwrap();
        assert!(frame.starts_with("data: "));
        assert!(frame.ends_with("\n\n"));
    }
}
