//! Per-time-slice outcome tallies (spec §3.1/§4.1).

use std::sync::{Arc, Mutex};

use crate::error::{BreakerError, Result};

/// Counter names recognised by [`Bucket::percent`].
///
/// The spec models this as a stringly-typed field lookup that can fail
/// with `InvalidBucketField`; here the common path is a typed enum so a
/// safe caller can never hit that error, while [`BucketField::parse`]
/// keeps the fallible string path alive for reflective/dashboard callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketField {
    Total,
    Successful,
    Failed,
    TimedOut,
    ShortCircuited,
}

impl BucketField {
    /// Parse a counter name, failing with [`BreakerError::InvalidBucketField`]
    /// for anything unrecognized.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "total" => Ok(Self::Total),
            "successful" => Ok(Self::Successful),
            "failed" => Ok(Self::Failed),
            "timedOut" => Ok(Self::TimedOut),
            "shortCircuited" => Ok(Self::ShortCircuited),
            other => Err(BreakerError::InvalidBucketField(other.to_string())),
        }
    }
}

/// Lifetime cumulative counters, shared by reference between every
/// [`Bucket`] in a [`crate::stats::Stats`] window and the `Stats` itself
/// (spec §3.3).
///
/// The plain fields are monotonically non-decreasing for the process
/// lifetime; the `*_deriv` siblings track the same events but are zeroed
/// at every snapshot boundary by [`crate::stats::Stats`], representing the
/// delta since the previous snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct CumulativeCounters {
    pub count_total: u64,
    pub count_success: u64,
    pub count_failure: u64,
    pub count_timeout: u64,
    pub count_short_circuited: u64,
    pub count_total_deriv: u64,
    pub count_success_deriv: u64,
    pub count_failure_deriv: u64,
    pub count_timeout_deriv: u64,
    pub count_short_circuited_deriv: u64,
}

impl CumulativeCounters {
    /// Reset only the `*_deriv` fields, leaving the plain lifetime counters
    /// untouched (called at each snapshot boundary).
    pub fn reset_derivatives(&mut self) {
        self.count_total_deriv = 0;
        self.count_success_deriv = 0;
        self.count_failure_deriv = 0;
        self.count_timeout_deriv = 0;
        self.count_short_circuited_deriv = 0;
    }
}

/// A thread-safe handle to a shared [`CumulativeCounters`].
pub type SharedCumulative = Arc<Mutex<CumulativeCounters>>;

#[must_use]
pub fn new_shared_cumulative() -> SharedCumulative {
    Arc::new(Mutex::new(CumulativeCounters::default()))
}

/// One time slice of the rolling window (spec §3.1).
///
/// Invariant: `total == successful + failed + timed_out` and
/// `request_times.len() == successful + failed + timed_out`. Short circuits
/// are tallied separately and never touch `total` or `request_times`.
#[derive(Debug)]
pub struct Bucket {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub short_circuited: u64,
    /// Latency samples in ms, append-only within this bucket's active
    /// window. Insertion order is irrelevant — sorted on aggregation.
    pub request_times: Vec<u32>,
    cumulative: SharedCumulative,
}

impl Bucket {
    #[must_use]
    pub fn new(cumulative: SharedCumulative) -> Self {
        Self {
            total: 0,
            successful: 0,
            failed: 0,
            timed_out: 0,
            short_circuited: 0,
            request_times: Vec::new(),
            cumulative,
        }
    }

    pub fn success(&mut self, run_time_ms: u32) {
        self.total += 1;
        self.successful += 1;
        self.request_times.push(run_time_ms);
        let mut c = self.cumulative.lock().unwrap();
        c.count_total += 1;
        c.count_total_deriv += 1;
        c.count_success += 1;
        c.count_success_deriv += 1;
    }

    pub fn failure(&mut self, run_time_ms: u32) {
        self.total += 1;
        self.failed += 1;
        self.request_times.push(run_time_ms);
        let mut c = self.cumulative.lock().unwrap();
        c.count_total += 1;
        c.count_total_deriv += 1;
        c.count_failure += 1;
        c.count_failure_deriv += 1;
    }

    pub fn timeout(&mut self, run_time_ms: u32) {
        self.total += 1;
        self.timed_out += 1;
        self.request_times.push(run_time_ms);
        let mut c = self.cumulative.lock().unwrap();
        c.count_total += 1;
        c.count_total_deriv += 1;
        c.count_timeout += 1;
        c.count_timeout_deriv += 1;
    }

    /// Does **not** touch `total`, `request_times`, or `count_total`
    /// (spec §4.1).
    pub fn short_circuit(&mut self) {
        self.short_circuited += 1;
        let mut c = self.cumulative.lock().unwrap();
        c.count_short_circuited += 1;
        c.count_short_circuited_deriv += 1;
    }

    /// `this[field] / this.total`, or `0` if `total == 0`.
    #[must_use]
    pub fn percent(&self, field: BucketField) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let numerator = match field {
            BucketField::Total => self.total,
            BucketField::Successful => self.successful,
            BucketField::Failed => self.failed,
            BucketField::TimedOut => self.timed_out,
            BucketField::ShortCircuited => self.short_circuited,
        };
        numerator as f64 / self.total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_updates_local_and_cumulative_in_lockstep() {
        let cumulative = new_shared_cumulative();
        let mut bucket = Bucket::new(Arc::clone(&cumulative));
        bucket.success(10);
        bucket.success(20);
        bucket.failure(5);

        assert_eq!(bucket.total, 3);
        assert_eq!(bucket.successful, 2);
        assert_eq!(bucket.failed, 1);
        assert_eq!(bucket.request_times, vec![10, 20, 5]);

        let c = cumulative.lock().unwrap();
        assert_eq!(c.count_total, 3);
        assert_eq!(c.count_success, 2);
        assert_eq!(c.count_failure, 1);
        assert_eq!(c.count_total_deriv, 3);
    }

    #[test]
    fn short_circuit_does_not_touch_total() {
        let cumulative = new_shared_cumulative();
        let mut bucket = Bucket::new(Arc::clone(&cumulative));
        bucket.short_circuit();
        bucket.short_circuit();

        assert_eq!(bucket.total, 0);
        assert_eq!(bucket.short_circuited, 2);
        assert!(bucket.request_times.is_empty());

        let c = cumulative.lock().unwrap();
        assert_eq!(c.count_total, 0);
        assert_eq!(c.count_short_circuited, 2);
    }

    #[test]
    fn percent_is_zero_on_empty_bucket() {
        let bucket = Bucket::new(new_shared_cumulative());
        assert_eq!(bucket.percent(BucketField::Successful), 0.0);
    }

    #[test]
    fn percent_divides_by_total() {
        let cumulative = new_shared_cumulative();
        let mut bucket = Bucket::new(cumulative);
        bucket.success(1);
        bucket.success(1);
        bucket.failure(1);
        assert!((bucket.percent(BucketField::Successful) - (2.0 / 3.0)).abs() < 1e-9);
        assert!((bucket.percent(BucketField::Failed) - (1.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn parse_rejects_unknown_field() {
        assert!(BucketField::parse("bogus").is_err());
        assert!(BucketField::parse("successful").is_ok());
    }
}
