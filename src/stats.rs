//! Rolling statistics window (spec §3.2/§3.3/§4.2).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::bucket::{new_shared_cumulative, Bucket, BucketField, CumulativeCounters, SharedCumulative};
use crate::config::BreakerConfig;
use crate::events::{Listeners, StatsEvent};
use crate::timer::TimerHandle;

/// A point-in-time aggregate over the whole rolling window, plus the
/// lifetime cumulative counters (spec §3.3).
///
/// Deliberately does **not** carry raw `request_times`: a snapshot is meant
/// to be cheap to clone and safe to publish to a dashboard, not a full
/// window replica.
#[derive(Debug, Clone, Default)]
pub struct TotalStats {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub short_circuited: u64,
    pub latency_mean: u64,
    /// Parallel to `Stats::percentiles`: `percentiles[i]` maps to
    /// `latency_percentiles[i]`.
    pub latency_percentiles: Vec<(f64, u32)>,
    pub cumulative: CumulativeCounters,
}

/// Exact percentile selection (spec §4.2.1).
///
/// `values` must already be sorted ascending. `p == 0.0` always selects the
/// first element; otherwise the element at `ceil(p * n) - 1`. An empty
/// slice always yields `0`.
#[must_use]
pub fn percentile(values: &[u32], p: f64) -> u32 {
    let n = values.len();
    if n == 0 {
        return 0;
    }
    if p <= 0.0 {
        return values[0];
    }
    let idx = (p * n as f64).ceil() as usize;
    let idx = idx.clamp(1, n);
    values[idx - 1]
}

/// Exact mean (spec §4.2.2): `round(sum / n)`, `0` if `values` is empty.
#[must_use]
pub fn mean(values: &[u32]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let sum: u64 = values.iter().map(|&v| u64::from(v)).sum();
    let n = values.len() as f64;
    (sum as f64 / n).round() as u64
}

/// Build a full-capacity ring of `bucket_num` fresh buckets, all sharing
/// `cumulative` (spec §3.2: "Exactly `bucketNum` buckets exist at all
/// times"). Used both at construction and on every `reset()` so the window
/// is never narrower than its configured width.
fn fresh_bucket_ring(bucket_num: usize, cumulative: &SharedCumulative) -> VecDeque<Bucket> {
    let mut buckets = VecDeque::with_capacity(bucket_num);
    for _ in 0..bucket_num {
        buckets.push_back(Bucket::new(Arc::clone(cumulative)));
    }
    buckets
}

/// The rolling window itself: a fixed-capacity ring of `Bucket`s plus the
/// background timers that rotate it and publish snapshots.
pub struct Stats {
    bucket_span: Duration,
    bucket_num: usize,
    percentiles: Vec<f64>,
    cumulative: SharedCumulative,
    buckets: Mutex<VecDeque<Bucket>>,
    totals: Mutex<TotalStats>,
    pub listeners: Listeners<StatsEvent>,
    rotation_timer: Mutex<Option<Arc<TimerHandle>>>,
    snapshot_timer: Mutex<Option<Arc<TimerHandle>>>,
}

impl Stats {
    #[must_use]
    pub fn new(config: &BreakerConfig) -> Arc<Self> {
        let cumulative = new_shared_cumulative();
        let buckets = fresh_bucket_ring(config.bucket_num, &cumulative);

        let stats = Arc::new(Self {
            bucket_span: config.bucket_span,
            bucket_num: config.bucket_num,
            percentiles: config.percentiles.clone(),
            cumulative,
            buckets: Mutex::new(buckets),
            totals: Mutex::new(TotalStats::default()),
            listeners: Listeners::new(),
            rotation_timer: Mutex::new(None),
            snapshot_timer: Mutex::new(None),
        });

        // Seed `totals` with a real snapshot rather than `TotalStats::default()`
        // so the percentile table is populated with zeros for every
        // configured percentile from the start, not empty until the first
        // publish (spec §4.2 Construction / §8 Boundaries).
        *stats.totals.lock().unwrap() = stats.generate_stats(true);

        let rotation = {
            let stats = Arc::clone(&stats);
            TimerHandle::spawn("circuit-runtime-rotation", stats.bucket_span, move || {
                stats.rotate();
            })
        };
        *stats.rotation_timer.lock().unwrap() = Some(rotation);

        let snapshot_interval = config.stat_interval;
        let snapshot = {
            let stats = Arc::clone(&stats);
            TimerHandle::spawn("circuit-runtime-snapshot", snapshot_interval, move || {
                stats.publish_snapshot();
            })
        };
        *stats.snapshot_timer.lock().unwrap() = Some(snapshot);

        stats
    }

    pub fn record_success(&self, run_time_ms: u32) {
        self.buckets
            .lock()
            .unwrap()
            .back_mut()
            .expect("rolling window always has at least one bucket")
            .success(run_time_ms);
        self.publish_update();
    }

    pub fn record_failure(&self, run_time_ms: u32) {
        self.buckets
            .lock()
            .unwrap()
            .back_mut()
            .expect("rolling window always has at least one bucket")
            .failure(run_time_ms);
        self.publish_update();
    }

    pub fn record_timeout(&self, run_time_ms: u32) {
        self.buckets
            .lock()
            .unwrap()
            .back_mut()
            .expect("rolling window always has at least one bucket")
            .timeout(run_time_ms);
        self.publish_update();
    }

    pub fn record_short_circuit(&self) {
        self.buckets
            .lock()
            .unwrap()
            .back_mut()
            .expect("rolling window always has at least one bucket")
            .short_circuit();
        self.publish_update();
    }

    /// Aggregate counters across every live bucket, without recomputing
    /// latency percentiles (cheap: used for the threshold check on every
    /// recorded outcome).
    #[must_use]
    pub fn window_counts(&self) -> (u64, u64, u64, u64, u64) {
        let buckets = self.buckets.lock().unwrap();
        buckets.iter().fold((0, 0, 0, 0, 0), |acc, b| {
            (
                acc.0 + b.total,
                acc.1 + b.successful,
                acc.2 + b.failed,
                acc.3 + b.timed_out,
                acc.4 + b.short_circuited,
            )
        })
    }

    /// `successful / total` across the live window, or `1.0` with an empty
    /// window (an empty window cannot be failing).
    #[must_use]
    pub fn success_ratio(&self) -> f64 {
        let (total, successful, ..) = self.window_counts();
        if total == 0 {
            return 1.0;
        }
        successful as f64 / total as f64
    }

    #[must_use]
    pub fn total_requests(&self) -> u64 {
        self.window_counts().0
    }

    /// Recompute the full aggregate, including latency percentiles when
    /// `include_latency` is set (percentile computation sorts every sample
    /// in the window, so callers on a hot path can skip it).
    #[must_use]
    pub fn generate_stats(&self, include_latency: bool) -> TotalStats {
        let (total, successful, failed, timed_out, short_circuited) = self.window_counts();
        let cumulative = *self.cumulative.lock().unwrap();

        let (latency_mean, latency_percentiles) = if include_latency {
            let mut samples: Vec<u32> = {
                let buckets = self.buckets.lock().unwrap();
                buckets.iter().flat_map(|b| b.request_times.iter().copied()).collect()
            };
            samples.sort_unstable();
            let percentiles = self
                .percentiles
                .iter()
                .map(|&p| (p, percentile(&samples, p)))
                .collect();
            (mean(&samples), percentiles)
        } else {
            let previous = self.totals.lock().unwrap();
            (previous.latency_mean, previous.latency_percentiles.clone())
        };

        TotalStats {
            total,
            successful,
            failed,
            timed_out,
            short_circuited,
            latency_mean,
            latency_percentiles,
            cumulative,
        }
    }

    fn publish_update(&self) {
        let snapshot = self.generate_stats(false);
        *self.totals.lock().unwrap() = snapshot.clone();
        self.listeners.notify(&StatsEvent::Update(snapshot));
    }

    fn publish_snapshot(&self) {
        let snapshot = self.generate_stats(true);
        *self.totals.lock().unwrap() = snapshot.clone();
        self.cumulative.lock().unwrap().reset_derivatives();
        self.listeners.notify(&StatsEvent::Snapshot(snapshot));
    }

    /// Push a fresh bucket onto the ring, evicting the oldest once the ring
    /// is at capacity.
    fn rotate(&self) {
        let mut buckets = self.buckets.lock().unwrap();
        buckets.push_back(Bucket::new(Arc::clone(&self.cumulative)));
        while buckets.len() > self.bucket_num {
            buckets.pop_front();
        }
    }

    pub fn reset(&self) {
        *self.buckets.lock().unwrap() = fresh_bucket_ring(self.bucket_num, &self.cumulative);
    }

    /// Cancel both background timers. Returns whether each was still
    /// running (spec §8: idempotent, truthy-then-falsy).
    pub fn stop_rotation(&self) -> bool {
        self.rotation_timer
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|t| t.stop())
    }

    pub fn stop_snapshot(&self) -> bool {
        self.snapshot_timer
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|t| t.stop())
    }

    #[must_use]
    pub fn percent(&self, field: BucketField) -> f64 {
        let buckets = self.buckets.lock().unwrap();
        let bucket = buckets.back().expect("rolling window always has at least one bucket");
        bucket.percent(field)
    }
}
