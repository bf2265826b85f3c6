//! Property tests for the rolling window's core invariants (spec §8).

use proptest::prelude::*;

use circuit_runtime::bucket::{new_shared_cumulative, Bucket, BucketField};
use circuit_runtime::stats::{mean, percentile};

proptest! {
    /// `total` always equals the sum of the three outcome counters, and
    /// `request_times.len()` always tracks it; short circuits never
    /// contribute to either.
    #[test]
    fn bucket_total_equals_sum_of_outcomes(
        successes in 0u32..50,
        failures in 0u32..50,
        timeouts in 0u32..50,
        short_circuits in 0u32..50,
    ) {
        let mut bucket = Bucket::new(new_shared_cumulative());
        for i in 0..successes { bucket.success(i); }
        for i in 0..failures { bucket.failure(i); }
        for i in 0..timeouts { bucket.timeout(i); }
        for _ in 0..short_circuits { bucket.short_circuit(); }

        prop_assert_eq!(bucket.total, u64::from(successes + failures + timeouts));
        prop_assert_eq!(bucket.request_times.len(), (successes + failures + timeouts) as usize);
        prop_assert_eq!(bucket.short_circuited, u64::from(short_circuits));
    }

    /// Every per-field percentage reported by `Bucket::percent` stays
    /// within `[0, 1]` regardless of the mix of outcomes recorded.
    #[test]
    fn bucket_percent_is_always_a_fraction(
        successes in 0u32..50,
        failures in 0u32..50,
        timeouts in 0u32..50,
    ) {
        let mut bucket = Bucket::new(new_shared_cumulative());
        for i in 0..successes { bucket.success(i); }
        for i in 0..failures { bucket.failure(i); }
        for i in 0..timeouts { bucket.timeout(i); }

        for field in [
            BucketField::Total,
            BucketField::Successful,
            BucketField::Failed,
            BucketField::TimedOut,
        ] {
            let p = bucket.percent(field);
            prop_assert!((0.0..=1.0).contains(&p));
        }
    }

    /// Percentile selection is monotonic: a higher `p` never selects a
    /// smaller value from the same sorted sample set.
    #[test]
    fn percentile_is_monotonic_in_p(mut values in prop::collection::vec(0u32..10_000, 1..200)) {
        values.sort_unstable();
        let lower = percentile(&values, 0.25);
        let mid = percentile(&values, 0.5);
        let upper = percentile(&values, 0.9);
        prop_assert!(lower <= mid);
        prop_assert!(mid <= upper);
    }

    /// `percentile` always returns a value that was actually present in
    /// the sample set (or 0 for an empty set).
    #[test]
    fn percentile_returns_a_sample_from_the_input(mut values in prop::collection::vec(0u32..10_000, 1..200), p in 0.0f64..=1.0) {
        values.sort_unstable();
        let selected = percentile(&values, p);
        prop_assert!(values.contains(&selected));
    }

    /// `mean` never exceeds the maximum sample nor falls below the
    /// minimum.
    #[test]
    fn mean_is_bounded_by_extremes(values in prop::collection::vec(0u32..10_000, 1..200)) {
        let computed = mean(&values);
        let min = *values.iter().min().unwrap();
        let max = *values.iter().max().unwrap();
        prop_assert!(computed >= u64::from(min));
        prop_assert!(computed <= u64::from(max));
    }
}

#[test]
fn percentile_zero_sample_set_is_zero() {
    assert_eq!(percentile(&[], 0.5), 0);
    assert_eq!(mean(&[]), 0);
}
