use std::sync::atomic::{AtomicU64, Ordering};

use super::{check_acknowledged, Identity, Metric};
use crate::{
    datapoint::{DataPoint, Dimensions, MetricType},
    value::Subtractor,
};

/// A counter reporting the delta accumulated since the last successful report.
///
/// Acknowledged values are subtracted rather than the counter being zeroed, so increments that land between a
/// snapshot and its acknowledgement carry over to the next cycle.
#[derive(Debug)]
pub struct Counter {
    id: Identity,
    value: AtomicU64,
}

impl Counter {
    /// Creates a new `Counter` starting at zero.
    pub fn new<N: Into<String>>(metric: N, dimensions: Dimensions) -> Self {
        Self::with_initial(metric, dimensions, 0)
    }

    /// Creates a new `Counter` seeded with `initial`.
    pub fn with_initial<N: Into<String>>(metric: N, dimensions: Dimensions, initial: u64) -> Self {
        Self { id: Identity::new(metric.into(), dimensions), value: AtomicU64::new(initial) }
    }

    /// Adds `delta` and returns the new unreported total.
    pub fn inc(&self, delta: u64) -> u64 {
        self.value.fetch_add(delta, Ordering::SeqCst).wrapping_add(delta)
    }

    /// Returns the unreported total.
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }

    /// Returns the metric name.
    pub fn metric(&self) -> &str {
        &self.id.metric
    }

    /// Returns the dimensions.
    pub fn dimensions(&self) -> &Dimensions {
        &self.id.dimensions
    }
}

impl Metric for Counter {
    fn snapshot(&self) -> Option<DataPoint> {
        match i64::try_from(self.value()) {
            Ok(0) | Err(_) => None,
            Ok(value) => Some(self.id.datapoint(MetricType::Counter, value)),
        }
    }

    fn post_report(&self, reported: i64) {
        check_acknowledged(&self.id.metric, reported);
        self.value.fetch_sub(reported as u64, Ordering::SeqCst);
    }
}

/// A counter whose value lives in an external [`Subtractor`].
///
/// Acknowledged values are subtracted from the external storage.
pub struct WrappedCounter<S> {
    id: Identity,
    value: S,
}

impl<S: Subtractor> WrappedCounter<S> {
    /// Creates a new `WrappedCounter` reading from, and subtracting from, `value`.
    pub fn new<N: Into<String>>(metric: N, dimensions: Dimensions, value: S) -> Self {
        Self { id: Identity::new(metric.into(), dimensions), value }
    }

    /// Returns the subtractor backing this counter.
    pub fn getter(&self) -> &S {
        &self.value
    }
}

impl<S: Subtractor> Metric for WrappedCounter<S> {
    fn snapshot(&self) -> Option<DataPoint> {
        let value = self.value.get().and_then(|v| v.as_i64()).ok()?;
        if value < 0 {
            return None;
        }
        Some(self.id.datapoint(MetricType::Counter, value))
    }

    fn post_report(&self, reported: i64) {
        check_acknowledged(&self.id.metric, reported);
        self.value.subtract(reported);
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use proptest::prelude::*;

    use super::{Counter, WrappedCounter};
    use crate::{
        atomics::{Int64, UInt64},
        datapoint::{Dimensions, MetricType},
        metrics::Metric as _,
    };

    #[test]
    fn zero_counter_reports_nothing() {
        let counter = Counter::new("requests", Dimensions::new());
        assert!(counter.snapshot().is_none());
    }

    #[test]
    fn seeded_counter_reports_seed() {
        let counter = Counter::with_initial("requests", Dimensions::new(), 12);
        let point = counter.snapshot().unwrap();
        assert_eq!(point.value(), 12);
        assert_eq!(point.metric_type(), MetricType::Counter);
    }

    #[test]
    fn increments_after_snapshot_survive_acknowledgement() {
        let counter = Counter::new("requests", Dimensions::new());
        counter.inc(10);
        let point = counter.snapshot().unwrap();

        counter.inc(3);
        counter.post_report(point.value());

        assert_eq!(counter.value(), 3);
        assert_eq!(counter.snapshot().unwrap().value(), 3);
    }

    #[test]
    fn values_above_i64_max_are_suppressed() {
        let counter = Counter::with_initial("requests", Dimensions::new(), 1 << 63);
        assert!(counter.snapshot().is_none());

        // Drained out of band below the threshold, it reports again.
        counter.post_report(1);
        assert_eq!(counter.snapshot().unwrap().value(), i64::MAX);
    }

    #[test]
    #[should_panic(expected = "negative value")]
    fn negative_acknowledgement_is_fatal() {
        let counter = Counter::new("requests", Dimensions::new());
        counter.post_report(-1);
    }

    #[test]
    fn concurrent_increments_are_all_reported() {
        let counter = Arc::new(Counter::new("requests", Dimensions::new()));
        let handles = (0..4)
            .map(|_| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..250 {
                        counter.inc(1);
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        let point = counter.snapshot().unwrap();
        assert_eq!(point.value(), 1000);
        counter.post_report(point.value());
        assert_eq!(counter.value(), 0);
    }

    #[test]
    fn wrapped_counter_subtracts_from_source() {
        let cell = Arc::new(UInt64::new(20));
        let counter = WrappedCounter::new("bytes", Dimensions::new(), Arc::clone(&cell));

        let point = counter.snapshot().unwrap();
        assert_eq!(point.value(), 20);
        cell.inc(5);
        counter.post_report(point.value());
        assert_eq!(cell.value(), 5);
    }

    #[test]
    fn wrapped_counter_ignores_negative_source() {
        let counter = WrappedCounter::new("bytes", Dimensions::new(), Int64::new(-4));
        assert!(counter.snapshot().is_none());
    }

    proptest! {
        #[test]
        fn acknowledgement_preserves_unreported(
            before in prop::collection::vec(0u64..1_000_000, 1..32),
            after in prop::collection::vec(0u64..1_000_000, 0..32),
        ) {
            let counter = Counter::new("requests", Dimensions::new());
            for delta in &before {
                counter.inc(*delta);
            }

            let reported = counter.snapshot().map_or(0, |p| p.value());
            for delta in &after {
                counter.inc(*delta);
            }
            if reported > 0 {
                counter.post_report(reported);
            }

            let total: u64 = before.iter().chain(after.iter()).sum();
            prop_assert_eq!(counter.value(), total - reported as u64);
        }
    }
}
