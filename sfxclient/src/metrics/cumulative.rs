use std::sync::atomic::{AtomicU64, Ordering};

use super::{check_acknowledged, Identity, Metric};
use crate::{
    datapoint::{DataPoint, Dimensions, MetricType},
    value::Getter,
};

/// Monotone watermark of the highest acknowledged value.
///
/// Acknowledgements only ever raise the watermark; a stale or duplicate acknowledgement is a no-op.
#[derive(Debug, Default)]
struct Watermark(AtomicU64);

impl Watermark {
    fn load(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    fn raise(&self, reported: u64) {
        let _ = self.0.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |previous| {
            (reported > previous).then_some(reported)
        });
    }
}

/// Builds a datapoint for `current` unless it was already acknowledged or does not fit in an `i64`.
fn cumulative_datapoint(id: &Identity, current: u64, watermark: &Watermark) -> Option<DataPoint> {
    if current == watermark.load() {
        return None;
    }
    let value = i64::try_from(current).ok()?;
    Some(id.datapoint(MetricType::CumulativeCounter, value))
}

/// A counter reporting an ever-growing running total.
#[derive(Debug)]
pub struct CumulativeCounter {
    id: Identity,
    current: AtomicU64,
    previous_reported: Watermark,
}

impl CumulativeCounter {
    /// Creates a new `CumulativeCounter` starting at zero.
    pub fn new<N: Into<String>>(metric: N, dimensions: Dimensions) -> Self {
        Self {
            id: Identity::new(metric.into(), dimensions),
            current: AtomicU64::new(0),
            previous_reported: Watermark::default(),
        }
    }

    /// Stores the latest running total.
    pub fn sample(&self, value: u64) {
        self.current.store(value, Ordering::SeqCst);
    }

    /// Adds `delta` to the running total and returns the new total.
    pub fn add(&self, delta: u64) -> u64 {
        self.current.fetch_add(delta, Ordering::SeqCst).wrapping_add(delta)
    }

    /// Returns the latest running total.
    pub fn value(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Returns the highest value acknowledged so far.
    pub fn previous_reported(&self) -> u64 {
        self.previous_reported.load()
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

impl Metric for CumulativeCounter {
    fn snapshot(&self) -> Option<DataPoint> {
        cumulative_datapoint(&self.id, self.value(), &self.previous_reported)
    }

    fn post_report(&self, reported: i64) {
        check_acknowledged(&self.id.metric, reported);
        self.previous_reported.raise(reported as u64);
    }
}

/// A cumulative counter whose running total is read through a [`Getter`].
///
/// Acknowledgements only move the watermark; the external value is never touched.
pub struct WrappedCumulativeCounter<G> {
    id: Identity,
    value: G,
    previous_reported: Watermark,
}

impl<G: Getter> WrappedCumulativeCounter<G> {
    /// Creates a new `WrappedCumulativeCounter` reading from `value`.
    pub fn new<N: Into<String>>(metric: N, dimensions: Dimensions, value: G) -> Self {
        Self { id: Identity::new(metric.into(), dimensions), value, previous_reported: Watermark::default() }
    }

    /// Returns the highest value acknowledged so far.
    pub fn previous_reported(&self) -> u64 {
        self.previous_reported.load()
    }

    /// Returns the getter backing this counter.
    pub fn getter(&self) -> &G {
        &self.value
    }
}

impl<G: Getter> Metric for WrappedCumulativeCounter<G> {
    fn snapshot(&self) -> Option<DataPoint> {
        let value = self.value.get().and_then(|v| v.as_i64()).ok()?;
        let current = u64::try_from(value).ok()?;
        cumulative_datapoint(&self.id, current, &self.previous_reported)
    }

    fn post_report(&self, reported: i64) {
        check_acknowledged(&self.id.metric, reported);
        self.previous_reported.raise(reported as u64);
    }
}
