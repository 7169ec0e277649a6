use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use super::{Identity, Metric};
use crate::{
    datapoint::{DataPoint, Dimensions, MetricType},
    value::Getter,
};

/// A gauge holding a single signed value.
///
/// Reported unconditionally on every cycle.
#[derive(Debug)]
pub struct Gauge {
    id: Identity,
    value: AtomicI64,
}

impl Gauge {
    /// Creates a new `Gauge` starting at zero.
    pub fn new<N: Into<String>>(metric: N, dimensions: Dimensions) -> Self {
        Self { id: Identity::new(metric.into(), dimensions), value: AtomicI64::new(0) }
    }

    /// Records a new value.
    pub fn record(&self, value: i64) {
        self.value.store(value, Ordering::SeqCst);
    }

    /// Returns the current value.
    pub fn value(&self) -> i64 {
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

impl Metric for Gauge {
    fn snapshot(&self) -> Option<DataPoint> {
        Some(self.id.datapoint(MetricType::Gauge, self.value()))
    }

    fn post_report(&self, _: i64) {}
}

/// A gauge that is only reported when its value changes.
///
/// The first snapshot always reports, whatever the value.
#[derive(Debug)]
pub struct StableGauge {
    gauge: Gauge,
    last_reported: AtomicI64,
    has_reported: AtomicBool,
}

impl StableGauge {
    /// Creates a new `StableGauge` starting at zero.
    pub fn new<N: Into<String>>(metric: N, dimensions: Dimensions) -> Self {
        Self {
            gauge: Gauge::new(metric, dimensions),
            last_reported: AtomicI64::new(0),
            has_reported: AtomicBool::new(false),
        }
    }

    /// Records a new value.
    pub fn record(&self, value: i64) {
        self.gauge.record(value);
    }

    /// Returns the current value.
    pub fn value(&self) -> i64 {
        self.gauge.value()
    }

    /// Returns the underlying gauge.
    pub fn gauge(&self) -> &Gauge {
        &self.gauge
    }
}

impl Metric for StableGauge {
    fn snapshot(&self) -> Option<DataPoint> {
        let point = self.gauge.snapshot()?;
        if self.has_reported.load(Ordering::SeqCst)
            && point.value() == self.last_reported.load(Ordering::SeqCst)
        {
            return None;
        }
        Some(point)
    }

    fn post_report(&self, reported: i64) {
        self.last_reported.store(reported, Ordering::SeqCst);
        self.has_reported.store(true, Ordering::SeqCst);
    }
}

/// A gauge whose value is read through a [`Getter`].
pub struct WrappedGauge<G> {
    id: Identity,
    value: G,
}

impl<G: Getter> WrappedGauge<G> {
    /// Creates a new `WrappedGauge` reading from `value`.
    pub fn new<N: Into<String>>(metric: N, dimensions: Dimensions, value: G) -> Self {
        Self { id: Identity::new(metric.into(), dimensions), value }
    }

    /// Returns the getter backing this gauge.
    pub fn getter(&self) -> &G {
        &self.value
    }
}

impl<G: Getter> Metric for WrappedGauge<G> {
    fn snapshot(&self) -> Option<DataPoint> {
        let value = self.value.get().and_then(|v| v.as_i64()).ok()?;
        Some(self.id.datapoint(MetricType::Gauge, value))
    }

    fn post_report(&self, _: i64) {}
}
