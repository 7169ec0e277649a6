//! Metric primitives.
//!
//! Every primitive can produce a [`DataPoint`] for the current reporting cycle and is told, after a successful
//! submission, which value was delivered. Counter-like metrics use that acknowledgement to subtract or advance their
//! watermark, so updates that race with a report are never lost or counted twice.

use std::time::SystemTime;

use crate::datapoint::{DataPoint, Dimensions, MetricType};

mod counter;
pub use self::counter::{Counter, WrappedCounter};

mod cumulative;
pub use self::cumulative::{CumulativeCounter, WrappedCumulativeCounter};

mod gauge;
pub use self::gauge::{Gauge, StableGauge, WrappedGauge};

/// A metric that can be tracked by a [`Reporter`](crate::Reporter).
pub trait Metric: Send + Sync {
    /// Returns a datapoint for the current value, or `None` if nothing should be reported this cycle.
    ///
    /// Must be safe to call while the underlying value is being mutated.
    fn snapshot(&self) -> Option<DataPoint>;

    /// Acknowledges that `reported`, the value of the datapoint returned by the last [`snapshot`](Metric::snapshot),
    /// was delivered.
    ///
    /// Called at most once per successful report, and never for a cycle where `snapshot` returned `None`.
    fn post_report(&self, reported: i64);
}

/// Name and dimensions shared by every primitive.
#[derive(Clone, Debug)]
struct Identity {
    metric: String,
    dimensions: Dimensions,
}

impl Identity {
    fn new(metric: String, dimensions: Dimensions) -> Self {
        Self { metric, dimensions }
    }

    fn datapoint(&self, metric_type: MetricType, value: i64) -> DataPoint {
        DataPoint::new(
            self.metric.clone(),
            metric_type,
            value,
            Some(SystemTime::now()),
            self.dimensions.clone(),
        )
    }
}

/// Panics unless `reported` is a valid acknowledgement for a counter-like metric.
fn check_acknowledged(metric: &str, reported: i64) {
    assert!(reported >= 0, "negative value {reported} acknowledged for counter '{metric}'");
}
