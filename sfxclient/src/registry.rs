use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    bucket::Bucket,
    config::Config,
    datapoint::{DataPoint, Dimensions},
    forwarder::{Forwarder, HttpForwarder},
    metrics::Metric,
    telemetry::{Telemetry, TelemetrySnapshot, TelemetryUpdate},
    BuildError, Error,
};

type PreReportCallback = Box<dyn Fn() + Send + Sync>;
type DataPointCallback = Box<dyn Fn(&Dimensions) -> Vec<DataPoint> + Send + Sync>;

/// Identity of a shared value: the address it points to.
fn identity<T: ?Sized>(value: &Arc<T>) -> usize {
    Arc::as_ptr(value).cast::<()>() as usize
}

#[derive(Default)]
struct Inner {
    default_dimensions: Dimensions,
    metrics: IndexMap<usize, Arc<dyn Metric>>,
    buckets: IndexMap<usize, Arc<Bucket>>,
    pre_report: Vec<PreReportCallback>,
    callbacks: Vec<DataPointCallback>,
}

/// Tracks metrics and reports them to a [`Forwarder`].
///
/// A single lock guards the tracked set for the whole of a report cycle, so at most one cycle is in flight per
/// reporter, and tracking changes made during a cycle wait for it to finish. Callbacks run while that lock is held and
/// must not call back into the reporter.
pub struct Reporter {
    forwarder: Arc<dyn Forwarder>,
    inner: Mutex<Inner>,
    telemetry: Telemetry,
}

impl Reporter {
    /// Creates a new `Reporter` posting to the endpoint described by `config`.
    ///
    /// # Errors
    ///
    /// If the HTTP forwarder cannot be built from `config`, an error will be returned.
    pub fn new(config: &Config, default_dimensions: Dimensions) -> Result<Self, BuildError> {
        let forwarder = HttpForwarder::new(config)?;
        Ok(Self::with_forwarder(Arc::new(forwarder), default_dimensions))
    }

    /// Creates a new `Reporter` submitting through `forwarder`.
    pub fn with_forwarder(forwarder: Arc<dyn Forwarder>, default_dimensions: Dimensions) -> Self {
        Self {
            forwarder,
            inner: Mutex::new(Inner { default_dimensions, ..Default::default() }),
            telemetry: Telemetry::default(),
        }
    }

    /// Returns a copy of the default dimensions.
    pub fn default_dimensions(&self) -> Dimensions {
        self.inner.lock().default_dimensions.clone()
    }

    /// Replaces the default dimensions applied to every reported datapoint.
    pub fn set_default_dimensions(&self, dimensions: Dimensions) {
        self.inner.lock().default_dimensions = dimensions;
    }

    /// Starts tracking `metric`. Tracking the same metric twice has no effect.
    pub fn track(&self, metric: Arc<dyn Metric>) {
        self.inner.lock().metrics.entry(identity(&metric)).or_insert(metric);
    }

    /// Starts tracking every metric in `metrics`.
    pub fn track_all<I>(&self, metrics: I)
    where
        I: IntoIterator<Item = Arc<dyn Metric>>,
    {
        let mut inner = self.inner.lock();
        for metric in metrics {
            inner.metrics.entry(identity(&metric)).or_insert(metric);
        }
    }

    /// Stops tracking `metric`, returning `true` if it was tracked. The metric itself is left untouched.
    pub fn untrack<M: Metric + ?Sized>(&self, metric: &Arc<M>) -> bool {
        self.inner.lock().metrics.shift_remove(&identity(metric)).is_some()
    }

    /// Stops tracking every metric in `metrics`, returning how many were tracked.
    pub fn untrack_all<'a, I, M>(&self, metrics: I) -> usize
    where
        I: IntoIterator<Item = &'a Arc<M>>,
        M: Metric + ?Sized + 'a,
    {
        let mut inner = self.inner.lock();
        metrics.into_iter().filter(|metric| inner.metrics.shift_remove(&identity(*metric)).is_some()).count()
    }

    /// Returns the number of tracked metrics.
    pub fn tracked(&self) -> usize {
        self.inner.lock().metrics.len()
    }

    /// Creates a bucket owned by this reporter.
    ///
    /// The bucket is reported every cycle until it is passed to [`remove_bucket`](Reporter::remove_bucket).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMetricName`] if `metric` is empty.
    pub fn new_bucket<N: Into<String>>(&self, metric: N, dimensions: Dimensions) -> Result<Arc<Bucket>, Error> {
        let metric = metric.into();
        if metric.is_empty() {
            return Err(Error::NoMetricName);
        }

        let bucket = Arc::new(Bucket::new(metric, dimensions));
        self.inner.lock().buckets.insert(identity(&bucket), Arc::clone(&bucket));
        Ok(bucket)
    }

    /// Stops reporting `bucket`, returning `true` if it belonged to this reporter.
    pub fn remove_bucket(&self, bucket: &Arc<Bucket>) -> bool {
        self.inner.lock().buckets.shift_remove(&identity(bucket)).is_some()
    }

    /// Registers a callback run at the start of every report cycle, before any metric is read.
    pub fn add_pre_report_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.lock().pre_report.push(Box::new(callback));
    }

    /// Registers a callback producing extra datapoints on every report cycle.
    ///
    /// The callback receives the default dimensions and is expected to apply them itself.
    pub fn add_datapoint_callback<F>(&self, callback: F)
    where
        F: Fn(&Dimensions) -> Vec<DataPoint> + Send + Sync + 'static,
    {
        self.inner.lock().callbacks.push(Box::new(callback));
    }

    /// Returns the reporter's own telemetry counters.
    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    /// Runs one report cycle and returns the datapoints that were submitted.
    ///
    /// Metrics are only acknowledged once the forwarder reports success; a failed or cancelled submission leaves every
    /// counter as it was, so the next cycle picks the values up again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] without running any callback if `cancel` has already fired, or the forwarder's
    /// error if the submission failed.
    pub fn report(&self, cancel: &CancellationToken) -> Result<Vec<DataPoint>, Error> {
        let mut update = TelemetryUpdate::default();
        let result = if cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            let inner = self.inner.lock();
            self.report_locked(&inner, cancel, &mut update)
        };

        if matches!(result, Err(Error::Cancelled)) {
            update.track_cancelled();
        }
        self.telemetry.apply_update(&update);
        result
    }

    fn report_locked(
        &self,
        inner: &Inner,
        cancel: &CancellationToken,
        update: &mut TelemetryUpdate,
    ) -> Result<Vec<DataPoint>, Error> {
        for callback in &inner.pre_report {
            callback();
        }

        let mut pending = Vec::new();
        for metric in inner.metrics.values() {
            if let Some(point) = metric.snapshot() {
                pending.push((point.with_default_dimensions(&inner.default_dimensions), Some(metric)));
            }
        }
        for callback in &inner.callbacks {
            pending.extend(callback(&inner.default_dimensions).into_iter().map(|point| (point, None)));
        }
        for bucket in inner.buckets.values() {
            pending.extend(bucket.snapshot(&inner.default_dimensions).into_iter().map(|point| (point, None)));
        }

        let mut points = Vec::with_capacity(pending.len());
        let mut acknowledgements = Vec::new();
        for (point, metric) in pending {
            if point.metric().is_empty() {
                update.track_point_dropped();
                continue;
            }
            if let Some(metric) = metric {
                acknowledgements.push((metric, point.value()));
            }
            points.push(point.sanitized());
        }

        if points.is_empty() {
            debug!("No datapoints to report.");
            return Ok(points);
        }

        if let Err(e) = self.forwarder.forward(cancel, &points) {
            if !e.is_cancelled() {
                update.track_failed();
            }
            return Err(e);
        }

        for (metric, reported) in acknowledgements {
            metric.post_report(reported);
        }
        update.track_succeeded(points.len());
        debug!(points = points.len(), "Reported datapoints.");

        Ok(points)
    }
}
