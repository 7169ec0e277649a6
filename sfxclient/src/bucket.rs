use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};

use crate::datapoint::{merge_dimensions, DataPoint, Dimensions, MetricType};

/// Dimension key carrying the rollup name of each bucket datapoint.
pub const ROLLUP_DIMENSION: &str = "rollup";

/// Rollup name of the observation count.
pub const ROLLUP_COUNT: &str = "count";

/// Rollup name of the observation sum.
pub const ROLLUP_SUM: &str = "sum";

/// Rollup name of the sum of squared observations.
pub const ROLLUP_SUM_SQUARE: &str = "sumsquare";

/// Rollup name of the smallest observation since the last snapshot.
pub const ROLLUP_MIN: &str = "min";

/// Rollup name of the largest observation since the last snapshot.
pub const ROLLUP_MAX: &str = "max";

/// Aggregate values of a [`Bucket`].
///
/// `min` and `max` only carry meaning while `count > 0`. Until the first observation, and again after every
/// snapshot, they sit at `i64::MAX` and `i64::MIN`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BucketValues {
    /// Number of observations.
    pub count: i64,

    /// Sum of observations.
    pub sum: i64,

    /// Sum of squared observations.
    pub sum_of_squares: i64,

    /// Smallest observation.
    pub min: i64,

    /// Largest observation.
    pub max: i64,
}

impl BucketValues {
    /// Returns the aggregate of a single observation.
    pub const fn single(value: i64) -> Self {
        Self {
            count: 1,
            sum: value,
            sum_of_squares: value.wrapping_mul(value),
            min: value,
            max: value,
        }
    }

    fn merge(&mut self, other: &BucketValues) {
        if other.count == 0 {
            return;
        }

        self.count += other.count;
        self.sum = self.sum.wrapping_add(other.sum);
        self.sum_of_squares = self.sum_of_squares.wrapping_add(other.sum_of_squares);
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Returns `true` if min and max hold observations rather than their reset sentinels.
    const fn has_extremes(&self) -> bool {
        self.count > 0 && self.min <= self.max
    }

    fn reset_extremes(&mut self) {
        self.min = i64::MAX;
        self.max = i64::MIN;
    }
}

impl Default for BucketValues {
    fn default() -> Self {
        Self { count: 0, sum: 0, sum_of_squares: 0, min: i64::MAX, max: i64::MIN }
    }
}

/// Running count, sum, sum of squares, min and max over a stream of observations.
///
/// Each report emits up to five datapoints, one per rollup. Count, sum and sum of squares keep accumulating for the
/// life of the bucket; min and max cover only the observations since the previous snapshot.
#[derive(Debug)]
pub struct Bucket {
    metric: String,
    dimensions: RwLock<Dimensions>,
    values: Mutex<BucketValues>,
}

impl Bucket {
    /// Creates a new, empty `Bucket`.
    pub fn new<N: Into<String>>(metric: N, dimensions: Dimensions) -> Self {
        Self {
            metric: metric.into(),
            dimensions: RwLock::new(dimensions),
            values: Mutex::new(BucketValues::default()),
        }
    }

    /// Returns the metric name.
    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// Returns a copy of the bucket's dimensions.
    pub fn dimensions(&self) -> Dimensions {
        self.dimensions.read().clone()
    }

    /// Replaces the bucket's dimensions.
    pub fn set_dimensions(&self, dimensions: Dimensions) {
        *self.dimensions.write() = dimensions;
    }

    /// Records a single observation.
    pub fn add(&self, value: i64) {
        self.values.lock().merge(&BucketValues::single(value));
    }

    /// Records a batch of observations that were aggregated elsewhere.
    pub fn multi_add(&self, values: &BucketValues) {
        self.values.lock().merge(values);
    }

    /// Returns the current aggregate values.
    pub fn values(&self) -> BucketValues {
        *self.values.lock()
    }

    /// Returns the datapoints for the current aggregate values, resetting min and max.
    ///
    /// Every datapoint carries `defaults`, then the bucket's own dimensions, then the `rollup` dimension, with later
    /// layers winning. Min and max are only emitted when a value was observed since the previous snapshot, and are
    /// named `<metric>.min` and `<metric>.max`.
    pub fn snapshot(&self, defaults: &Dimensions) -> Vec<DataPoint> {
        let values = {
            let mut values = self.values.lock();
            let current = *values;
            values.reset_extremes();
            current
        };

        let base = merge_dimensions([defaults, &*self.dimensions.read()]);
        let timestamp = Some(SystemTime::now());
        let point = |metric: String, metric_type: MetricType, rollup: &str, value: i64| {
            let mut dimensions = base.clone();
            dimensions.insert(ROLLUP_DIMENSION.to_string(), rollup.to_string());
            DataPoint::new(metric, metric_type, value, timestamp, dimensions)
        };

        let mut points = vec![
            point(self.metric.clone(), MetricType::CumulativeCounter, ROLLUP_COUNT, values.count),
            point(self.metric.clone(), MetricType::CumulativeCounter, ROLLUP_SUM, values.sum),
            point(
                self.metric.clone(),
                MetricType::CumulativeCounter,
                ROLLUP_SUM_SQUARE,
                values.sum_of_squares,
            ),
        ];

        if values.has_extremes() {
            points.push(point(format!("{}.min", self.metric), MetricType::Gauge, ROLLUP_MIN, values.min));
            points.push(point(format!("{}.max", self.metric), MetricType::Gauge, ROLLUP_MAX, values.max));
        }

        points
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{Bucket, BucketValues};
    use crate::datapoint::{Dimensions, MetricType};

    fn dims(pairs: &[(&str, &str)]) -> Dimensions {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn empty_bucket_emits_three_points() {
        let bucket = Bucket::new("latency", Dimensions::new());
        let points = bucket.snapshot(&Dimensions::new());
        assert_eq!(points.len(), 3);
        assert!(points.iter().all(|p| p.value() == 0 && p.metric() == "latency"));
    }

    #[test]
    fn rollups_and_reset() {
        let bucket = Bucket::new("latency", dims(&[("c", "c")]));
        bucket.add(1);
        bucket.add(2);
        bucket.add(3);

        let points = bucket.snapshot(&dims(&[("a", "b")]));
        let summary = points
            .iter()
            .map(|p| (p.metric(), p.metric_type(), p.dimensions()["rollup"].as_str(), p.value()))
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![
                ("latency", MetricType::CumulativeCounter, "count", 3),
                ("latency", MetricType::CumulativeCounter, "sum", 6),
                ("latency", MetricType::CumulativeCounter, "sumsquare", 14),
                ("latency.min", MetricType::Gauge, "min", 1),
                ("latency.max", MetricType::Gauge, "max", 3),
            ]
        );
        for point in &points {
            assert_eq!(point.dimensions()["a"], "b");
            assert_eq!(point.dimensions()["c"], "c");
        }

        let values = bucket.values();
        assert_eq!((values.count, values.sum, values.sum_of_squares), (3, 6, 14));
        assert_eq!((values.min, values.max), (i64::MAX, i64::MIN));

        // Min and max are gone, but the running totals survive.
        let points = bucket.snapshot(&dims(&[("a", "b")]));
        assert_eq!(points.iter().map(|p| p.value()).collect::<Vec<_>>(), vec![3, 6, 14]);
    }

    #[test]
    fn extremes_restart_after_snapshot() {
        let bucket = Bucket::new("latency", Dimensions::new());
        bucket.add(10);
        bucket.add(-4);
        let _ = bucket.snapshot(&Dimensions::new());

        bucket.add(5);
        let points = bucket.snapshot(&Dimensions::new());
        assert_eq!(points[3].value(), 5);
        assert_eq!(points[4].value(), 5);
    }

    #[test]
    fn bucket_dimensions_override_defaults_and_rollup_wins() {
        let bucket = Bucket::new("latency", dims(&[("host", "a"), ("rollup", "mine")]));
        let points = bucket.snapshot(&dims(&[("host", "default")]));
        assert_eq!(points[0].dimensions()["host"], "a");
        assert_eq!(points[0].dimensions()["rollup"], "count");

        bucket.set_dimensions(dims(&[("host", "b")]));
        assert_eq!(bucket.dimensions(), dims(&[("host", "b")]));
    }

    #[test]
    fn multi_add_merges_batches() {
        let bucket = Bucket::new("latency", Dimensions::new());
        bucket.add(7);
        bucket.multi_add(&BucketValues { count: 2, sum: 3, sum_of_squares: 5, min: 1, max: 2 });
        bucket.multi_add(&BucketValues::default());

        let values = bucket.values();
        assert_eq!(values, BucketValues { count: 3, sum: 10, sum_of_squares: 54, min: 1, max: 7 });
    }

    proptest! {
        #[test]
        fn cauchy_schwarz_holds(observations in prop::collection::vec(-100_000i64..100_000, 0..256)) {
            let bucket = Bucket::new("latency", Dimensions::new());
            for v in &observations {
                bucket.add(*v);
            }

            let values = bucket.values();
            let sum = i128::from(values.sum);
            prop_assert!(sum * sum <= i128::from(values.count) * i128::from(values.sum_of_squares));
        }

        #[test]
        fn snapshot_preserves_totals(observations in prop::collection::vec(-1_000i64..1_000, 1..64)) {
            let bucket = Bucket::new("latency", Dimensions::new());
            for v in &observations {
                bucket.add(*v);
            }

            let before = bucket.values();
            let points = bucket.snapshot(&Dimensions::new());
            let after = bucket.values();

            prop_assert_eq!(points.len(), 5);
            prop_assert_eq!(points[3].value(), *observations.iter().min().unwrap());
            prop_assert_eq!(points[4].value(), *observations.iter().max().unwrap());
            prop_assert_eq!(
                (before.count, before.sum, before.sum_of_squares),
                (after.count, after.sum, after.sum_of_squares)
            );
            prop_assert_eq!((after.min, after.max), (i64::MAX, i64::MIN));
        }
    }
}
