use std::{collections::BTreeMap, time::SystemTime};

/// Dimensions attached to a metric.
///
/// Keys are unique and ordering carries no meaning; a sorted map keeps serialization deterministic.
pub type Dimensions = BTreeMap<String, String>;

/// Metric type of a datapoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricType {
    /// An instantaneous value, reported every cycle.
    Gauge,

    /// A non-negative delta since the last successful report.
    Counter,

    /// A monotonically non-decreasing running total; the server computes deltas.
    CumulativeCounter,
}

/// A point-in-time value for a single metric.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataPoint {
    metric: String,
    metric_type: MetricType,
    value: i64,
    timestamp: Option<SystemTime>,
    dimensions: Dimensions,
}

impl DataPoint {
    /// Creates a new `DataPoint`.
    ///
    /// A `timestamp` of `None` is filled in with the current time when the datapoint is encoded for submission.
    pub fn new<N>(
        metric: N,
        metric_type: MetricType,
        value: i64,
        timestamp: Option<SystemTime>,
        dimensions: Dimensions,
    ) -> Self
    where
        N: Into<String>,
    {
        Self { metric: metric.into(), metric_type, value, timestamp, dimensions }
    }

    /// Creates a gauge datapoint stamped with the current time.
    pub fn gauge<N: Into<String>>(metric: N, dimensions: Dimensions, value: i64) -> Self {
        Self::new(metric, MetricType::Gauge, value, Some(SystemTime::now()), dimensions)
    }

    /// Creates a counter datapoint stamped with the current time.
    pub fn counter<N: Into<String>>(metric: N, dimensions: Dimensions, value: i64) -> Self {
        Self::new(metric, MetricType::Counter, value, Some(SystemTime::now()), dimensions)
    }

    /// Creates a cumulative counter datapoint stamped with the current time.
    pub fn cumulative<N: Into<String>>(metric: N, dimensions: Dimensions, value: i64) -> Self {
        Self::new(metric, MetricType::CumulativeCounter, value, Some(SystemTime::now()), dimensions)
    }

    /// Returns the metric name.
    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// Returns the metric type.
    pub const fn metric_type(&self) -> MetricType {
        self.metric_type
    }

    /// Returns the value.
    pub const fn value(&self) -> i64 {
        self.value
    }

    /// Returns the timestamp, if one was set.
    pub const fn timestamp(&self) -> Option<SystemTime> {
        self.timestamp
    }

    /// Returns the dimensions.
    pub fn dimensions(&self) -> &Dimensions {
        &self.dimensions
    }

    /// Merges `defaults` underneath this datapoint's own dimensions. Keys already present on the datapoint win.
    pub(crate) fn with_default_dimensions(mut self, defaults: &Dimensions) -> Self {
        if !defaults.is_empty() {
            let mut merged = defaults.clone();
            merged.append(&mut self.dimensions);
            self.dimensions = merged;
        }
        self
    }

    /// Drops empty dimensions and normalizes the remaining keys.
    pub(crate) fn sanitized(mut self) -> Self {
        self.dimensions = sanitize_dimensions(&self.dimensions);
        self
    }
}

/// Merges `layers` left to right; later layers win on key collisions.
pub(crate) fn merge_dimensions<'a, I>(layers: I) -> Dimensions
where
    I: IntoIterator<Item = &'a Dimensions>,
{
    let mut merged = Dimensions::new();
    for layer in layers {
        merged.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

/// Normalizes a dimension key: every character outside `[A-Za-z0-9_]` becomes `_`.
pub fn normalize_key(key: &str) -> String {
    key.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect()
}

/// Returns a copy of `dimensions` without empty keys or values, with every key normalized.
///
/// When two keys normalize to the same string, the one that sorts last in the input wins.
pub fn sanitize_dimensions(dimensions: &Dimensions) -> Dimensions {
    dimensions
        .iter()
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .map(|(k, v)| (normalize_key(k), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{
        merge_dimensions, normalize_key, sanitize_dimensions, DataPoint, Dimensions, MetricType,
    };

    fn dims(pairs: &[(&str, &str)]) -> Dimensions {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn plain_keys_are_untouched() {
        for key in ["host", "cluster_1", "AZ", "_leading"] {
            assert_eq!(normalize_key(key), key);
        }
    }

    #[test]
    fn exotic_characters_collapse() {
        assert_eq!(normalize_key("a.b-c d"), "a_b_c_d");
        assert_eq!(normalize_key("κey/π"), "_ey__");
        assert_eq!(normalize_key("http://x"), "http___x");
    }

    #[test]
    fn sanitize_drops_empty_entries() {
        let input = dims(&[("", "v"), ("k", ""), ("ok.key", "value")]);
        assert_eq!(sanitize_dimensions(&input), dims(&[("ok_key", "value")]));
    }

    #[test]
    fn default_dimensions_lose_to_local() {
        let point = DataPoint::new(
            "requests",
            MetricType::Counter,
            1,
            None,
            dims(&[("host", "local"), ("route", "/")]),
        );
        let merged = point.with_default_dimensions(&dims(&[("host", "default"), ("env", "prod")]));
        assert_eq!(
            merged.dimensions(),
            &dims(&[("env", "prod"), ("host", "local"), ("route", "/")])
        );
    }

    #[test]
    fn merge_is_right_biased() {
        let merged =
            merge_dimensions([&dims(&[("a", "1"), ("b", "1")]), &dims(&[("b", "2")]), &dims(&[("c", "3")])]);
        assert_eq!(merged, dims(&[("a", "1"), ("b", "2"), ("c", "3")]));
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(key in ".*") {
            let once = normalize_key(&key);
            prop_assert_eq!(normalize_key(&once), once);
        }

        #[test]
        fn sanitize_is_idempotent(input in prop::collection::btree_map(".{0,6}", ".{0,3}", 0..8)) {
            let once = sanitize_dimensions(&input);
            prop_assert_eq!(sanitize_dimensions(&once), once);
        }
    }
}
