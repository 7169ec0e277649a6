//! An in-process client for reporting application metrics to a [SignalFx][sfx]-compatible ingest endpoint.
//!
//! [sfx]: https://docs.splunk.com/observability/en/
//!
//! # Usage
//!
//! Metrics are plain values owned by the application. A [`Reporter`] tracks them and, on every report cycle, reads
//! each one, posts the resulting datapoints, and acknowledges what was delivered:
//!
//! ```no_run
//! # use std::{sync::Arc, time::Duration};
//! # use sfxclient::{BackgroundReporter, Config, Counter, Dimensions, Gauge};
//! let config = Config::new().with_auth_token("my-token");
//! let mut dimensions = Dimensions::new();
//! dimensions.insert("service".to_string(), "checkout".to_string());
//!
//! let background = BackgroundReporter::new(&config, dimensions, Duration::from_secs(10))
//!     .expect("failed to build reporter");
//!
//! let requests = Arc::new(Counter::new("requests", Dimensions::new()));
//! let queue_depth = Arc::new(Gauge::new("queue.depth", Dimensions::new()));
//! background.reporter().track(requests.clone());
//! background.reporter().track(queue_depth.clone());
//!
//! background.start().expect("failed to start background reporter");
//!
//! requests.inc(1);
//! queue_depth.record(12);
//! ```
//!
//! # Metrics
//!
//! ## Gauges
//!
//! [`Gauge`] reports its current value every cycle. [`StableGauge`] only reports when the value differs from the last
//! one delivered. [`WrappedGauge`] reads its value from a [`Getter`] owned elsewhere.
//!
//! ## Counters
//!
//! [`Counter`] reports the amount accumulated since the last successful report. Delivered amounts are subtracted
//! rather than zeroed, so increments that race with a report carry over to the next cycle instead of being lost.
//!
//! [`CumulativeCounter`] reports an ever-growing total, but only when it has moved past the highest total delivered so
//! far.
//!
//! ## Buckets
//!
//! A [`Bucket`] summarizes a stream of values as count, sum and sum of squares, plus the minimum and maximum seen since
//! the previous report.
//!
//! # Background reporting
//!
//! [`Background`] runs any action on a fixed interval on a dedicated thread, and can be paused, resumed, triggered on
//! demand, and stopped. [`BackgroundReporter`] drives a [`Reporter`] with it.
//!
//! # Cancellation
//!
//! Report cycles take a [`CancellationToken`](tokio_util::sync::CancellationToken). Cancelling it aborts a submission
//! in flight; nothing is acknowledged, so the values are reported again on the next cycle.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

pub mod atomics;

mod background;
pub use self::background::{Background, BackgroundReporter};

mod bucket;
pub use self::bucket::{
    Bucket, BucketValues, ROLLUP_COUNT, ROLLUP_DIMENSION, ROLLUP_MAX, ROLLUP_MIN, ROLLUP_SUM, ROLLUP_SUM_SQUARE,
};

mod config;
pub use self::config::{Config, AUTH_TOKEN_ENV, DEFAULT_URL};

mod datapoint;
pub use self::datapoint::{normalize_key, sanitize_dimensions, DataPoint, Dimensions, MetricType};

mod error;
pub use self::error::{BuildError, Error};

mod forwarder;
pub use self::forwarder::{Forwarder, HttpForwarder};

mod metrics;
pub use self::metrics::{
    Counter, CumulativeCounter, Gauge, Metric, StableGauge, WrappedCounter, WrappedCumulativeCounter, WrappedGauge,
};

pub mod proto;

mod registry;
pub use self::registry::Reporter;

mod telemetry;
pub use self::telemetry::TelemetrySnapshot;

mod value;
pub use self::value::{FunctionGetter, Getter, Subtractor, Value, ValueWrapper};
