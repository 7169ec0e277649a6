//! Wire encoding of datapoint uploads.
//!
//! Uploads are protobuf messages following this schema:
//!
//! ```protobuf
//! message Datum {
//!   optional string strValue = 1;
//!   optional double doubleValue = 2;
//!   optional int64 intValue = 3;
//! }
//!
//! message Dimension {
//!   optional string key = 1;
//!   optional string value = 2;
//! }
//!
//! enum MetricType {
//!   GAUGE = 0;
//!   COUNTER = 1;
//!   ENUM = 2;
//!   CUMULATIVE_COUNTER = 3;
//! }
//!
//! message DataPoint {
//!   optional string source = 1;
//!   optional string metric = 2;
//!   optional int64 timestamp = 3;
//!   optional Datum value = 4;
//!   optional MetricType metricType = 5;
//!   repeated Dimension dimensions = 6;
//! }
//!
//! message DataPointUploadMessage {
//!   repeated DataPoint datapoints = 1;
//! }
//! ```
use std::time::{SystemTime, UNIX_EPOCH};

use prost::Message as _;

use crate::{
    datapoint::{self, sanitize_dimensions},
    Error,
};

/// Content type of an encoded upload.
pub const CONTENT_TYPE: &str = "application/x-protobuf";

/// A datapoint value. Only one field is set.
#[derive(prost::Message, Clone, PartialEq)]
pub struct Datum {
    #[prost(string, optional, tag = "1")]
    /// String value.
    pub str_value: Option<String>,
    #[prost(double, optional, tag = "2")]
    /// Floating-point value.
    pub double_value: Option<f64>,
    #[prost(int64, optional, tag = "3")]
    /// Integer value.
    pub int_value: Option<i64>,
}

/// A single dimension.
#[derive(prost::Message, Clone, PartialEq)]
pub struct Dimension {
    #[prost(string, optional, tag = "1")]
    /// Dimension key.
    pub key: Option<String>,
    #[prost(string, optional, tag = "2")]
    /// Dimension value.
    pub value: Option<String>,
}

/// Wire metric type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MetricType {
    /// Instantaneous value.
    Gauge = 0,
    /// Delta since the previous report.
    Counter = 1,
    /// Enumerated value. Never produced by this crate.
    Enum = 2,
    /// Monotonic running total.
    CumulativeCounter = 3,
}

impl From<datapoint::MetricType> for MetricType {
    fn from(metric_type: datapoint::MetricType) -> Self {
        match metric_type {
            datapoint::MetricType::Gauge => MetricType::Gauge,
            datapoint::MetricType::Counter => MetricType::Counter,
            datapoint::MetricType::CumulativeCounter => MetricType::CumulativeCounter,
        }
    }
}

/// A single datapoint on the wire.
#[derive(prost::Message, Clone, PartialEq)]
pub struct DataPoint {
    #[prost(string, optional, tag = "1")]
    /// Source of the datapoint. Left unset.
    pub source: Option<String>,
    #[prost(string, optional, tag = "2")]
    /// Metric name.
    pub metric: Option<String>,
    #[prost(int64, optional, tag = "3")]
    /// Milliseconds since the Unix epoch.
    pub timestamp: Option<i64>,
    #[prost(message, optional, tag = "4")]
    /// Datapoint value.
    pub value: Option<Datum>,
    #[prost(enumeration = "MetricType", optional, tag = "5")]
    /// Wire metric type.
    pub metric_type: Option<i32>,
    #[prost(message, repeated, tag = "6")]
    /// Dimensions, with empty entries removed and keys normalized.
    pub dimensions: Vec<Dimension>,
}

/// Body of an upload request.
#[derive(prost::Message, Clone, PartialEq)]
pub struct DataPointUploadMessage {
    #[prost(message, repeated, tag = "1")]
    /// Datapoints to ingest.
    pub datapoints: Vec<DataPoint>,
}

impl DataPointUploadMessage {
    /// Builds an upload message from `points`.
    ///
    /// Dimensions are sanitized on the way out and missing timestamps are filled in with `now`.
    pub fn from_datapoints(points: &[datapoint::DataPoint], now: SystemTime) -> Self {
        let datapoints = points
            .iter()
            .map(|point| DataPoint {
                source: None,
                metric: Some(point.metric().to_string()),
                timestamp: Some(unix_millis(point.timestamp().unwrap_or(now))),
                value: Some(Datum { int_value: Some(point.value()), ..Default::default() }),
                metric_type: Some(MetricType::from(point.metric_type()) as i32),
                dimensions: sanitize_dimensions(point.dimensions())
                    .into_iter()
                    .map(|(key, value)| Dimension { key: Some(key), value: Some(value) })
                    .collect(),
            })
            .collect();

        Self { datapoints }
    }

    /// Encodes this message as a protobuf payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Marshal`] if the message cannot be encoded.
    pub fn encode_proto(&self) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode(&mut buf)?;
        Ok(buf)
    }
}

/// Encodes `points` as an upload payload.
///
/// # Errors
///
/// Returns [`Error::Marshal`] if the payload cannot be encoded.
pub fn encode(points: &[datapoint::DataPoint]) -> Result<Vec<u8>, Error> {
    DataPointUploadMessage::from_datapoints(points, SystemTime::now()).encode_proto()
}

fn unix_millis(timestamp: SystemTime) -> i64 {
    match timestamp.duration_since(UNIX_EPOCH) {
        Ok(since) => i64::try_from(since.as_millis()).unwrap_or(i64::MAX),
        Err(before) => -i64::try_from(before.duration().as_millis()).unwrap_or(i64::MAX),
    }
}
