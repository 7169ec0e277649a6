use std::io;

use thiserror::Error;

/// Errors that could occur while building the forwarder or spawning background workers.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Failed to create the runtime that drives outbound requests.
    #[error("failed to create forwarder runtime: {0}")]
    Runtime(#[source] io::Error),

    /// Failed to load the platform's root certificates.
    #[error("failed to load native root certificates: {0}")]
    NativeRoots(#[source] io::Error),

    /// Failed to build the TLS client configuration.
    #[error("failed to build TLS configuration: {0}")]
    Tls(#[from] rustls::Error),

    /// The ingest URL could not be parsed.
    #[error("invalid ingest URL '{url}'")]
    InvalidUrl {
        /// The URL as configured.
        url: String,
    },

    /// A configured value cannot be sent as an HTTP header.
    #[error("invalid value for header '{name}'")]
    InvalidHeader {
        /// Name of the offending header.
        name: &'static str,
    },

    /// Failed to spawn a background thread.
    #[error("failed to spawn background thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Errors surfaced by metric values, reporting, and background scheduling.
#[derive(Debug, Error)]
pub enum Error {
    /// A value could not be coerced to the requested kind.
    #[error("illegal value type: {0}")]
    IllegalType(&'static str),

    /// A metric or bucket was created without a name.
    #[error("metric name must not be empty")]
    NoMetricName,

    /// The datapoints could not be encoded.
    #[error("failed to marshal datapoints: {0}")]
    Marshal(#[from] prost::EncodeError),

    /// The request could not be built or sent.
    #[error("failed to post datapoints: {0}")]
    Post(String),

    /// The response body could not be read.
    #[error("failed to read response: {0}")]
    Response(String),

    /// The endpoint answered with a non-200 status.
    #[error("unexpected status {code}: {body}")]
    Status {
        /// HTTP status code.
        code: u16,
        /// Response body, lossily decoded.
        body: String,
    },

    /// The endpoint answered 200 but the body was not `"OK"`.
    #[error("invalid response body: {body}")]
    InvalidBody {
        /// Response body, lossily decoded.
        body: String,
    },

    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// The background job has been stopped, or was never running.
    #[error("background job not started")]
    BackgroundJobNotStarted,

    /// The background reporter has not been started.
    #[error("background reporter not started")]
    BackgroundReporterNotStarted,

    /// Building a component failed.
    #[error(transparent)]
    Build(#[from] BuildError),
}

impl Error {
    /// Returns `true` if this error represents a cancellation rather than a failure.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
