use tokio_util::sync::CancellationToken;

use crate::{datapoint::DataPoint, Error};

mod http;
pub use self::http::HttpForwarder;

/// Submits datapoints to a remote endpoint.
///
/// A forwarder makes one best-effort attempt per call and never retries. Implementations must stop promptly once
/// `cancel` fires, abandoning any in-flight I/O and returning [`Error::Cancelled`].
pub trait Forwarder: Send + Sync {
    /// Submits `points`.
    ///
    /// # Errors
    ///
    /// Returns an error if the datapoints could not be delivered. The caller treats any error as "nothing was
    /// reported".
    fn forward(&self, cancel: &CancellationToken, points: &[DataPoint]) -> Result<(), Error>;
}
