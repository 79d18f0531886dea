//! Delivery of batches to the telemetry sink
mod cloudwatch;

pub use cloudwatch::{CloudWatchPublisher, MAX_DATUMS_PER_REQUEST};

use crate::error::Result;
use crate::metric::Batch;

/// A sink for metric batches
///
/// Only the dispatcher calls a publisher, one batch at a time, so
/// implementations need no internal locking. A publish attempt is made
/// exactly once; failures are reported to the caller and never retried.
#[async_trait::async_trait]
pub trait Publisher: Send + 'static {
    /// Deliver one batch
    async fn publish(&mut self, batch: Batch) -> Result<()>;

    /// Get the publisher name
    fn name(&self) -> &str;
}
