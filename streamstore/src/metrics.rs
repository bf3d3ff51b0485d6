//! Metrics for the store.
use iroh_metrics::{Counter, MetricsGroup};

/// Metrics tracked by a [`Store`](crate::Store).
#[derive(Debug, Default, MetricsGroup)]
#[metrics(name = "streamstore")]
pub struct Metrics {
    /// Write batches that were committed.
    pub batches_committed: Counter,
    /// Write batches rejected because of a version mismatch.
    pub batches_rejected: Counter,
    /// Write operations applied in committed batches.
    pub operations_applied: Counter,
    /// Payload bytes written.
    pub bytes_written: Counter,
    /// Chunks written, including rewrites and trims.
    pub chunks_written: Counter,
    /// Chunks physically deleted by truncations and sweeps.
    ///
    /// Chunks dropped together with their record are not counted here.
    pub chunks_deleted: Counter,
    /// Reads served.
    pub reads: Counter,
    /// Bytes returned by reads.
    pub bytes_read: Counter,
    /// Records created.
    pub records_created: Counter,
    /// Records deleted.
    pub records_deleted: Counter,
}
