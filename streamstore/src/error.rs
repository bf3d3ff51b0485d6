//! Errors returned by the store and its backends.
use std::io;

use nested_enum_utils::common_fields;
use snafu::{Backtrace, IntoError, Snafu};

use crate::{chunk::StreamKind, record::RecordId};

/// A chunk or state backend failed.
///
/// Backend failures abort the batch they occur in. Chunk writes that already
/// landed are not rolled back, but the record state commit, which always
/// happens last, never lands, so the advertised length and version stay at
/// their pre-batch values.
#[common_fields({
    backtrace: Option<Backtrace>,
    #[snafu(implicit)]
    span_trace: n0_snafu::SpanTrace,
})]
#[allow(missing_docs)]
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum BackendError {
    #[snafu(transparent)]
    Io { source: io::Error },
    #[snafu(transparent)]
    Redb { source: redb::Error },
    #[snafu(display("failed to decode record state"))]
    Encoding { source: postcard::Error },
    #[snafu(display("corrupt chunk {index} of {stream}: {len} bytes"))]
    CorruptChunk {
        stream: String,
        index: u64,
        len: usize,
    },
    #[snafu(display("blocking task failed"))]
    Join { source: tokio::task::JoinError },
}

macro_rules! impl_from_redb {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for BackendError {
                fn from(value: $ty) -> Self {
                    redb::Error::from(value).into()
                }
            }
        )*
    };
}

impl_from_redb!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError
);

/// Errors surfaced by [`Store`](crate::Store) operations.
#[common_fields({
    backtrace: Option<Backtrace>,
    #[snafu(implicit)]
    span_trace: n0_snafu::SpanTrace,
})]
#[allow(missing_docs)]
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum StoreError {
    /// The expected version did not match and the write was not forced.
    ///
    /// Nothing was mutated. Re-read and retry.
    #[snafu(display("invalid version: expected {expected}, record is at {actual}"))]
    InvalidVersion { expected: u64, actual: u64 },
    /// The record does not exist.
    #[snafu(display("record {record} not found"))]
    RecordNotFound { record: RecordId },
    /// The record already exists.
    #[snafu(display("record {record} already exists"))]
    RecordExists { record: RecordId },
    /// An operation would grow a stream past
    /// [`MAX_STREAM_LEN`](crate::chunk::MAX_STREAM_LEN).
    ///
    /// Nothing was mutated.
    #[snafu(display("operation {op} writes past the maximum length of the {kind} stream"))]
    OutOfRange { op: usize, kind: StreamKind },
    /// The backend failed.
    #[snafu(display("backend error"))]
    Backend { source: BackendError },
}

impl StoreError {
    /// Stable error code, suitable for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidVersion { .. } => "INVALID_VERSION",
            Self::RecordNotFound { .. } => "RECORD_NOT_FOUND",
            Self::RecordExists { .. } => "RECORD_EXISTS",
            Self::OutOfRange { .. } => "OUT_OF_RANGE",
            Self::Backend { .. } => "BACKEND_ERROR",
        }
    }
}

impl From<BackendError> for StoreError {
    fn from(source: BackendError) -> Self {
        BackendSnafu.into_error(source)
    }
}
