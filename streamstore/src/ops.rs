//! Write and read requests.
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{chunk::StreamKind, record::RecordId};

/// Where a write operation starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WritePos {
    /// At an absolute byte offset.
    At(u64),
    /// At the current end of the stream, as of the moment the operation is
    /// evaluated. Earlier operations of the same batch are taken into account.
    Append,
}

impl WritePos {
    /// Convert from the wire representation, where `-1` means append.
    ///
    /// Returns `None` for any other negative value.
    pub fn from_wire(pos: i64) -> Option<Self> {
        match pos {
            -1 => Some(Self::Append),
            pos => u64::try_from(pos).ok().map(Self::At),
        }
    }

    /// Resolve to an absolute offset given the current stream length.
    pub fn resolve(self, current_len: u64) -> u64 {
        match self {
            Self::At(pos) => pos,
            Self::Append => current_len,
        }
    }
}

/// A single write, append or truncation against one stream of a record.
#[derive(derive_more::Debug, Clone, PartialEq, Eq)]
pub struct WriteOperation {
    /// The stream this operation applies to.
    pub kind: StreamKind,
    /// The payload.
    #[debug("{} bytes", data.len())]
    pub data: Bytes,
    /// Where the payload starts.
    pub pos: WritePos,
    /// If true, the stream length becomes exactly the end of this write,
    /// discarding everything beyond it.
    pub truncate: bool,
}

impl WriteOperation {
    /// Write `data` at `pos` without truncating.
    pub fn write(kind: StreamKind, pos: u64, data: impl Into<Bytes>) -> Self {
        Self {
            kind,
            data: data.into(),
            pos: WritePos::At(pos),
            truncate: false,
        }
    }

    /// Append `data` to the end of the stream.
    pub fn append(kind: StreamKind, data: impl Into<Bytes>) -> Self {
        Self {
            kind,
            data: data.into(),
            pos: WritePos::Append,
            truncate: false,
        }
    }

    /// Write `data` at `pos` and set the stream length to the end of the write.
    pub fn write_truncate(kind: StreamKind, pos: u64, data: impl Into<Bytes>) -> Self {
        Self {
            kind,
            data: data.into(),
            pos: WritePos::At(pos),
            truncate: true,
        }
    }

    /// Set the stream length to exactly `len`.
    pub fn truncate(kind: StreamKind, len: u64) -> Self {
        Self::write_truncate(kind, len, Bytes::new())
    }
}

/// An ordered list of operations applied to a record as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteBatch {
    /// The record to write to.
    pub record: RecordId,
    /// The version the caller expects the record to have.
    pub expected_version: u64,
    /// Skip the version comparison.
    pub force: bool,
    /// Operations, applied strictly in order.
    pub operations: Vec<WriteOperation>,
}

impl WriteBatch {
    /// Create an empty batch expecting the given version.
    pub fn new(record: RecordId, expected_version: u64) -> Self {
        Self {
            record,
            expected_version,
            force: false,
            operations: Vec::new(),
        }
    }

    /// Set the force flag.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Add an operation.
    pub fn with(mut self, op: WriteOperation) -> Self {
        self.operations.push(op);
        self
    }

    /// Total payload size of all operations.
    pub fn payload_len(&self) -> u64 {
        self.operations.iter().map(|op| op.data.len() as u64).sum()
    }
}

/// Which bytes to read from a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReadRange {
    /// The whole file stream.
    All,
    /// The whole checksum stream.
    Checksum,
    /// The byte range `from..to` of the file stream.
    Slice {
        /// Start offset, inclusive.
        from: u64,
        /// End offset, exclusive.
        to: u64,
    },
}

impl ReadRange {
    /// The stream this range reads from.
    pub fn kind(&self) -> StreamKind {
        match self {
            Self::All | Self::Slice { .. } => StreamKind::File,
            Self::Checksum => StreamKind::Checksum,
        }
    }

    /// The absolute range to read, clamped to a stream of length `stream_len`.
    ///
    /// The result is empty if the requested start is at or past the end.
    pub fn clamp(&self, stream_len: u64) -> std::ops::Range<u64> {
        match *self {
            Self::All | Self::Checksum => 0..stream_len,
            Self::Slice { from, to } => {
                let to = to.min(stream_len);
                let from = from.min(to);
                from..to
            }
        }
    }
}

/// Content uploaded sequentially when a record is created.
#[derive(derive_more::Debug, Clone, Default, PartialEq, Eq)]
pub struct InitialContent {
    /// Initial file stream content.
    #[debug("{} bytes", file.len())]
    pub file: Bytes,
    /// Initial checksum stream content.
    #[debug("{} bytes", checksum.len())]
    pub checksum: Bytes,
}
