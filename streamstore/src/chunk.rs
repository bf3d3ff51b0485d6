//! Chunk geometry.
//!
//! A stream of logical length `L` is split into chunks `0..chunk_count(L)`.
//! All chunks but the last are [`CHUNK_SIZE`] bytes, the last one holds
//! `L % CHUNK_SIZE` bytes unless `L` is chunk aligned.
use std::{fmt, ops::Range};

use serde::{Deserialize, Serialize};

use crate::record::RecordId;

/// The size of a chunk in bytes, 255 KiB.
///
/// This is a property of the storage format and must never change for an
/// existing store.
pub const CHUNK_SIZE: u64 = 255 * 1024;

/// Largest supported stream length.
///
/// Writes ending past this are rejected, which keeps all offset arithmetic
/// within `u64` and all offsets representable on the wire.
pub const MAX_STREAM_LEN: u64 = i64::MAX as u64;

/// Which of the two streams of a record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// The file content.
    File,
    /// The checksum stream kept alongside the file content.
    Checksum,
}

impl StreamKind {
    /// Both stream kinds, in storage order.
    pub const ALL: [Self; 2] = [Self::File, Self::Checksum];

    /// Stable name, used for directory names and table keys.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Checksum => "checksum",
        }
    }

    /// Stable tag byte, used in binary keys.
    pub(crate) const fn tag(&self) -> u8 {
        match self {
            Self::File => 0,
            Self::Checksum => 1,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one stream: the owning record plus the stream kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
#[display("{record}/{kind}")]
pub struct StreamId {
    /// The owning record.
    pub record: RecordId,
    /// Which stream of the record.
    pub kind: StreamKind,
}

impl StreamId {
    /// Create a stream id.
    pub fn new(record: RecordId, kind: StreamKind) -> Self {
        Self { record, kind }
    }
}

/// Index of the chunk containing the byte at `offset`.
pub const fn chunk_index(offset: u64) -> u64 {
    offset / CHUNK_SIZE
}

/// Number of chunks needed to hold `len` bytes.
pub const fn chunk_count(len: u64) -> u64 {
    len.div_ceil(CHUNK_SIZE)
}

/// Absolute byte offset of the first byte of chunk `index`.
pub const fn chunk_start(index: u64) -> u64 {
    index * CHUNK_SIZE
}

/// Nominal number of bytes chunk `index` holds in a stream of length `stream_len`.
///
/// This is [`CHUNK_SIZE`] for interior chunks, the remainder for the last
/// chunk, and 0 for chunks past the end.
pub fn len_in_chunk(index: u64, stream_len: u64) -> usize {
    let start = chunk_start(index);
    if stream_len <= start {
        0
    } else {
        (stream_len - start).min(CHUNK_SIZE) as usize
    }
}

/// A part of an absolute byte range that falls into a single chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    /// The chunk index.
    pub index: u64,
    /// Range within the chunk.
    pub local: Range<usize>,
    /// Range within the buffer that covers the whole absolute range.
    pub buf: Range<usize>,
}

/// Split the absolute range `offset..offset + len` at chunk boundaries.
///
/// Returns an empty iterator for `len == 0`.
pub fn spans(offset: u64, len: u64) -> impl Iterator<Item = ChunkSpan> {
    let end = offset + len;
    let first = chunk_index(offset);
    let last = if len == 0 { first } else { chunk_count(end) };
    (first..last).map(move |index| {
        let start = chunk_start(index);
        let from = offset.max(start);
        let to = end.min(start + CHUNK_SIZE);
        ChunkSpan {
            index,
            local: (from - start) as usize..(to - start) as usize,
            buf: (from - offset) as usize..(to - offset) as usize,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const C: u64 = CHUNK_SIZE;

    #[test]
    fn chunk_size_is_255_kib() {
        assert_eq!(CHUNK_SIZE, 261_120);
    }

    #[test]
    fn counts() {
        assert_eq!(chunk_count(0), 0);
        assert_eq!(chunk_count(1), 1);
        assert_eq!(chunk_count(C), 1);
        assert_eq!(chunk_count(C + 1), 2);
        assert_eq!(chunk_index(C - 1), 0);
        assert_eq!(chunk_index(C), 1);
    }

    #[test]
    fn nominal_len() {
        assert_eq!(len_in_chunk(0, 0), 0);
        assert_eq!(len_in_chunk(0, 10), 10);
        assert_eq!(len_in_chunk(0, C + 10), C as usize);
        assert_eq!(len_in_chunk(1, C + 10), 10);
        assert_eq!(len_in_chunk(1, 2 * C), C as usize);
        assert_eq!(len_in_chunk(2, 2 * C), 0);
    }

    #[test]
    fn spans_within_one_chunk() {
        let spans: Vec<_> = spans(10, 20).collect();
        assert_eq!(
            spans,
            vec![ChunkSpan {
                index: 0,
                local: 10..30,
                buf: 0..20,
            }]
        );
    }

    #[test]
    fn spans_across_boundaries() {
        let spans: Vec<_> = spans(C - 16, C + 32).collect();
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].index, 0);
        assert_eq!(spans[0].local, (C - 16) as usize..C as usize);
        assert_eq!(spans[0].buf, 0..16);
        assert_eq!(spans[1].index, 1);
        assert_eq!(spans[1].local, 0..C as usize);
        assert_eq!(spans[1].buf, 16..(C + 16) as usize);
        assert_eq!(spans[2].index, 2);
        assert_eq!(spans[2].local, 0..16);
        assert_eq!(spans[2].buf, (C + 16) as usize..(C + 32) as usize);
    }

    #[test]
    fn spans_aligned_end() {
        let spans: Vec<_> = spans(0, C).collect();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].local, 0..C as usize);
    }

    #[test]
    fn spans_empty() {
        assert_eq!(spans(C * 3 + 5, 0).count(), 0);
    }
}
