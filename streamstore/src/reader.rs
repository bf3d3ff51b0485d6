//! Reading byte ranges of a stream.
//!
//! A read walks the chunks overlapping the requested range. Absent chunks
//! and the missing tail of short chunks are sparse regions and read as zeros.
use std::ops::Range;

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::{
    applier::load_chunk,
    backend::ChunkStore,
    chunk::{self, StreamId},
    error::BackendError,
};

/// Read `range` of a stream whose logical length is `stream_len`.
///
/// The range is clamped to the stream. An empty or fully clamped range
/// returns empty bytes without touching the store.
pub fn read_range(
    store: &impl ChunkStore,
    stream: &StreamId,
    stream_len: u64,
    range: Range<u64>,
) -> Result<Bytes, BackendError> {
    let end = range.end.min(stream_len);
    let start = range.start.min(end);
    let len = end - start;
    if len == 0 {
        return Ok(Bytes::new());
    }
    trace!(%stream, start, end, "read");

    let mut spans = chunk::spans(start, len).peekable();
    let mut out = BytesMut::new();
    let mut first = true;
    while let Some(span) = spans.next() {
        let data = load_chunk(store, stream, span.index)?.unwrap_or_default();
        // single chunk fully present: hand out a view of the stored bytes
        if first && spans.peek().is_none() && span.local.end <= data.len() {
            return Ok(data.slice(span.local));
        }
        if first {
            out.reserve(len as usize);
            first = false;
        }
        let filled = out.len() + span.local.len();
        if let Some(stored) = data.get(span.local.start..data.len().min(span.local.end)) {
            out.extend_from_slice(stored);
        }
        out.resize(filled, 0);
    }
    Ok(out.freeze())
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;
    use crate::{
        backend::mem::MemStore,
        chunk::{CHUNK_SIZE, StreamKind},
    };

    const C: u64 = CHUNK_SIZE;

    fn file() -> StreamId {
        StreamId::new("rec".parse().unwrap(), StreamKind::File)
    }

    #[test]
    fn clamps_to_stream_len() -> TestResult {
        let store = MemStore::default();
        store.put(&file(), 0, Bytes::from(vec![9u8; 100]))?;
        assert_eq!(read_range(&store, &file(), 100, 90..110)?.len(), 10);
        assert!(read_range(&store, &file(), 100, 200..300)?.is_empty());
        assert!(read_range(&store, &file(), 100, 50..50)?.is_empty());
        assert!(read_range(&store, &file(), 0, 0..10)?.is_empty());
        Ok(())
    }

    #[test]
    fn absent_chunks_read_as_zeros() -> TestResult {
        let store = MemStore::default();
        store.put(&file(), 2, Bytes::from_static(b"xyz"))?;
        let len = 2 * C + 3;
        let data = read_range(&store, &file(), len, 0..len)?;
        assert_eq!(data.len() as u64, len);
        assert!(data[..(2 * C) as usize].iter().all(|b| *b == 0));
        assert_eq!(&data[(2 * C) as usize..], b"xyz");
        Ok(())
    }

    #[test]
    fn short_chunk_is_padded() -> TestResult {
        let store = MemStore::default();
        store.put(&file(), 0, Bytes::from_static(b"ab"))?;
        assert_eq!(&read_range(&store, &file(), 5, 0..5)?[..], b"ab\0\0\0");
        assert_eq!(&read_range(&store, &file(), 5, 3..5)?[..], b"\0\0");
        Ok(())
    }

    #[test]
    fn reads_across_chunks() -> TestResult {
        let store = MemStore::default();
        store.put(&file(), 0, Bytes::from(vec![1u8; C as usize]))?;
        store.put(&file(), 1, Bytes::from(vec![2u8; 10]))?;
        let data = read_range(&store, &file(), C + 10, C - 2..C + 2)?;
        assert_eq!(&data[..], &[1, 1, 2, 2]);
        Ok(())
    }

    #[test]
    fn single_chunk_read_is_a_view() -> TestResult {
        let store = MemStore::default();
        let chunk = Bytes::from_static(b"0123456789");
        store.put(&file(), 0, chunk.clone())?;
        let data = read_range(&store, &file(), 10, 2..6)?;
        assert_eq!(&data[..], b"2345");
        assert_eq!(data.as_ptr(), chunk[2..].as_ptr());
        Ok(())
    }
}
