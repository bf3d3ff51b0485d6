//! Turning write operations into per-chunk patch plans.
//!
//! The compositor is pure. Given the current length of a stream and one
//! [`WriteOperation`], it works out where the payload lands, whether a sparse
//! gap opens up in front of it, what the new length is, and which chunks have
//! to be written, trimmed or deleted. The [`applier`](crate::applier)
//! executes the resulting [`PatchPlan`]s.
use std::ops::Range;

use bytes::Bytes;

use crate::{
    chunk::{self, MAX_STREAM_LEN, StreamKind},
    ops::WriteOperation,
    state::StreamState,
};

/// A write of part of an operation's payload into a single chunk.
#[derive(derive_more::Debug, Clone, PartialEq, Eq)]
pub struct SubWrite {
    /// The chunk index.
    pub index: u64,
    /// The range within the chunk that is overwritten.
    pub local: Range<usize>,
    /// The new bytes for `local`.
    #[debug("{} bytes", data.len())]
    pub data: Bytes,
}

/// The effect of a shrinking truncation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncation {
    /// All chunks with this index or higher are deleted.
    pub delete_from: u64,
    /// A chunk whose content must be cut to the given number of bytes,
    /// because the new end falls inside it and no sub-write rewrites it.
    pub trim: Option<(u64, usize)>,
}

/// Everything one operation does to one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchPlan {
    /// The stream the plan applies to.
    pub kind: StreamKind,
    /// Length of the stream before the operation.
    pub prev_len: u64,
    /// Length of the stream after the operation.
    pub new_len: u64,
    /// A range between the old end and the start of the payload. Nothing is
    /// written there, it reads as zeros.
    pub gap: Option<Range<u64>>,
    /// Set if the operation shrinks the stream.
    pub truncation: Option<Truncation>,
    /// Chunk writes, in ascending chunk order.
    pub writes: Vec<SubWrite>,
}

impl PatchPlan {
    /// True if the operation makes the stream longer.
    pub fn grows(&self) -> bool {
        self.new_len > self.prev_len
    }
}

/// An operation would make a stream longer than [`MAX_STREAM_LEN`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfRange {
    /// Index of the offending operation in its batch.
    pub op: usize,
    /// The stream.
    pub kind: StreamKind,
}

/// Plan a single operation against a stream of length `current_len`.
///
/// Returns `None` if the end of the write is past [`MAX_STREAM_LEN`].
pub fn plan(current_len: u64, op: &WriteOperation) -> Option<PatchPlan> {
    let pos = op.pos.resolve(current_len);
    let write_end = pos
        .checked_add(op.data.len() as u64)
        .filter(|end| *end <= MAX_STREAM_LEN)?;

    let gap = (pos > current_len).then(|| current_len..pos);
    let new_len = if op.truncate {
        write_end
    } else {
        current_len.max(write_end)
    };

    let truncation = (new_len < current_len).then(|| {
        let in_last = (new_len % chunk::CHUNK_SIZE) as usize;
        // a non-empty payload always ends in the boundary chunk and rewrites it
        let trim = (in_last != 0 && op.data.is_empty())
            .then(|| (chunk::chunk_index(new_len), in_last));
        Truncation {
            delete_from: chunk::chunk_count(new_len),
            trim,
        }
    });

    let writes = chunk::spans(pos, op.data.len() as u64)
        .map(|span| SubWrite {
            index: span.index,
            local: span.local,
            data: op.data.slice(span.buf),
        })
        .collect();

    Some(PatchPlan {
        kind: op.kind,
        prev_len: current_len,
        new_len,
        gap,
        truncation,
        writes,
    })
}

/// Plan a whole batch, threading the running length of each stream through
/// the operations in order.
///
/// Returns the plans and the resulting lengths. The version of the returned
/// state is left untouched.
pub fn plan_batch(
    state: &StreamState,
    ops: &[WriteOperation],
) -> Result<(Vec<PatchPlan>, StreamState), OutOfRange> {
    let mut state = *state;
    let mut plans = Vec::with_capacity(ops.len());
    for (i, op) in ops.iter().enumerate() {
        let len = state.len_mut(op.kind);
        let plan = plan(*len, op).ok_or(OutOfRange {
            op: i,
            kind: op.kind,
        })?;
        *len = plan.new_len;
        plans.push(plan);
    }
    Ok((plans, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{chunk::CHUNK_SIZE, ops::WritePos};

    const C: u64 = CHUNK_SIZE;

    fn file(pos: u64, data: &'static [u8]) -> WriteOperation {
        WriteOperation::write(StreamKind::File, pos, data)
    }

    #[test]
    fn plain_write_extends() {
        let plan = plan(0, &file(0, b"hello")).unwrap();
        assert_eq!(plan.new_len, 5);
        assert_eq!(plan.gap, None);
        assert_eq!(plan.truncation, None);
        assert_eq!(plan.writes.len(), 1);
        assert_eq!(plan.writes[0].local, 0..5);
        assert!(plan.grows());
    }

    #[test]
    fn write_inside_does_not_shrink() {
        let plan = plan(100, &file(10, b"abc")).unwrap();
        assert_eq!(plan.new_len, 100);
        assert!(!plan.grows());
    }

    #[test]
    fn write_past_end_opens_gap() {
        let plan = plan(10, &file(2 * C + 5, b"xyz")).unwrap();
        assert_eq!(plan.gap, Some(10..2 * C + 5));
        assert_eq!(plan.new_len, 2 * C + 8);
        // only the chunk holding the payload is touched
        assert_eq!(plan.writes.len(), 1);
        assert_eq!(plan.writes[0].index, 2);
        assert_eq!(plan.writes[0].local, 5..8);
    }

    #[test]
    fn empty_write_past_end_extends_without_chunks() {
        let plan = plan(10, &file(50, b"")).unwrap();
        assert_eq!(plan.new_len, 50);
        assert_eq!(plan.gap, Some(10..50));
        assert!(plan.writes.is_empty());
    }

    #[test]
    fn append_resolves_to_current_len() {
        let op = WriteOperation::append(StreamKind::File, &b"ab"[..]);
        let plan = plan(7, &op).unwrap();
        assert_eq!(plan.writes[0].local, 7..9);
        assert_eq!(plan.new_len, 9);
        assert_eq!(op.pos, WritePos::Append);
    }

    #[test]
    fn truncate_shrinks_mid_chunk() {
        let op = WriteOperation::truncate(StreamKind::File, C + 10);
        let plan = plan(3 * C, &op).unwrap();
        assert_eq!(plan.new_len, C + 10);
        assert_eq!(
            plan.truncation,
            Some(Truncation {
                delete_from: 2,
                trim: Some((1, 10)),
            })
        );
    }

    #[test]
    fn truncate_on_chunk_boundary_deletes_whole_chunks() {
        let op = WriteOperation::truncate(StreamKind::File, C);
        let plan = plan(3 * C, &op).unwrap();
        assert_eq!(
            plan.truncation,
            Some(Truncation {
                delete_from: 1,
                trim: None,
            })
        );
    }

    #[test]
    fn truncate_to_zero_deletes_everything() {
        let plan = plan(5, &WriteOperation::truncate(StreamKind::File, 0)).unwrap();
        assert_eq!(plan.new_len, 0);
        assert_eq!(
            plan.truncation,
            Some(Truncation {
                delete_from: 0,
                trim: None,
            })
        );
    }

    #[test]
    fn truncating_write_sets_exact_len() {
        let op = WriteOperation::write_truncate(StreamKind::File, 2, &b"xy"[..]);
        let plan = plan(100, &op).unwrap();
        assert_eq!(plan.new_len, 4);
        let truncation = plan.truncation.unwrap();
        assert_eq!(truncation.delete_from, 1);
        // the payload rewrites the boundary chunk itself
        assert_eq!(truncation.trim, None);

        let plan = plan_batch(
            &StreamState::default(),
            &[WriteOperation::write_truncate(StreamKind::File, 10, &b"xy"[..])],
        )
        .unwrap()
        .0;
        // growing with truncate is just a write
        assert_eq!(plan[0].new_len, 12);
        assert_eq!(plan[0].truncation, None);
    }

    #[test]
    fn batch_threads_lengths_per_stream() {
        let ops = [
            file(0, b"BBBB"),
            WriteOperation::append(StreamKind::Checksum, &b"cc"[..]),
            WriteOperation::truncate(StreamKind::File, 1),
            WriteOperation::append(StreamKind::File, &b"Z"[..]),
            WriteOperation::append(StreamKind::Checksum, &b"d"[..]),
        ];
        let (plans, state) = plan_batch(&StreamState::default(), &ops).unwrap();
        assert_eq!(plans.len(), 5);
        assert_eq!(plans[3].writes[0].local, 1..2);
        assert_eq!(plans[4].writes[0].local, 2..3);
        assert_eq!(state.file_length, 2);
        assert_eq!(state.checksum_length, 3);
        assert_eq!(state.version, 0);
    }

    #[test]
    fn out_of_range() {
        let ops = [file(0, b"ok"), file(MAX_STREAM_LEN, b"x")];
        let err = plan_batch(&StreamState::default(), &ops).unwrap_err();
        assert_eq!(
            err,
            OutOfRange {
                op: 1,
                kind: StreamKind::File,
            }
        );
        assert!(plan(0, &file(u64::MAX, b"x")).is_none());
        assert!(plan(0, &file(MAX_STREAM_LEN, b"")).is_some());
    }
}
