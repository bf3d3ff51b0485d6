//! Executing [`PatchPlan`]s against a [`ChunkStore`].
//!
//! Merging a sub-write into a chunk follows one rule: of the existing chunk,
//! only the bytes below the stream's current logical end are kept. Anything a
//! chunk holds beyond that is leftover from an earlier truncation or from a
//! batch that never committed, and must not resurface. The merged chunk gets
//! the nominal length it has under the new stream length, zero filled where
//! nothing was written.
//!
//! Writes that replace a chunk from its first byte to at least its current
//! live end skip reading the old content altogether.
use bytes::{Bytes, BytesMut};
use snafu::ensure;
use tracing::trace;

use crate::{
    backend::ChunkStore,
    chunk::{self, CHUNK_SIZE, StreamId, StreamKind},
    compositor::{PatchPlan, SubWrite},
    error::{BackendError, CorruptChunkSnafu},
};

/// Counts of what an applier did to the chunk store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    /// Chunks written, including trimmed chunks.
    pub chunks_written: u64,
    /// Chunks deleted.
    pub chunks_deleted: u64,
    /// Payload bytes written by sub-writes.
    pub bytes_written: u64,
}

/// Applies the plans of one batch to the two streams of one record.
#[derive(Debug)]
pub struct ChunkPatchApplier<'a, S> {
    store: &'a S,
    /// Per stream: whether nothing stale can exist past the running length.
    clean: [bool; 2],
    stats: ApplyStats,
}

impl<'a, S: ChunkStore> ChunkPatchApplier<'a, S> {
    /// Create an applier for a new batch.
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            clean: [false; 2],
            stats: ApplyStats::default(),
        }
    }

    /// What was done so far.
    pub fn stats(&self) -> ApplyStats {
        self.stats
    }

    /// Apply one plan.
    ///
    /// Plans must be applied in the order they were created, and `stream`
    /// must be the stream of the plan's kind.
    pub fn apply(&mut self, stream: &StreamId, plan: &PatchPlan) -> Result<(), BackendError> {
        debug_assert_eq!(stream.kind, plan.kind);
        if let Some(truncation) = &plan.truncation {
            let deleted = self.store.delete_from(stream, truncation.delete_from)?;
            trace!(%stream, from = truncation.delete_from, deleted, "truncated");
            self.stats.chunks_deleted += deleted;
            if let Some((index, keep)) = truncation.trim {
                self.trim(stream, index, keep)?;
            }
            *self.clean_mut(plan.kind) = true;
        } else if plan.grows() && !self.is_clean(plan.kind) {
            self.sweep(stream, plan)?;
            *self.clean_mut(plan.kind) = true;
        }
        if let Some(gap) = &plan.gap {
            trace!(%stream, ?gap, "sparse gap");
        }
        let live_len = plan.prev_len.min(plan.new_len);
        for write in &plan.writes {
            self.merge(stream, write, live_len, plan.new_len)?;
        }
        Ok(())
    }

    /// Remove leftovers past the committed end before the stream grows over them.
    ///
    /// Chunks past the end are deleted and the last partial chunk is cut to
    /// its nominal length, so the grown region reads as zeros. The cut is
    /// skipped when the plan writes that chunk anyway, since the merge drops
    /// the same bytes. This keeps a plain append at one chunk read.
    ///
    /// On the fs backend the deletion lists the stream directory, so its cost
    /// grows with the number of chunks in the stream. It runs at most once per
    /// stream and batch.
    fn sweep(&mut self, stream: &StreamId, plan: &PatchPlan) -> Result<(), BackendError> {
        let len = plan.prev_len;
        let deleted = self.store.delete_from(stream, chunk::chunk_count(len))?;
        if deleted > 0 {
            trace!(%stream, deleted, "swept chunks past end");
        }
        self.stats.chunks_deleted += deleted;
        let in_last = (len % CHUNK_SIZE) as usize;
        let last = chunk::chunk_index(len);
        if in_last != 0 && !plan.writes.iter().any(|write| write.index == last) {
            self.trim(stream, last, in_last)?;
        }
        Ok(())
    }

    /// Cut chunk `index` to `keep` bytes, if it is longer.
    fn trim(&mut self, stream: &StreamId, index: u64, keep: usize) -> Result<(), BackendError> {
        let Some(data) = self.load(stream, index)? else {
            return Ok(());
        };
        if data.len() > keep {
            self.store.put(stream, index, data.slice(..keep))?;
            self.stats.chunks_written += 1;
        }
        Ok(())
    }

    fn merge(
        &mut self,
        stream: &StreamId,
        write: &SubWrite,
        live_len: u64,
        new_len: u64,
    ) -> Result<(), BackendError> {
        let live = chunk::len_in_chunk(write.index, live_len);
        let target = chunk::len_in_chunk(write.index, new_len);
        debug_assert!(write.local.end <= target);

        let data = if write.local.start == 0 && write.local.end >= live {
            if write.local.end == target {
                write.data.clone()
            } else {
                let mut buf = BytesMut::zeroed(target);
                buf[write.local.clone()].copy_from_slice(&write.data);
                buf.freeze()
            }
        } else {
            let mut buf = BytesMut::with_capacity(target);
            if let Some(old) = self.load(stream, write.index)? {
                buf.extend_from_slice(&old[..old.len().min(live)]);
            }
            buf.resize(target, 0);
            buf[write.local.clone()].copy_from_slice(&write.data);
            buf.freeze()
        };
        self.store.put(stream, write.index, data)?;
        self.stats.chunks_written += 1;
        self.stats.bytes_written += write.data.len() as u64;
        Ok(())
    }

    fn load(&self, stream: &StreamId, index: u64) -> Result<Option<Bytes>, BackendError> {
        load_chunk(self.store, stream, index)
    }

    fn is_clean(&self, kind: StreamKind) -> bool {
        self.clean[kind.tag() as usize]
    }

    fn clean_mut(&mut self, kind: StreamKind) -> &mut bool {
        &mut self.clean[kind.tag() as usize]
    }
}

/// Load a chunk, rejecting chunks longer than [`CHUNK_SIZE`].
pub(crate) fn load_chunk(
    store: &impl ChunkStore,
    stream: &StreamId,
    index: u64,
) -> Result<Option<Bytes>, BackendError> {
    let data = store.get(stream, index)?;
    if let Some(data) = &data {
        ensure!(
            data.len() as u64 <= CHUNK_SIZE,
            CorruptChunkSnafu {
                stream: stream.to_string(),
                index,
                len: data.len(),
            }
        );
    }
    Ok(data)
}
