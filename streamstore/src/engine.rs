//! The synchronous core of every store operation.
//!
//! These functions run against anything that is both a [`ChunkStore`] and a
//! [`StateStore`] and do no locking of their own. The [`Store`](crate::Store)
//! serializes access per record and runs them on blocking threads.
//!
//! A write batch goes through these steps:
//!
//! 1. load the record state, failing with `RecordNotFound`,
//! 2. check the version, failing with `InvalidVersion`,
//! 3. plan every operation, failing with `OutOfRange`,
//! 4. apply the plans to the chunk store in order,
//! 5. commit the new lengths and the incremented version.
//!
//! Steps 1 to 3 mutate nothing. The state commit comes last, so a batch that
//! fails while touching chunks leaves the committed state as it was.
use bytes::Bytes;
use snafu::OptionExt;
use tracing::debug;

use crate::{
    applier::{ApplyStats, ChunkPatchApplier},
    backend::{ChunkStore, StateStore},
    chunk::{self, StreamId, StreamKind},
    compositor,
    error::{OutOfRangeSnafu, RecordExistsSnafu, RecordNotFoundSnafu, StoreError},
    gate,
    ops::{InitialContent, ReadRange, WriteBatch},
    reader,
    record::RecordId,
    state::StreamState,
};

/// The result of a committed write batch or record creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Committed {
    /// The state that was committed.
    pub state: StreamState,
    /// What was done to the chunk store.
    pub stats: ApplyStats,
}

/// Load the state of a record that must exist.
pub fn stat<B: StateStore>(backend: &B, record: &RecordId) -> Result<StreamState, StoreError> {
    let state = backend
        .load_state(record)?
        .context(RecordNotFoundSnafu {
            record: record.clone(),
        })?;
    Ok(state)
}

/// Create a record, optionally uploading initial content for both streams.
///
/// The content is written chunk by chunk without reading anything back.
/// The new record has version 0.
pub fn create<B: ChunkStore + StateStore>(
    backend: &B,
    record: &RecordId,
    initial: Option<&InitialContent>,
) -> Result<Committed, StoreError> {
    if backend.load_state(record)?.is_some() {
        return RecordExistsSnafu {
            record: record.clone(),
        }
        .fail();
    }
    let mut stats = ApplyStats::default();
    let mut state = StreamState::default();
    for kind in StreamKind::ALL {
        let stream = StreamId::new(record.clone(), kind);
        // chunks of a record that was never fully created
        stats.chunks_deleted += backend.delete_from(&stream, 0)?;
        let Some(data) = initial.map(|initial| match kind {
            StreamKind::File => &initial.file,
            StreamKind::Checksum => &initial.checksum,
        }) else {
            continue;
        };
        for span in chunk::spans(0, data.len() as u64) {
            backend.put(&stream, span.index, data.slice(span.buf))?;
            stats.chunks_written += 1;
        }
        stats.bytes_written += data.len() as u64;
        *state.len_mut(kind) = data.len() as u64;
    }
    if !backend.create_state(record, state)? {
        return RecordExistsSnafu {
            record: record.clone(),
        }
        .fail();
    }
    debug!(%record, file = state.file_length, checksum = state.checksum_length, "created record");
    Ok(Committed { state, stats })
}

/// Apply a write batch.
pub fn write<B: ChunkStore + StateStore>(
    backend: &B,
    batch: &WriteBatch,
) -> Result<Committed, StoreError> {
    let record = &batch.record;
    let stored = stat(backend, record)?;
    gate::check(&stored, batch.expected_version, batch.force)?;
    let (plans, lengths) = compositor::plan_batch(&stored, &batch.operations)
        .map_err(|err| OutOfRangeSnafu { op: err.op, kind: err.kind }.build())?;

    let streams = StreamKind::ALL.map(|kind| StreamId::new(record.clone(), kind));
    let mut applier = ChunkPatchApplier::new(backend);
    for plan in &plans {
        applier.apply(&streams[plan.kind.tag() as usize], plan)?;
    }

    let state = gate::next_state(&stored, &lengths);
    backend.store_state(record, state)?;
    debug!(
        %record,
        ops = plans.len(),
        bytes = batch.payload_len(),
        version = state.version,
        file = state.file_length,
        checksum = state.checksum_length,
        "committed batch"
    );
    Ok(Committed {
        state,
        stats: applier.stats(),
    })
}

/// Read a range of a record.
pub fn read<B: ChunkStore + StateStore>(
    backend: &B,
    record: &RecordId,
    range: ReadRange,
) -> Result<Bytes, StoreError> {
    let state = stat(backend, record)?;
    let kind = range.kind();
    let len = state.len(kind);
    let stream = StreamId::new(record.clone(), kind);
    let data = reader::read_range(backend, &stream, len, range.clamp(len))?;
    Ok(data)
}

/// Delete a record and all of its chunks.
pub fn delete<B: StateStore>(backend: &B, record: &RecordId) -> Result<(), StoreError> {
    if !backend.remove_record(record)? {
        return RecordNotFoundSnafu {
            record: record.clone(),
        }
        .fail();
    }
    debug!(%record, "deleted record");
    Ok(())
}
