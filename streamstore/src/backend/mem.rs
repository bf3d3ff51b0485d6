//! In memory backend.
//!
//! Chunks and record state live in ordered maps behind a lock. Nothing is
//! persisted, so this is mostly useful for tests and short lived stores.
use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use bytes::Bytes;

use super::{ChunkStore, StateStore};
use crate::{
    chunk::StreamId,
    error::BackendError,
    record::RecordId,
    state::StreamState,
};

/// A cheaply cloneable in memory backend.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    inner: Arc<RwLock<State>>,
}

#[derive(derive_more::Debug, Default)]
struct State {
    #[debug("{} chunks", chunks.len())]
    chunks: BTreeMap<(StreamId, u64), Bytes>,
    records: BTreeMap<RecordId, StreamState>,
}

impl MemStore {
    /// Number of chunks currently stored, across all streams.
    pub fn chunk_count(&self) -> usize {
        self.inner.read().unwrap().chunks.len()
    }

    /// Indices of all chunks currently stored for a stream, in order.
    pub fn chunk_indices(&self, stream: &StreamId) -> Vec<u64> {
        let state = self.inner.read().unwrap();
        state
            .chunks
            .range((stream.clone(), 0)..=(stream.clone(), u64::MAX))
            .map(|((_, index), _)| *index)
            .collect()
    }
}

impl ChunkStore for MemStore {
    fn get(&self, stream: &StreamId, index: u64) -> Result<Option<Bytes>, BackendError> {
        let state = self.inner.read().unwrap();
        Ok(state.chunks.get(&(stream.clone(), index)).cloned())
    }

    fn put(&self, stream: &StreamId, index: u64, data: Bytes) -> Result<(), BackendError> {
        let mut state = self.inner.write().unwrap();
        state.chunks.insert((stream.clone(), index), data);
        Ok(())
    }

    fn delete(&self, stream: &StreamId, index: u64) -> Result<(), BackendError> {
        let mut state = self.inner.write().unwrap();
        state.chunks.remove(&(stream.clone(), index));
        Ok(())
    }

    fn delete_from(&self, stream: &StreamId, from: u64) -> Result<u64, BackendError> {
        let mut state = self.inner.write().unwrap();
        let keys: Vec<_> = state
            .chunks
            .range((stream.clone(), from)..=(stream.clone(), u64::MAX))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            state.chunks.remove(key);
        }
        Ok(keys.len() as u64)
    }
}

impl StateStore for MemStore {
    fn load_state(&self, record: &RecordId) -> Result<Option<StreamState>, BackendError> {
        Ok(self.inner.read().unwrap().records.get(record).copied())
    }

    fn create_state(&self, record: &RecordId, state: StreamState) -> Result<bool, BackendError> {
        let mut inner = self.inner.write().unwrap();
        if inner.records.contains_key(record) {
            return Ok(false);
        }
        inner.records.insert(record.clone(), state);
        Ok(true)
    }

    fn store_state(&self, record: &RecordId, state: StreamState) -> Result<(), BackendError> {
        self.inner
            .write()
            .unwrap()
            .records
            .insert(record.clone(), state);
        Ok(())
    }

    fn remove_record(&self, record: &RecordId) -> Result<bool, BackendError> {
        let mut inner = self.inner.write().unwrap();
        let existed = inner.records.remove(record).is_some();
        inner.chunks.retain(|(stream, _), _| &stream.record != record);
        Ok(existed)
    }
}
