//! Storage backends for chunks and record state.
//!
//! The engine only needs a key value map from `(stream, chunk index)` to
//! bytes, see [`ChunkStore`], plus a place to keep the per-record
//! [`StreamState`], see [`StateStore`]. Both traits are synchronous. The
//! [`Store`](crate::Store) runs them on blocking threads.
//!
//! Three implementations exist:
//! - [`mem::MemStore`]: everything in memory.
//! - [`fs::FsStore`]: one file per chunk.
//! - [`redb::RedbStore`]: one table row per chunk.
//!
//! [`Backend`] selects one of them at startup.
use bytes::Bytes;

use crate::{
    chunk::StreamId, config::BackendConfig, error::BackendError, record::RecordId,
    state::StreamState,
};

pub mod fs;
pub mod mem;
pub mod redb;

/// Addressable storage of chunks, keyed by stream and chunk index.
///
/// A chunk store knows nothing about stream lengths. An absent chunk is
/// reported as `None`, which is distinct from a present empty chunk.
pub trait ChunkStore {
    /// Get the full content of a chunk, or `None` if there is no such chunk.
    fn get(&self, stream: &StreamId, index: u64) -> Result<Option<Bytes>, BackendError>;

    /// Store a chunk, replacing any previous content.
    ///
    /// `data` is at most [`CHUNK_SIZE`](crate::CHUNK_SIZE) bytes.
    fn put(&self, stream: &StreamId, index: u64, data: Bytes) -> Result<(), BackendError>;

    /// Delete a chunk. Deleting an absent chunk is not an error.
    fn delete(&self, stream: &StreamId, index: u64) -> Result<(), BackendError>;

    /// Delete every chunk of the stream with an index of `from` or higher.
    ///
    /// Returns the number of deleted chunks.
    fn delete_from(&self, stream: &StreamId, from: u64) -> Result<u64, BackendError>;
}

/// Persistence of the per-record [`StreamState`].
pub trait StateStore {
    /// Load the state of a record, or `None` if the record does not exist.
    fn load_state(&self, record: &RecordId) -> Result<Option<StreamState>, BackendError>;

    /// Create a record with the given state.
    ///
    /// Returns `false` without changing anything if the record already exists.
    fn create_state(&self, record: &RecordId, state: StreamState) -> Result<bool, BackendError>;

    /// Overwrite the state of an existing record.
    fn store_state(&self, record: &RecordId, state: StreamState) -> Result<(), BackendError>;

    /// Remove a record, including all chunks of both its streams.
    ///
    /// Returns `false` if the record did not exist.
    fn remove_record(&self, record: &RecordId) -> Result<bool, BackendError>;
}

/// A backend, selected at runtime from a [`BackendConfig`].
#[derive(Debug)]
pub enum Backend {
    /// In memory backend.
    Mem(mem::MemStore),
    /// File system backend.
    Fs(fs::FsStore),
    /// redb backend.
    Redb(redb::RedbStore),
}

impl Backend {
    /// Open the backend described by `config`.
    pub fn open(config: &BackendConfig) -> Result<Self, BackendError> {
        Ok(match config {
            BackendConfig::Mem => Self::Mem(mem::MemStore::default()),
            BackendConfig::Fs { path } => Self::Fs(fs::FsStore::open(path)?),
            BackendConfig::Redb { path } => Self::Redb(redb::RedbStore::persistent(path)?),
        })
    }

    /// An empty in-memory backend.
    pub fn memory() -> Self {
        Self::Mem(mem::MemStore::default())
    }

    /// Short name of the backend kind, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mem(_) => "mem",
            Self::Fs(_) => "fs",
            Self::Redb(_) => "redb",
        }
    }
}

impl From<mem::MemStore> for Backend {
    fn from(value: mem::MemStore) -> Self {
        Self::Mem(value)
    }
}

impl From<fs::FsStore> for Backend {
    fn from(value: fs::FsStore) -> Self {
        Self::Fs(value)
    }
}

impl From<redb::RedbStore> for Backend {
    fn from(value: redb::RedbStore) -> Self {
        Self::Redb(value)
    }
}

macro_rules! dispatch {
    ($self:ident, $store:ident => $expr:expr) => {
        match $self {
            Backend::Mem($store) => $expr,
            Backend::Fs($store) => $expr,
            Backend::Redb($store) => $expr,
        }
    };
}

impl ChunkStore for Backend {
    fn get(&self, stream: &StreamId, index: u64) -> Result<Option<Bytes>, BackendError> {
        dispatch!(self, s => s.get(stream, index))
    }

    fn put(&self, stream: &StreamId, index: u64, data: Bytes) -> Result<(), BackendError> {
        dispatch!(self, s => s.put(stream, index, data))
    }

    fn delete(&self, stream: &StreamId, index: u64) -> Result<(), BackendError> {
        dispatch!(self, s => s.delete(stream, index))
    }

    fn delete_from(&self, stream: &StreamId, from: u64) -> Result<u64, BackendError> {
        dispatch!(self, s => s.delete_from(stream, from))
    }
}

impl StateStore for Backend {
    fn load_state(&self, record: &RecordId) -> Result<Option<StreamState>, BackendError> {
        dispatch!(self, s => s.load_state(record))
    }

    fn create_state(&self, record: &RecordId, state: StreamState) -> Result<bool, BackendError> {
        dispatch!(self, s => s.create_state(record, state))
    }

    fn store_state(&self, record: &RecordId, state: StreamState) -> Result<(), BackendError> {
        dispatch!(self, s => s.store_state(record, state))
    }

    fn remove_record(&self, record: &RecordId) -> Result<bool, BackendError> {
        dispatch!(self, s => s.remove_record(record))
    }
}

/// Shared conformance tests, run against every backend.
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::chunk::StreamKind;

    fn stream(record: &str, kind: StreamKind) -> StreamId {
        StreamId::new(record.parse().unwrap(), kind)
    }

    pub(crate) fn check_chunk_store(store: &(impl ChunkStore + StateStore)) {
        let file = stream("r1", StreamKind::File);
        let checksum = stream("r1", StreamKind::Checksum);
        let other = stream("r2", StreamKind::File);

        assert_eq!(store.get(&file, 0).unwrap(), None);
        store.put(&file, 0, Bytes::from_static(b"abc")).unwrap();
        store.put(&file, 1, Bytes::new()).unwrap();
        assert_eq!(store.get(&file, 0).unwrap(), Some(Bytes::from_static(b"abc")));
        // an empty chunk is not an absent chunk
        assert_eq!(store.get(&file, 1).unwrap(), Some(Bytes::new()));
        assert_eq!(store.get(&checksum, 0).unwrap(), None);

        store.put(&file, 0, Bytes::from_static(b"xy")).unwrap();
        assert_eq!(store.get(&file, 0).unwrap(), Some(Bytes::from_static(b"xy")));

        store.delete(&file, 1).unwrap();
        store.delete(&file, 1).unwrap();
        assert_eq!(store.get(&file, 1).unwrap(), None);

        for i in 0..5 {
            store.put(&checksum, i, Bytes::from(vec![i as u8; 4])).unwrap();
            store.put(&other, i, Bytes::from(vec![i as u8; 4])).unwrap();
        }
        assert_eq!(store.delete_from(&checksum, 2).unwrap(), 3);
        assert_eq!(store.delete_from(&checksum, 2).unwrap(), 0);
        assert_eq!(store.get(&checksum, 1).unwrap(), Some(Bytes::from(vec![1u8; 4])));
        assert_eq!(store.get(&checksum, 2).unwrap(), None);
        assert_eq!(store.get(&checksum, 4).unwrap(), None);
        // other streams are untouched
        assert_eq!(store.get(&file, 0).unwrap(), Some(Bytes::from_static(b"xy")));
        assert_eq!(store.get(&other, 4).unwrap(), Some(Bytes::from(vec![4u8; 4])));
    }

    pub(crate) fn check_state_store(store: &(impl ChunkStore + StateStore)) {
        let r1: RecordId = "r1".parse().unwrap();
        let r2: RecordId = "r2".parse().unwrap();
        assert_eq!(store.load_state(&r1).unwrap(), None);
        assert!(store.create_state(&r1, StreamState::default()).unwrap());
        assert!(!store.create_state(&r1, StreamState::default()).unwrap());
        assert_eq!(store.load_state(&r1).unwrap(), Some(StreamState::default()));

        let state = StreamState {
            file_length: 10,
            checksum_length: 3,
            version: 7,
        };
        store.store_state(&r1, state).unwrap();
        assert_eq!(store.load_state(&r1).unwrap(), Some(state));

        assert!(store.create_state(&r2, StreamState::default()).unwrap());
        let f1 = StreamId::new(r1.clone(), StreamKind::File);
        let c1 = StreamId::new(r1.clone(), StreamKind::Checksum);
        let f2 = StreamId::new(r2.clone(), StreamKind::File);
        store.put(&f1, 0, Bytes::from_static(b"f")).unwrap();
        store.put(&c1, 3, Bytes::from_static(b"c")).unwrap();
        store.put(&f2, 0, Bytes::from_static(b"g")).unwrap();

        assert!(store.remove_record(&r1).unwrap());
        assert!(!store.remove_record(&r1).unwrap());
        assert_eq!(store.load_state(&r1).unwrap(), None);
        assert_eq!(store.get(&f1, 0).unwrap(), None);
        assert_eq!(store.get(&c1, 3).unwrap(), None);
        assert_eq!(store.get(&f2, 0).unwrap(), Some(Bytes::from_static(b"g")));
        assert!(store.load_state(&r2).unwrap().is_some());
    }

    #[test]
    fn backend_dispatch() {
        let backend = Backend::open(&BackendConfig::Mem).unwrap();
        assert_eq!(backend.name(), "mem");
        check_chunk_store(&backend);
    }
}
