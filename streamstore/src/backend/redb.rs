//! redb backed storage.
//!
//! Chunks are rows of a single table keyed by `(record, stream tag, chunk
//! index)`, so all chunks of a stream are adjacent and `delete_from` is a
//! range scan. Record state lives in a second table, postcard encoded.
//!
//! Every call is its own write transaction.
use std::path::Path;

use bytes::Bytes;
use redb::{Database, ReadableTable, TableDefinition, backends::InMemoryBackend};
use snafu::ResultExt;
use tracing::info;

use super::{ChunkStore, StateStore};
use crate::{
    chunk::{StreamId, StreamKind},
    error::{BackendError, EncodingSnafu},
    record::RecordId,
    state::StreamState,
};

type ChunkKey<'a> = (&'a str, u8, u64);

const CHUNKS_TABLE: TableDefinition<ChunkKey<'static>, &[u8]> = TableDefinition::new("chunks-1");

const RECORDS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("records-1");

/// A backend storing chunks and record state in a redb database.
#[derive(Debug)]
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create a database file at `path`.
    pub fn persistent(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let path = path.as_ref();
        info!("loading chunk database from {}", path.display());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::builder().create(path)?;
        Self::open(db)
    }

    /// Create a database that lives only in memory.
    pub fn in_memory() -> Result<Self, BackendError> {
        info!("using in-memory chunk database");
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::open(db)
    }

    /// Wrap an existing database, creating the tables if needed.
    pub fn open(db: Database) -> Result<Self, BackendError> {
        let write_tx = db.begin_write()?;
        {
            let _chunks = write_tx.open_table(CHUNKS_TABLE)?;
            let _records = write_tx.open_table(RECORDS_TABLE)?;
        }
        write_tx.commit()?;
        Ok(Self { db })
    }
}

fn chunk_key(stream: &StreamId, index: u64) -> ChunkKey<'_> {
    (stream.record.as_str(), stream.kind.tag(), index)
}

/// Indices of all chunks of `stream` at or above `from`.
fn indices_from(
    table: &impl ReadableTable<ChunkKey<'static>, &'static [u8]>,
    stream: &StreamId,
    from: u64,
) -> Result<Vec<u64>, BackendError> {
    let mut indices = Vec::new();
    for item in table.range(chunk_key(stream, from)..=chunk_key(stream, u64::MAX))? {
        let (key, _) = item?;
        indices.push(key.value().2);
    }
    Ok(indices)
}

impl ChunkStore for RedbStore {
    fn get(&self, stream: &StreamId, index: u64) -> Result<Option<Bytes>, BackendError> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(CHUNKS_TABLE)?;
        let Some(row) = table.get(chunk_key(stream, index))? else {
            return Ok(None);
        };
        Ok(Some(Bytes::copy_from_slice(row.value())))
    }

    fn put(&self, stream: &StreamId, index: u64, data: Bytes) -> Result<(), BackendError> {
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(CHUNKS_TABLE)?;
            table.insert(chunk_key(stream, index), &data[..])?;
        }
        tx.commit()?;
        Ok(())
    }

    fn delete(&self, stream: &StreamId, index: u64) -> Result<(), BackendError> {
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(CHUNKS_TABLE)?;
            table.remove(chunk_key(stream, index))?;
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_from(&self, stream: &StreamId, from: u64) -> Result<u64, BackendError> {
        let tx = self.db.begin_write()?;
        let deleted = {
            let mut table = tx.open_table(CHUNKS_TABLE)?;
            let indices = indices_from(&table, stream, from)?;
            for index in &indices {
                table.remove(chunk_key(stream, *index))?;
            }
            indices.len() as u64
        };
        tx.commit()?;
        Ok(deleted)
    }
}

impl StateStore for RedbStore {
    fn load_state(&self, record: &RecordId) -> Result<Option<StreamState>, BackendError> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(RECORDS_TABLE)?;
        let Some(row) = table.get(record.as_str())? else {
            return Ok(None);
        };
        let state = StreamState::from_bytes(row.value()).context(EncodingSnafu)?;
        Ok(Some(state))
    }

    fn create_state(&self, record: &RecordId, state: StreamState) -> Result<bool, BackendError> {
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(RECORDS_TABLE)?;
            if table.get(record.as_str())?.is_some() {
                return Ok(false);
            }
            table.insert(record.as_str(), &state.to_bytes()[..])?;
        }
        tx.commit()?;
        Ok(true)
    }

    fn store_state(&self, record: &RecordId, state: StreamState) -> Result<(), BackendError> {
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(RECORDS_TABLE)?;
            table.insert(record.as_str(), &state.to_bytes()[..])?;
        }
        tx.commit()?;
        Ok(())
    }

    fn remove_record(&self, record: &RecordId) -> Result<bool, BackendError> {
        let tx = self.db.begin_write()?;
        let existed = {
            let mut records = tx.open_table(RECORDS_TABLE)?;
            let existed = records.remove(record.as_str())?.is_some();
            let mut chunks = tx.open_table(CHUNKS_TABLE)?;
            for kind in StreamKind::ALL {
                let stream = StreamId::new(record.clone(), kind);
                for index in indices_from(&chunks, &stream, 0)? {
                    chunks.remove(chunk_key(&stream, index))?;
                }
            }
            existed
        };
        tx.commit()?;
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;
    use crate::backend::tests::{check_chunk_store, check_state_store};

    #[test]
    fn chunk_store() -> TestResult {
        check_chunk_store(&RedbStore::in_memory()?);
        Ok(())
    }

    #[test]
    fn state_store() -> TestResult {
        check_state_store(&RedbStore::in_memory()?);
        Ok(())
    }

    #[test]
    fn persists_across_reopen() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("data").join("chunks.redb");
        let record: RecordId = "rec".parse()?;
        let stream = StreamId::new(record.clone(), StreamKind::File);
        let state = StreamState {
            file_length: 3,
            checksum_length: 0,
            version: 1,
        };
        {
            let store = RedbStore::persistent(&path)?;
            store.create_state(&record, state)?;
            store.put(&stream, 0, Bytes::from_static(b"abc"))?;
        }
        let store = RedbStore::persistent(&path)?;
        assert_eq!(store.load_state(&record)?, Some(state));
        assert_eq!(store.get(&stream, 0)?, Some(Bytes::from_static(b"abc")));
        Ok(())
    }

    #[test]
    fn records_with_common_prefix_are_separate() -> TestResult {
        let store = RedbStore::in_memory()?;
        let a = StreamId::new("a".parse()?, StreamKind::File);
        let ab = StreamId::new("ab".parse()?, StreamKind::File);
        store.put(&a, 1, Bytes::from_static(b"1"))?;
        store.put(&ab, 1, Bytes::from_static(b"2"))?;
        assert_eq!(store.delete_from(&a, 0)?, 1);
        assert_eq!(store.get(&ab, 1)?, Some(Bytes::from_static(b"2")));
        Ok(())
    }
}
