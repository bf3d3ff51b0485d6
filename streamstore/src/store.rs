//! The async store handle.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use snafu::ResultExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{
    backend::Backend,
    config::BackendConfig,
    engine::{self, Committed},
    error::{BackendError, JoinSnafu, StoreError},
    metrics::Metrics,
    ops::{InitialContent, ReadRange, WriteBatch},
    record::RecordId,
    state::StreamState,
};

/// A handle to a chunked stream store.
///
/// Cheap to clone. Operations on the same record are serialized: write
/// batches, creation and deletion take an exclusive lock on the record,
/// reads and stats take a shared one. Operations on different records run
/// concurrently.
///
/// Backend work runs on tokio's blocking thread pool. Once started, an
/// operation runs to completion even if the returned future is dropped.
#[derive(Debug, Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    backend: Backend,
    locks: Mutex<HashMap<RecordId, Arc<RwLock<()>>>>,
    metrics: Arc<Metrics>,
}

impl Store {
    /// Create a store on top of a backend.
    pub fn new(backend: Backend) -> Self {
        debug!(backend = backend.name(), "creating store");
        Self {
            inner: Arc::new(Inner {
                backend,
                locks: Default::default(),
                metrics: Default::default(),
            }),
        }
    }

    /// Open the backend described by `config` and create a store on top.
    pub fn open(config: &BackendConfig) -> Result<Self, BackendError> {
        Ok(Self::new(Backend::open(config)?))
    }

    /// The backend of this store.
    pub fn backend(&self) -> &Backend {
        &self.inner.backend
    }

    /// Metrics collected by this store.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.inner.metrics
    }

    /// Create a record with both streams empty, or filled with `initial`.
    ///
    /// Fails with [`StoreError::RecordExists`] if the record exists.
    pub async fn create(
        &self,
        record: RecordId,
        initial: Option<InitialContent>,
    ) -> Result<StreamState, StoreError> {
        let committed = self
            .exclusive(record, move |backend, record| {
                engine::create(backend, record, initial.as_ref())
            })
            .await?;
        let metrics = &self.inner.metrics;
        metrics.records_created.inc();
        self.record_stats(&committed);
        Ok(committed.state)
    }

    /// Apply a write batch and return the committed state.
    ///
    /// Fails with [`StoreError::InvalidVersion`] if the batch is not forced
    /// and its expected version differs from the stored one. In that case
    /// nothing was changed.
    pub async fn write(&self, batch: WriteBatch) -> Result<StreamState, StoreError> {
        let ops = batch.operations.len() as u64;
        let record = batch.record.clone();
        let res = self
            .exclusive(record.clone(), move |backend, _| {
                engine::write(backend, &batch)
            })
            .await;
        let metrics = &self.inner.metrics;
        match res {
            Ok(committed) => {
                metrics.batches_committed.inc();
                metrics.operations_applied.inc_by(ops);
                self.record_stats(&committed);
                Ok(committed.state)
            }
            Err(err) => {
                if let StoreError::InvalidVersion {
                    expected, actual, ..
                } = &err
                {
                    warn!(%record, expected, actual, "rejected batch");
                    metrics.batches_rejected.inc();
                }
                Err(err)
            }
        }
    }

    /// Read a range of one of the streams of a record.
    pub async fn read(&self, record: RecordId, range: ReadRange) -> Result<Bytes, StoreError> {
        let data = self
            .shared(record, move |backend, record| {
                engine::read(backend, record, range)
            })
            .await?;
        let metrics = &self.inner.metrics;
        metrics.reads.inc();
        metrics.bytes_read.inc_by(data.len() as u64);
        Ok(data)
    }

    /// The current state of a record.
    pub async fn stat(&self, record: RecordId) -> Result<StreamState, StoreError> {
        self.shared(record, |backend, record| engine::stat(backend, record))
            .await
    }

    /// Delete a record and all of its chunks.
    pub async fn delete(&self, record: RecordId) -> Result<(), StoreError> {
        self.exclusive(record, |backend, record| engine::delete(backend, record))
            .await?;
        self.inner.metrics.records_deleted.inc();
        Ok(())
    }

    fn record_stats(&self, committed: &Committed) {
        let metrics = &self.inner.metrics;
        metrics.bytes_written.inc_by(committed.stats.bytes_written);
        metrics.chunks_written.inc_by(committed.stats.chunks_written);
        metrics.chunks_deleted.inc_by(committed.stats.chunks_deleted);
    }

    /// Run `f` on a blocking thread while holding the record's write lock.
    async fn exclusive<T, F>(&self, record: RecordId, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Backend, &RecordId) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let guard = self.lock(&record).write_owned().await;
        let inner = self.inner.clone();
        let res = tokio::task::spawn_blocking(move || {
            let res = f(&inner.backend, &record);
            drop(guard);
            res
        })
        .await
        .context(JoinSnafu);
        self.prune_locks();
        res?
    }

    /// Run `f` on a blocking thread while holding the record's read lock.
    async fn shared<T, F>(&self, record: RecordId, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Backend, &RecordId) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let guard = self.lock(&record).read_owned().await;
        let inner = self.inner.clone();
        let res = tokio::task::spawn_blocking(move || {
            let res = f(&inner.backend, &record);
            drop(guard);
            res
        })
        .await
        .context(JoinSnafu);
        self.prune_locks();
        res?
    }

    fn lock(&self, record: &RecordId) -> Arc<RwLock<()>> {
        let mut locks = self.inner.locks.lock().expect("poisoned");
        locks.entry(record.clone()).or_default().clone()
    }

    /// Forget locks nobody holds or waits for.
    fn prune_locks(&self) {
        let mut locks = self.inner.locks.lock().expect("poisoned");
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;
    use crate::{chunk::StreamKind, ops::WriteOperation};

    #[tokio::test]
    async fn lifecycle_and_metrics() -> TestResult {
        let store = Store::new(Backend::memory());
        let record: RecordId = "rec".parse()?;
        store.create(record.clone(), None).await?;
        let batch = WriteBatch::new(record.clone(), 0)
            .with(WriteOperation::append(StreamKind::File, &b"hello"[..]));
        let state = store.write(batch).await?;
        assert_eq!(state.version, 1);
        assert_eq!(&store.read(record.clone(), ReadRange::All).await?[..], b"hello");

        let stale = WriteBatch::new(record.clone(), 0);
        assert!(store.write(stale).await.is_err());
        store.delete(record.clone()).await?;
        assert_eq!(
            store.stat(record).await.unwrap_err().code(),
            "RECORD_NOT_FOUND"
        );

        let metrics = store.metrics();
        assert_eq!(metrics.records_created.get(), 1);
        assert_eq!(metrics.batches_committed.get(), 1);
        assert_eq!(metrics.batches_rejected.get(), 1);
        assert_eq!(metrics.operations_applied.get(), 1);
        assert_eq!(metrics.bytes_written.get(), 5);
        assert_eq!(metrics.reads.get(), 1);
        assert_eq!(metrics.bytes_read.get(), 5);
        assert_eq!(metrics.records_deleted.get(), 1);
        // the chunk went away with its record
        assert_eq!(metrics.chunks_written.get(), 1);
        assert_eq!(metrics.chunks_deleted.get(), 0);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_are_serialized() -> TestResult {
        let store = Store::new(Backend::memory());
        let record: RecordId = "rec".parse()?;
        store.create(record.clone(), None).await?;
        let mut tasks = Vec::new();
        for i in 0..16u8 {
            let store = store.clone();
            let record = record.clone();
            tasks.push(tokio::spawn(async move {
                let batch = WriteBatch::new(record, 0)
                    .force(true)
                    .with(WriteOperation::append(StreamKind::File, vec![i; 10]));
                store.write(batch).await
            }));
        }
        let mut versions = Vec::new();
        for task in tasks {
            versions.push(task.await??.version);
        }
        versions.sort_unstable();
        assert_eq!(versions, (1..=16).collect::<Vec<u64>>());
        let state = store.stat(record.clone()).await?;
        assert_eq!(state.file_length, 160);
        // every append landed as a contiguous run of its own byte
        let data = store.read(record, ReadRange::All).await?;
        for run in data.chunks(10) {
            assert!(run.iter().all(|b| *b == run[0]));
        }
        Ok(())
    }

    #[tokio::test]
    async fn locks_are_pruned() -> TestResult {
        let store = Store::new(Backend::memory());
        for i in 0..8 {
            let record: RecordId = format!("rec-{i}").parse()?;
            store.create(record.clone(), None).await?;
            store.stat(record).await?;
        }
        assert!(store.inner.locks.lock().unwrap().is_empty());
        Ok(())
    }
}
