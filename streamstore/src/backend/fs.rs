//! File system backend.
//!
//! Every record gets a directory below the root. Inside it, each stream has a
//! directory with one file per chunk, and the record state is kept in a small
//! postcard encoded file:
//!
//! ```text
//! <root>/<record>/state
//! <root>/<record>/file/<index>.chunk
//! <root>/<record>/checksum/<index>.chunk
//! ```
//!
//! Files are written to a temporary name, synced and then renamed into place,
//! so a chunk or state file is either fully old or fully new.
use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

use bytes::Bytes;
use snafu::ResultExt;
use tracing::{debug, trace};

use super::{ChunkStore, StateStore};
use crate::{
    chunk::StreamId,
    error::{BackendError, EncodingSnafu},
    record::RecordId,
    state::StreamState,
};

const CHUNK_EXTENSION: &str = "chunk";
const TEMP_EXTENSION: &str = "temp";
const STATE_FILE_NAME: &str = "state";

/// A backend storing one file per chunk below a root directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    /// Path to the root of the storage on disk.
    root: PathBuf,
}

impl FsStore {
    /// Creates or opens a store at the provided path as the root.
    pub fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        debug!("opened fs chunk store at {}", root.display());
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_dir(&self, record: &RecordId) -> PathBuf {
        self.root.join(record.as_str())
    }

    fn stream_dir(&self, stream: &StreamId) -> PathBuf {
        self.record_dir(&stream.record).join(stream.kind.as_str())
    }

    fn chunk_path(&self, stream: &StreamId, index: u64) -> PathBuf {
        self.stream_dir(stream)
            .join(format!("{index}.{CHUNK_EXTENSION}"))
    }

    fn state_path(&self, record: &RecordId) -> PathBuf {
        self.record_dir(record).join(STATE_FILE_NAME)
    }
}

/// Parse a chunk file name of the form `<index>.chunk`.
fn index_from_path(path: &Path) -> Option<u64> {
    if path.extension()? != CHUNK_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

/// Write `data` to `path` by way of a synced temporary file.
fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let temp = path.with_extension(TEMP_EXTENSION);
    let mut file = File::create(&temp)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&temp, path)
}

/// Read a file, mapping "not found" to `None`.
fn read_opt(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Remove a file, ignoring "not found".
fn remove_opt(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

impl ChunkStore for FsStore {
    fn get(&self, stream: &StreamId, index: u64) -> Result<Option<Bytes>, BackendError> {
        let path = self.chunk_path(stream, index);
        Ok(read_opt(&path)?.map(Bytes::from))
    }

    fn put(&self, stream: &StreamId, index: u64, data: Bytes) -> Result<(), BackendError> {
        let dir = self.stream_dir(stream);
        fs::create_dir_all(&dir)?;
        let path = self.chunk_path(stream, index);
        trace!("writing {} bytes to {}", data.len(), path.display());
        write_atomic(&path, &data)?;
        Ok(())
    }

    fn delete(&self, stream: &StreamId, index: u64) -> Result<(), BackendError> {
        remove_opt(&self.chunk_path(stream, index))?;
        Ok(())
    }

    fn delete_from(&self, stream: &StreamId, from: u64) -> Result<u64, BackendError> {
        let entries = match fs::read_dir(self.stream_dir(stream)) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        let mut deleted = 0;
        for entry in entries {
            let path = entry?.path();
            match index_from_path(&path) {
                Some(index) if index >= from => {
                    if remove_opt(&path)? {
                        deleted += 1;
                    }
                }
                _ => {}
            }
        }
        Ok(deleted)
    }
}

impl StateStore for FsStore {
    fn load_state(&self, record: &RecordId) -> Result<Option<StreamState>, BackendError> {
        let Some(bytes) = read_opt(&self.state_path(record))? else {
            return Ok(None);
        };
        let state = StreamState::from_bytes(&bytes).context(EncodingSnafu)?;
        Ok(Some(state))
    }

    fn create_state(&self, record: &RecordId, state: StreamState) -> Result<bool, BackendError> {
        let path = self.state_path(record);
        if path.exists() {
            return Ok(false);
        }
        fs::create_dir_all(self.record_dir(record))?;
        write_atomic(&path, &state.to_bytes())?;
        Ok(true)
    }

    fn store_state(&self, record: &RecordId, state: StreamState) -> Result<(), BackendError> {
        fs::create_dir_all(self.record_dir(record))?;
        write_atomic(&self.state_path(record), &state.to_bytes())?;
        Ok(())
    }

    fn remove_record(&self, record: &RecordId) -> Result<bool, BackendError> {
        let existed = self.state_path(record).exists();
        match fs::remove_dir_all(self.record_dir(record)) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;
    use crate::{
        backend::tests::{check_chunk_store, check_state_store},
        chunk::StreamKind,
    };

    #[test]
    fn chunk_store() -> TestResult {
        let dir = tempfile::tempdir()?;
        check_chunk_store(&FsStore::open(dir.path())?);
        Ok(())
    }

    #[test]
    fn state_store() -> TestResult {
        let dir = tempfile::tempdir()?;
        check_state_store(&FsStore::open(dir.path())?);
        Ok(())
    }

    #[test]
    fn layout_on_disk() -> TestResult {
        let dir = tempfile::tempdir()?;
        let store = FsStore::open(dir.path().join("nested"))?;
        let record: RecordId = "rec".parse()?;
        store.create_state(&record, StreamState::default())?;
        let stream = StreamId::new(record, StreamKind::Checksum);
        store.put(&stream, 12, Bytes::from_static(b"x"))?;
        let root = store.root();
        assert!(root.join("rec").join("state").is_file());
        assert_eq!(fs::read(root.join("rec/checksum/12.chunk"))?, b"x");
        assert!(!root.join("rec/checksum/12.temp").exists());
        Ok(())
    }

    #[test]
    fn stray_files_are_ignored() -> TestResult {
        let dir = tempfile::tempdir()?;
        let store = FsStore::open(dir.path())?;
        let stream = StreamId::new("rec".parse()?, StreamKind::File);
        store.put(&stream, 0, Bytes::from_static(b"a"))?;
        store.put(&stream, 3, Bytes::from_static(b"b"))?;
        let stream_dir = dir.path().join("rec/file");
        fs::write(stream_dir.join("5.temp"), b"partial")?;
        fs::write(stream_dir.join("notes.txt"), b"")?;
        assert_eq!(store.delete_from(&stream, 1)?, 1);
        assert!(stream_dir.join("5.temp").exists());
        assert_eq!(store.get(&stream, 0)?, Some(Bytes::from_static(b"a")));
        Ok(())
    }

    #[test]
    fn corrupt_state_is_an_error() -> TestResult {
        let dir = tempfile::tempdir()?;
        let store = FsStore::open(dir.path())?;
        let record: RecordId = "rec".parse()?;
        fs::create_dir_all(dir.path().join("rec"))?;
        fs::write(dir.path().join("rec/state"), b"")?;
        assert!(matches!(
            store.load_state(&record),
            Err(BackendError::Encoding { .. })
        ));
        Ok(())
    }
}
