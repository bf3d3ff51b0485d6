//! Chunked random-write byte streams.
//!
//! A record owns two independent byte streams, the *file* stream and the
//! *checksum* stream. Each stream is stored as fixed size chunks of
//! [`CHUNK_SIZE`] bytes in a pluggable [`ChunkStore`]. Streams are mutated by
//! [`WriteBatch`]es of arbitrary-offset writes, appends and truncations, and
//! read back by byte range.
//!
//! Chunks that have no backing record read as zeros, so writing past the end
//! of a stream leaves a sparse gap that costs no storage.
//!
//! The main entry point is the [`Store`] handle:
//!
//! ```no_run
//! # async fn wrapper() -> n0_snafu::Result {
//! use streamstore::{
//!     Backend, ReadRange, RecordId, Store, StreamKind, WriteBatch, WriteOperation,
//! };
//!
//! let store = Store::new(Backend::memory());
//! let record: RecordId = "doc-1".parse()?;
//! store.create(record.clone(), None).await?;
//! let batch = WriteBatch::new(record.clone(), 0)
//!     .with(WriteOperation::append(StreamKind::File, &b"hello"[..]));
//! let state = store.write(batch).await?;
//! assert_eq!(state.version, 1);
//! let data = store.read(record, ReadRange::All).await?;
//! assert_eq!(&data[..], b"hello");
//! # Ok(())
//! # }
//! ```
#![deny(missing_docs, rustdoc::broken_intra_doc_links)]
#![cfg_attr(streamstore_docsrs, feature(doc_auto_cfg))]

pub mod applier;
pub mod backend;
pub mod chunk;
pub mod compositor;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod ops;
pub mod reader;
pub mod record;
pub mod state;
pub mod store;

pub use self::{
    backend::{Backend, ChunkStore, StateStore},
    chunk::{CHUNK_SIZE, StreamId, StreamKind},
    config::BackendConfig,
    error::{BackendError, StoreError},
    ops::{InitialContent, ReadRange, WriteBatch, WriteOperation, WritePos},
    record::RecordId,
    state::StreamState,
    store::Store,
};
