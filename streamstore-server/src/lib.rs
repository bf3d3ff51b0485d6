//! An HTTP server exposing chunked random-write byte streams

#![deny(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod api;
pub mod config;
pub mod http;
pub mod metrics;
pub mod server;
pub mod state;
