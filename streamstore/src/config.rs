//! Backend configuration.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which backend a store uses, and where it keeps its data.
///
/// In a config file this is a table with a `type` key:
///
/// ```toml
/// type = "redb"
/// path = "/var/lib/streamstore/chunks.redb"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Keep everything in memory.
    #[default]
    Mem,
    /// One file per chunk below a directory.
    Fs {
        /// Root directory.
        path: PathBuf,
    },
    /// A redb database file.
    Redb {
        /// Path to the database file.
        path: PathBuf,
    },
}
