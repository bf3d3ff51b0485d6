//! Optimistic concurrency control for write batches.
use snafu::ensure;

use crate::{
    error::{InvalidVersionSnafu, StoreError},
    state::StreamState,
};

/// Check a batch's expected version against the stored state.
///
/// A forced batch always passes. Otherwise the versions must match exactly.
pub fn check(stored: &StreamState, expected: u64, force: bool) -> Result<(), StoreError> {
    ensure!(
        force || stored.version == expected,
        InvalidVersionSnafu {
            expected,
            actual: stored.version,
        }
    );
    Ok(())
}

/// The state to commit after a batch, given the stored state and the
/// lengths the batch produced.
pub fn next_state(stored: &StreamState, lengths: &StreamState) -> StreamState {
    StreamState {
        file_length: lengths.file_length,
        checksum_length: lengths.checksum_length,
        version: stored.version + 1,
    }
}
