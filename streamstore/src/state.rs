//! Persisted per-record stream state.
use serde::{Deserialize, Serialize};

use crate::chunk::StreamKind;

/// Logical lengths of both streams of a record, plus the record version.
///
/// Created with both lengths 0 and version 0 when the record is created.
/// Mutated only by committed write batches, each of which increments the
/// version by exactly one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamState {
    /// Length of the file stream in bytes.
    pub file_length: u64,
    /// Length of the checksum stream in bytes.
    pub checksum_length: u64,
    /// Optimistic concurrency version.
    pub version: u64,
}

impl StreamState {
    /// Length of the given stream.
    pub fn len(&self, kind: StreamKind) -> u64 {
        match kind {
            StreamKind::File => self.file_length,
            StreamKind::Checksum => self.checksum_length,
        }
    }

    /// Mutable access to the length of the given stream.
    pub fn len_mut(&mut self, kind: StreamKind) -> &mut u64 {
        match kind {
            StreamKind::File => &mut self.file_length,
            StreamKind::Checksum => &mut self.checksum_length,
        }
    }

    /// Encode for storage.
    pub(crate) fn to_bytes(self) -> Vec<u8> {
        postcard::to_stdvec(&self).expect("postcard::to_stdvec is infallible")
    }

    /// Decode from storage.
    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_roundtrip() {
        let state = StreamState {
            file_length: 1 << 40,
            checksum_length: 17,
            version: 3,
        };
        assert_eq!(StreamState::from_bytes(&state.to_bytes()).unwrap(), state);
        assert!(StreamState::from_bytes(&[]).is_err());
    }

    #[test]
    fn per_kind_access() {
        let mut state = StreamState::default();
        *state.len_mut(StreamKind::Checksum) = 5;
        assert_eq!(state.len(StreamKind::File), 0);
        assert_eq!(state.len(StreamKind::Checksum), 5);
    }

    #[test]
    fn json_field_names() {
        let json = serde_json::to_value(StreamState::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"fileLength": 0, "checksumLength": 0, "version": 0})
        );
    }
}
