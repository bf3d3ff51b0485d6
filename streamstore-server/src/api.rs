//! JSON request types of the HTTP API.
//!
//! Binary payloads are carried as standard base64 strings.
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use streamstore::{InitialContent, ReadRange, StreamKind, WriteOperation, WritePos};

/// Body of `PUT /records/{id}`. Both fields are optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateRecordRequest {
    /// Initial file stream content.
    #[serde(default, with = "b64")]
    pub file: Bytes,
    /// Initial checksum stream content.
    #[serde(default, with = "b64")]
    pub checksum: Bytes,
}

impl From<CreateRecordRequest> for InitialContent {
    fn from(value: CreateRecordRequest) -> Self {
        Self {
            file: value.file,
            checksum: value.checksum,
        }
    }
}

/// Body of `POST /records/{id}/write`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteFileRequest {
    /// The version the client expects the record to have.
    pub version: u64,
    /// Write even if the version does not match.
    #[serde(default)]
    pub force: bool,
    /// The operations, applied in order.
    pub operations: Vec<WriteFileOperation>,
}

/// A single operation of a [`WriteFileRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteFileOperation {
    /// The stream to write to.
    #[serde(rename = "type")]
    pub kind: StreamKind,
    /// The payload.
    #[serde(default, with = "b64")]
    pub data: Bytes,
    /// Absolute offset, or `-1` to append.
    pub pos: i64,
    /// Cut the stream at the end of this write.
    #[serde(default)]
    pub truncate: bool,
}

impl WriteFileOperation {
    /// Convert to a store operation.
    ///
    /// Returns `None` for a negative position other than `-1`.
    pub fn into_operation(self) -> Option<WriteOperation> {
        let pos = WritePos::from_wire(self.pos)?;
        Some(WriteOperation {
            kind: self.kind,
            data: self.data,
            pos,
            truncate: self.truncate,
        })
    }
}

/// Body of `POST /records/{id}/read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadFileRequest {
    /// What to read.
    pub range: ReadRange,
}

/// Serialize [`Bytes`] as base64 strings.
mod b64 {
    use bytes::Bytes;
    use data_encoding::BASE64;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(data: &Bytes, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&BASE64.encode(data))
    }

    pub fn deserialize<'de, D>(de: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(de)?;
        BASE64
            .decode(s.as_bytes())
            .map(Bytes::from)
            .map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_request_json() {
        let req: WriteFileRequest = serde_json::from_str(
            r#"{
                "version": 3,
                "operations": [
                    {"type": "file", "data": "aGVsbG8=", "pos": -1},
                    {"type": "checksum", "pos": 4, "truncate": true}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(req.version, 3);
        assert!(!req.force);
        let ops: Vec<_> = req
            .operations
            .into_iter()
            .map(|op| op.into_operation().unwrap())
            .collect();
        assert_eq!(ops[0], WriteOperation::append(StreamKind::File, &b"hello"[..]));
        assert_eq!(ops[1], WriteOperation::truncate(StreamKind::Checksum, 4));
    }

    #[test]
    fn negative_pos_is_invalid() {
        let op = WriteFileOperation {
            kind: StreamKind::File,
            data: Bytes::new(),
            pos: -2,
            truncate: false,
        };
        assert!(op.into_operation().is_none());
    }

    #[test]
    fn bad_base64_is_rejected() {
        let res = serde_json::from_str::<CreateRecordRequest>(r#"{"file": "not base64!"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn create_request_roundtrip() {
        let req = CreateRecordRequest {
            file: Bytes::from_static(b"\x00\x01\xff"),
            checksum: Bytes::new(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, serde_json::json!({"file": "AAH/", "checksum": ""}));
    }
}
