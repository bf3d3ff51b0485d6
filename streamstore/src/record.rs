//! Record identifiers.
use std::{fmt, str::FromStr, sync::Arc};

use nested_enum_utils::common_fields;
use serde::{Deserialize, Serialize, de};
use snafu::{Backtrace, Snafu, ensure};

/// Maximum length of a record id in bytes.
pub const MAX_RECORD_ID_LEN: usize = 128;

/// Identifier of a storage record, the owner of one file and one checksum stream.
///
/// Record ids are used as directory names and as table keys, so they are
/// restricted to ASCII alphanumerics, `-` and `_`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(Arc<str>);

/// Error when parsing a [`RecordId`].
#[common_fields({
    backtrace: Option<Backtrace>,
    #[snafu(implicit)]
    span_trace: n0_snafu::SpanTrace,
})]
#[allow(missing_docs)]
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum InvalidRecordId {
    #[snafu(display("record id is empty"))]
    Empty {},
    #[snafu(display("record id is longer than {MAX_RECORD_ID_LEN} bytes"))]
    TooLong {},
    #[snafu(display("record id contains invalid character {c:?}"))]
    Character { c: char },
}

impl RecordId {
    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RecordId {
    type Err = InvalidRecordId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ensure!(!s.is_empty(), EmptySnafu);
        ensure!(s.len() <= MAX_RECORD_ID_LEN, TooLongSnafu);
        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(CharacterSnafu { c }.build());
        }
        Ok(Self(s.into()))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for RecordId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
