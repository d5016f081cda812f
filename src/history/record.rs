//! Clipboard record types
//!
//! A record describes one clipboard snapshot. The payload itself never lives
//! in memory; it is stored by a [`FileStore`](crate::storage::FileStore)
//! under the record's id.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Opaque per-user key partitioning history and connections
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserKey(String);

impl UserKey {
    /// Create a new user key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-generated record identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generate a fresh random id
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for RecordId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| Error::InvalidRequest(format!("invalid record id '{}'", s)))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of clipboard content
///
/// On the wire the kind is its integer code: `Text = 0`, `File = 1`,
/// `FileList = 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClipboardKind {
    /// Plain text
    Text,
    /// A single file
    File,
    /// Multiple files
    FileList,
}

impl ClipboardKind {
    /// Check if this is text content
    pub fn is_text(&self) -> bool {
        matches!(self, ClipboardKind::Text)
    }

    /// Integer code used in JSON
    pub fn code(&self) -> u8 {
        match self {
            ClipboardKind::Text => 0,
            ClipboardKind::File => 1,
            ClipboardKind::FileList => 2,
        }
    }

    /// Kind for an integer code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ClipboardKind::Text),
            1 => Some(ClipboardKind::File),
            2 => Some(ClipboardKind::FileList),
            _ => None,
        }
    }
}

impl Serialize for ClipboardKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for ClipboardKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        ClipboardKind::from_code(code).ok_or_else(|| {
            serde::de::Error::custom(format!("unknown clipboard type code {}", code))
        })
    }
}

impl FromStr for ClipboardKind {
    type Err = Error;

    /// Parses the kind name case-insensitively (`text`, `File`, `FILELIST`, ...)
    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("text") {
            Ok(ClipboardKind::Text)
        } else if s.eq_ignore_ascii_case("file") {
            Ok(ClipboardKind::File)
        } else if s.eq_ignore_ascii_case("filelist") {
            Ok(ClipboardKind::FileList)
        } else {
            Err(Error::InvalidRequest(format!("unknown clipboard type '{}'", s)))
        }
    }
}

impl fmt::Display for ClipboardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClipboardKind::Text => f.write_str("Text"),
            ClipboardKind::File => f.write_str("File"),
            ClipboardKind::FileList => f.write_str("FileList"),
        }
    }
}

/// One clipboard snapshot
///
/// Immutable once created. Serializes in the camelCase form returned by the
/// HTTP API, `{"type": 0, "uuid": "...", "dataLength": 42}`, with
/// `dataLength: null` when unknown. Either key casing is accepted when
/// decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardRecord {
    /// Content kind
    #[serde(rename = "type", alias = "Type")]
    pub kind: ClipboardKind,

    /// Record identifier, also the payload's storage key
    #[serde(rename = "uuid", alias = "Uuid")]
    pub id: RecordId,

    /// Declared payload length in bytes
    #[serde(rename = "dataLength", alias = "DataLength", default)]
    pub data_length: Option<u64>,
}

/// Change notification pushed to peer devices, PascalCase keys
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Notification<'a> {
    #[serde(rename = "Type")]
    kind: ClipboardKind,
    uuid: &'a RecordId,
    data_length: Option<u64>,
}

impl ClipboardRecord {
    /// Create a record with a fresh id
    pub fn new(kind: ClipboardKind, data_length: Option<u64>) -> Self {
        Self::with_id(RecordId::new_v4(), kind, data_length)
    }

    /// Create a record with a known id
    pub fn with_id(id: RecordId, kind: ClipboardKind, data_length: Option<u64>) -> Self {
        Self {
            kind,
            id,
            data_length,
        }
    }

    /// Create a text record
    pub fn text(data_length: Option<u64>) -> Self {
        Self::new(ClipboardKind::Text, data_length)
    }

    /// Create a single-file record
    pub fn file(data_length: Option<u64>) -> Self {
        Self::new(ClipboardKind::File, data_length)
    }

    /// Create a file-list record
    pub fn file_list(data_length: Option<u64>) -> Self {
        Self::new(ClipboardKind::FileList, data_length)
    }

    /// Encode the change notification broadcast to peer connections
    ///
    /// `{"Type": 0, "Uuid": "...", "DataLength": 42}`
    pub fn to_notification(&self) -> Result<Bytes> {
        let notification = Notification {
            kind: self.kind,
            uuid: &self.id,
            data_length: self.data_length,
        };
        Ok(Bytes::from(serde_json::to_vec(&notification)?))
    }
}
