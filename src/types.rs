//! # Domain Types for sealbatch
//!
//! This module defines the core types used throughout the engine: records,
//! digests, identifiers and batch numbering.
//!
//! ## Design Philosophy: Newtypes for Safety
//!
//! As elsewhere in the crate, primitive values are wrapped in single-field
//! structs:
//!
//! - **Type safety**: a [`ChannelId`] cannot be passed where a
//!   [`ParticipantId`] is expected
//! - **Self-documenting code**: signatures say what they expect
//! - **Encapsulation**: validation lives in one place ([`crate::codec`])
//!
//! ## Closed Record Schema
//!
//! Records arriving as JSON are decoded through [`Record::from_json`], which
//! only accepts the tagged variants listed in [`RecordKind`]. Unknown tags and
//! unknown fields are rejected instead of being coerced into a record.
//!
//! ```rust
//! use sealbatch::types::{Record, RecordKind};
//!
//! let json = r#"{
//!     "type": "participant_joined",
//!     "channel": "general",
//!     "sender": "alice",
//!     "payload": "sha256:9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08",
//!     "created_ms": 1700000000000
//! }"#;
//!
//! let record = Record::from_json(json).unwrap();
//! assert_eq!(record.kind(), RecordKind::ParticipantJoined);
//! ```

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

// =============================================================================
// Digest
// =============================================================================

/// Size of every digest produced by the engine, in bytes.
pub const DIGEST_LEN: usize = 32;

/// A fixed-length SHA-256 digest.
///
/// Digests identify records (leaves), Merkle nodes and roots. They display
/// and serialize as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Wraps raw digest bytes.
    pub const fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Returns the digest as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::InvalidRecord {
            field: "digest",
            reason: format!("is not valid hex: {}", e),
        })?;
        let bytes: [u8; DIGEST_LEN] = bytes.try_into().map_err(|v: Vec<u8>| Error::InvalidRecord {
            field: "digest",
            reason: format!("must be {} bytes (got {})", DIGEST_LEN, v.len()),
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl From<[u8; DIGEST_LEN]> for Digest {
    fn from(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Identifiers
// =============================================================================

/// Identifier of the channel a record belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelId(String);

impl ChannelId {
    /// Creates a channel id. Validation happens at canonicalization time.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ChannelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of the sender of a message or the subject of a participant event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A content address pointing at payload bytes held in an external blob store.
///
/// Records never embed raw payload bytes. Accepted forms (checked by
/// [`crate::codec::canonical_payload_ref`]):
///
/// - a SHA-256 content hash as 64 lowercase hex characters, optionally
///   prefixed with `sha256:`
/// - an IPFS CIDv0 (`Qm...`, base58, 46 characters)
/// - an IPFS CIDv1 in base32 (`b...`, 59 characters)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentRef(String);

impl ContentRef {
    /// Wraps a content address without validating it.
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Builds the `sha256:` form of a content hash.
    pub fn from_sha256(digest: &Digest) -> Self {
        Self(format!("sha256:{}", digest.to_hex()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// =============================================================================
// Record Kinds
// =============================================================================

/// Sub-type of a channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Data,
    Command,
    Response,
}

impl MessageType {
    /// Stable tag written into the canonical encoding.
    pub fn tag(self) -> u8 {
        match self {
            MessageType::Text => 1,
            MessageType::Data => 2,
            MessageType::Command => 3,
            MessageType::Response => 4,
        }
    }
}

/// The closed set of record variants the engine accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// A message posted to a channel.
    ChannelMessage(MessageType),
    /// A participant joined the channel.
    ParticipantJoined,
    /// A participant left the channel.
    ParticipantLeft,
    /// A participant updated their metadata (the payload points at it).
    ParticipantMetadata,
}

impl RecordKind {
    /// Stable tag written into the canonical encoding.
    ///
    /// These values are part of every committed digest. Never renumber.
    pub fn tag(self) -> u8 {
        match self {
            RecordKind::ChannelMessage(_) => 1,
            RecordKind::ParticipantJoined => 2,
            RecordKind::ParticipantLeft => 3,
            RecordKind::ParticipantMetadata => 4,
        }
    }

    /// Message sub-type tag, or 0 for participant events.
    pub fn sub_tag(self) -> u8 {
        match self {
            RecordKind::ChannelMessage(message_type) => message_type.tag(),
            _ => 0,
        }
    }
}

// =============================================================================
// Record
// =============================================================================

/// A channel message or participant event.
///
/// Fields are private: a record is immutable once created. The reply-to link
/// is a weak back-reference (the digest of another record) and carries no
/// ownership; the referenced record may live in another batch or nowhere.
///
/// # Example
///
/// ```rust
/// use sealbatch::types::{ContentRef, MessageType, Record, RecordKind};
///
/// let record = Record::new(
///     RecordKind::ChannelMessage(MessageType::Text),
///     "general",
///     "alice",
///     ContentRef::new("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG"),
///     1_700_000_000_000,
/// );
/// assert_eq!(record.channel().as_str(), "general");
/// assert!(record.reply_to().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireRecord", into = "WireRecord")]
pub struct Record {
    kind: RecordKind,
    channel: ChannelId,
    sender: ParticipantId,
    payload: ContentRef,
    created_ms: u64,
    reply_to: Option<Digest>,
}

impl Record {
    /// Creates a record without a reply-to link.
    pub fn new(
        kind: RecordKind,
        channel: impl Into<ChannelId>,
        sender: impl Into<ParticipantId>,
        payload: ContentRef,
        created_ms: u64,
    ) -> Self {
        Self {
            kind,
            channel: channel.into(),
            sender: sender.into(),
            payload,
            created_ms,
            reply_to: None,
        }
    }

    /// Returns this record with a reply-to link to the record with `digest`.
    pub fn with_reply_to(mut self, digest: Digest) -> Self {
        self.reply_to = Some(digest);
        self
    }

    /// Decodes a record from JSON through the closed record schema.
    ///
    /// # Errors
    ///
    /// `Error::InvalidRecord` for unknown `type` tags, unknown fields, missing
    /// fields, or a message type on a participant event.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidRecord {
            field: "json",
            reason: e.to_string(),
        })
    }

    /// Encodes the record as JSON in the same schema [`Record::from_json`] reads.
    ///
    /// # Errors
    ///
    /// `Error::InvalidRecord` if the record does not fit the wire schema.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidRecord {
            field: "json",
            reason: e.to_string(),
        })
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    pub fn sender(&self) -> &ParticipantId {
        &self.sender
    }

    pub fn payload(&self) -> &ContentRef {
        &self.payload
    }

    pub fn created_ms(&self) -> u64 {
        self.created_ms
    }

    pub fn reply_to(&self) -> Option<&Digest> {
        self.reply_to.as_ref()
    }
}

// =============================================================================
// Wire Schema
// =============================================================================

/// Fields shared by every record variant on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireBody {
    channel: String,
    sender: String,
    payload: String,
    created_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reply_to: Option<Digest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message_type: Option<MessageType>,
}

/// Tagged JSON representation of a [`Record`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireRecord {
    ChannelMessage(WireBody),
    ParticipantJoined(WireBody),
    ParticipantLeft(WireBody),
    ParticipantMetadata(WireBody),
}

impl TryFrom<WireRecord> for Record {
    type Error = Error;

    fn try_from(wire: WireRecord) -> Result<Self> {
        let (kind, body) = match wire {
            WireRecord::ChannelMessage(body) => {
                let message_type = body.message_type.ok_or_else(|| Error::InvalidRecord {
                    field: "message_type",
                    reason: "is required for channel messages".to_string(),
                })?;
                (RecordKind::ChannelMessage(message_type), body)
            }
            WireRecord::ParticipantJoined(body) => (RecordKind::ParticipantJoined, body),
            WireRecord::ParticipantLeft(body) => (RecordKind::ParticipantLeft, body),
            WireRecord::ParticipantMetadata(body) => (RecordKind::ParticipantMetadata, body),
        };

        if !matches!(kind, RecordKind::ChannelMessage(_)) && body.message_type.is_some() {
            return Err(Error::InvalidRecord {
                field: "message_type",
                reason: "is only allowed on channel messages".to_string(),
            });
        }

        Ok(Record {
            kind,
            channel: ChannelId(body.channel),
            sender: ParticipantId(body.sender),
            payload: ContentRef(body.payload),
            created_ms: body.created_ms,
            reply_to: body.reply_to,
        })
    }
}

impl From<Record> for WireRecord {
    fn from(record: Record) -> Self {
        let message_type = match record.kind {
            RecordKind::ChannelMessage(message_type) => Some(message_type),
            _ => None,
        };
        let body = WireBody {
            channel: record.channel.0,
            sender: record.sender.0,
            payload: record.payload.0,
            created_ms: record.created_ms,
            reply_to: record.reply_to,
            message_type,
        };
        match record.kind {
            RecordKind::ChannelMessage(_) => WireRecord::ChannelMessage(body),
            RecordKind::ParticipantJoined => WireRecord::ParticipantJoined(body),
            RecordKind::ParticipantLeft => WireRecord::ParticipantLeft(body),
            RecordKind::ParticipantMetadata => WireRecord::ParticipantMetadata(body),
        }
    }
}

// =============================================================================
// Batch Numbering
// =============================================================================

/// Sequence number of a sealed batch, starting at 1 per engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatchId(u64);

impl BatchId {
    /// The first batch sealed by an engine.
    pub const FIRST: BatchId = BatchId(1);

    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Tests
// =============================================================================
