//! # Canonical Record Encoding and Content Hashing
//!
//! This module turns a [`Record`] into its canonical byte representation and
//! digests it. The digest is the record's identity everywhere in the engine:
//! it is the Merkle leaf, the reply-to target and the value the verifier
//! recomputes on the read path.
//!
//! ## Canonical Format
//!
//! ```text
//! [leaf tag (1)] [format version (1)]
//! [kind tag (1)] [message type tag (1), 0 for participant events]
//! [channel len (4 LE)] [channel bytes]
//! [sender len (4 LE)]  [sender bytes]
//! [payload len (4 LE)] [normalized payload reference bytes]
//! [created_ms (8 LE)]
//! [reply flag (1)] [reply digest (32), only when the flag is 1]
//! ```
//!
//! Fields are always written in this order, so two records with the same
//! content always produce the same bytes. The payload reference is
//! normalized first (the optional `sha256:` prefix is dropped) so that the
//! two spellings of one content hash do not digest differently.
//!
//! ## Domain Separation
//!
//! Leaf encodings start with [`LEAF_DOMAIN_TAG`]; Merkle nodes are hashed
//! under [`NODE_DOMAIN_TAG`]. A leaf digest can therefore never be replayed
//! as an internal node.

use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest as _, Sha256};

use crate::error::{Error, Result};
use crate::types::{Digest, Record, DIGEST_LEN};

// =============================================================================
// Constants
// =============================================================================

/// First byte of every canonical record encoding.
pub const LEAF_DOMAIN_TAG: u8 = 0x00;

/// First byte of every Merkle internal node preimage.
pub const NODE_DOMAIN_TAG: u8 = 0x01;

/// Version byte of the canonical record encoding.
pub const CANONICAL_VERSION: u8 = 1;

/// Longest channel or participant identifier accepted, in bytes.
pub const MAX_ID_LEN: usize = 256;

/// Length of a hex-encoded SHA-256 content hash.
const SHA256_HEX_LEN: usize = DIGEST_LEN * 2;

/// Length of a base58 CIDv0 (`Qm...`).
const CID_V0_LEN: usize = 46;

/// Length of a base32 CIDv1 for a sha2-256 multihash (`b...`).
const CID_V1_LEN: usize = 59;

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

// =============================================================================
// Hashing
// =============================================================================

/// Digests a record's canonical encoding.
///
/// Pure and stable across restarts: no randomness, no salts, no clock.
///
/// # Errors
///
/// `Error::InvalidRecord` if the record cannot be canonicalized.
pub fn hash_record(record: &Record) -> Result<Digest> {
    let bytes = canonical_bytes(record)?;
    Ok(sha256(&bytes))
}

/// Combines two sibling nodes into their parent.
///
/// `SHA-256(NODE_DOMAIN_TAG || left || right)`
pub fn hash_node(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update([NODE_DOMAIN_TAG]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Digest::from_bytes(hasher.finalize().into())
}

/// SHA-256 of arbitrary bytes.
pub fn sha256(data: &[u8]) -> Digest {
    Digest::from_bytes(Sha256::digest(data).into())
}

// =============================================================================
// Canonicalization
// =============================================================================

/// Produces the canonical byte encoding of a record.
///
/// # Errors
///
/// - empty or over-long channel / sender identifiers
/// - a payload reference that is not a recognised content address
pub fn canonical_bytes(record: &Record) -> Result<Vec<u8>> {
    let channel = validate_id("channel", record.channel().as_str())?;
    let sender = validate_id("sender", record.sender().as_str())?;
    let payload = canonical_payload_ref(record.payload().as_str())?;

    let mut out = Vec::with_capacity(
        4 + 3 * 4 + channel.len() + sender.len() + payload.len() + 8 + 1 + DIGEST_LEN,
    );
    out.push(LEAF_DOMAIN_TAG);
    out.push(CANONICAL_VERSION);
    out.push(record.kind().tag());
    out.push(record.kind().sub_tag());
    put_field(&mut out, channel.as_bytes());
    put_field(&mut out, sender.as_bytes());
    put_field(&mut out, payload.as_bytes());
    out.extend_from_slice(&record.created_ms().to_le_bytes());
    match record.reply_to() {
        Some(parent) => {
            out.push(1);
            out.extend_from_slice(parent.as_bytes());
        }
        None => out.push(0),
    }
    Ok(out)
}

/// Validates a payload reference and returns its normalized form.
///
/// Normalization strips the optional `sha256:` prefix from hex content
/// hashes. CIDs are returned unchanged.
pub fn canonical_payload_ref(reference: &str) -> Result<&str> {
    let invalid = |reason: &str| Error::InvalidRecord {
        field: "payload",
        reason: reason.to_string(),
    };

    if reference.is_empty() {
        return Err(invalid("must not be empty"));
    }

    let bare = reference.strip_prefix("sha256:").unwrap_or(reference);
    if bare.len() == SHA256_HEX_LEN && bare.bytes().all(|b| b.is_ascii_hexdigit()) {
        if bare.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(invalid("content hash must be lowercase hex"));
        }
        return Ok(bare);
    }
    if bare.len() != reference.len() {
        return Err(invalid("sha256 reference must be 64 hex characters"));
    }

    if reference.len() == CID_V0_LEN
        && reference.starts_with("Qm")
        && reference.chars().all(|c| BASE58_ALPHABET.contains(c))
    {
        return Ok(reference);
    }

    if reference.len() == CID_V1_LEN
        && reference.starts_with('b')
        && reference
            .bytes()
            .all(|b| b.is_ascii_lowercase() || (b'2'..=b'7').contains(&b))
    {
        return Ok(reference);
    }

    Err(invalid("is not a sha256 content hash or IPFS CID"))
}

fn validate_id<'a>(field: &'static str, value: &'a str) -> Result<&'a str> {
    if value.is_empty() {
        return Err(Error::InvalidRecord {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    if value.len() > MAX_ID_LEN {
        return Err(Error::InvalidRecord {
            field,
            reason: format!("exceeds {} bytes (got {})", MAX_ID_LEN, value.len()),
        });
    }
    Ok(value)
}

fn put_field(out: &mut Vec<u8>, bytes: &[u8]) {
    // Identifiers are capped at MAX_ID_LEN and payload refs at CID_V1_LEN.
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Returns the current time in milliseconds since the Unix epoch.
///
/// A clock set before 1970 reads as 0.
pub fn current_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// =============================================================================
// Tests
// =============================================================================
