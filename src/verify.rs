//! # Integrity Verifier
//!
//! Read-path check that a record belongs to a committed batch. Verification
//! answers yes or no: malformed input is a `false`, never an error or panic.

use serde::{Deserialize, Serialize};

use crate::codec::hash_record;
use crate::merkle::{verify_proof, Proof};
use crate::types::{Digest, Record};

/// Everything a reader needs to check one record against a root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBundle {
    pub digest: Digest,
    pub proof: Proof,
    pub root: Digest,
}

/// Recomputes the record's digest and replays `proof` up to `claimed_root`.
pub fn verify_record(
    record: &Record,
    claimed_digest: &Digest,
    proof: &Proof,
    claimed_root: &Digest,
) -> bool {
    match hash_record(record) {
        Ok(digest) if digest == *claimed_digest => verify_proof(&digest, proof, claimed_root),
        _ => false,
    }
}

pub fn verify_bundle(record: &Record, bundle: &ProofBundle) -> bool {
    verify_record(record, &bundle.digest, &bundle.proof, &bundle.root)
}
