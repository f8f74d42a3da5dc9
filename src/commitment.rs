//! Sealed-batch results.
//!
//! A flush produces one [`CompressionResult`] for the whole batch and one
//! [`RecordCommitment`] per record. Both are immutable values handed to the
//! caller; the engine keeps no copy.

use serde::{Deserialize, Serialize};

use crate::fallback::FallbackCompressor;
use crate::merkle::Proof;
use crate::types::{BatchId, Digest};
use crate::verify::ProofBundle;

// =============================================================================
// Commitment
// =============================================================================

/// How a batch root was committed.
///
/// The root is identical on both paths; only the signature and its meaning
/// differ. Fallback commitments must be reconciled against the network later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum Commitment {
    /// Accepted by the external compression network.
    Network {
        root: Digest,
        /// Opaque signature returned by the network.
        signature: String,
    },

    /// Computed locally by the fallback compressor.
    Fallback {
        root: Digest,
        /// `SHA-256(tag || root || logical_clock || leaf_count)`
        pseudo_signature: Digest,
        logical_clock: u64,
        /// Leaves in the sealed batch, as signed.
        leaf_count: u32,
        /// Why the network path was not used.
        reason: String,
    },
}

impl Commitment {
    pub fn root(&self) -> &Digest {
        match self {
            Commitment::Network { root, .. } | Commitment::Fallback { root, .. } => root,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Commitment::Fallback { .. })
    }

    /// Re-derives a fallback pseudo-signature from the commitment's own
    /// fields.
    ///
    /// Always false for network commitments: only the network can check
    /// its signature.
    pub fn verify_pseudo_signature(&self) -> bool {
        match self {
            Commitment::Network { .. } => false,
            Commitment::Fallback {
                root,
                pseudo_signature,
                logical_clock,
                leaf_count,
                ..
            } => FallbackCompressor::recompute(root, *logical_clock, *leaf_count) == *pseudo_signature,
        }
    }

    /// The signature as a string, whichever path produced it.
    pub fn signature(&self) -> String {
        match self {
            Commitment::Network { signature, .. } => signature.clone(),
            Commitment::Fallback {
                pseudo_signature, ..
            } => pseudo_signature.to_hex(),
        }
    }
}

// =============================================================================
// Batch Result
// =============================================================================

/// Outcome of sealing one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionResult {
    pub batch_id: BatchId,
    /// Leaf digests in batch order.
    pub leaves: Vec<Digest>,
    /// `proofs[i]` proves `leaves[i]`.
    pub proofs: Vec<Proof>,
    pub commitment: Commitment,
}

impl CompressionResult {
    pub fn root(&self) -> &Digest {
        self.commitment.root()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Per-record view of the leaf at `index`.
    pub fn record_commitment(&self, index: usize) -> Option<RecordCommitment> {
        let digest = *self.leaves.get(index)?;
        let proof = self.proofs.get(index)?.clone();
        Some(RecordCommitment {
            batch_id: self.batch_id,
            digest,
            proof,
            commitment: self.commitment.clone(),
        })
    }
}

// =============================================================================
// Record Result
// =============================================================================

/// What a single producer receives once its record's batch is sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCommitment {
    pub batch_id: BatchId,
    pub digest: Digest,
    pub proof: Proof,
    pub commitment: Commitment,
}

impl RecordCommitment {
    /// Self-contained bundle for the read path.
    pub fn to_bundle(&self) -> ProofBundle {
        ProofBundle {
            digest: self.digest,
            proof: self.proof.clone(),
            root: *self.commitment.root(),
        }
    }
}
