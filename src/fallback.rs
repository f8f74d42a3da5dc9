//! # Deterministic Fallback Compressor
//!
//! When the compression network is unreachable, a batch is still sealed: the
//! root comes from the same [`MerkleTree`] as the network path, so proofs are
//! byte-identical, and the signature is replaced by a locally computed
//! pseudo-signature:
//!
//! ```text
//! pseudo_signature = SHA-256(FALLBACK_DOMAIN_TAG || root || clock (u64 LE) || leaf_count (u32 LE))
//! ```
//!
//! The logical clock belongs to one compressor instance. It starts at a
//! configured value and advances by one per commitment, so an auditor holding
//! `(root, clock, leaf_count)` can re-derive the signature with
//! [`FallbackCompressor::recompute`].

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::error::{Error, Result};
use crate::merkle::MerkleTree;
use crate::types::Digest;

/// Domain tag for pseudo-signatures. Distinct from the leaf and node tags.
pub const FALLBACK_DOMAIN_TAG: &[u8] = b"sealbatch:fallback:v1";

/// A locally computed commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackCommitment {
    pub root: Digest,
    pub pseudo_signature: Digest,
    pub logical_clock: u64,
    pub leaf_count: u32,
}

/// Produces reproducible pseudo-commitments.
#[derive(Debug)]
pub struct FallbackCompressor {
    clock: AtomicU64,
}

impl FallbackCompressor {
    pub fn new(clock_start: u64) -> Self {
        Self {
            clock: AtomicU64::new(clock_start),
        }
    }

    /// Clock value the next commitment will use.
    pub fn clock(&self) -> u64 {
        self.clock.load(Ordering::SeqCst)
    }

    /// Commits `tree` and advances the clock.
    ///
    /// # Errors
    ///
    /// `Error::FallbackFailure` if the leaf count does not fit the encoding
    /// or the clock is exhausted. The clock does not advance on failure.
    pub fn commit(&self, tree: &MerkleTree) -> Result<FallbackCommitment> {
        let leaf_count = u32::try_from(tree.leaf_count()).map_err(|_| {
            Error::FallbackFailure(format!(
                "batch of {} leaves exceeds the u32 leaf count encoding",
                tree.leaf_count()
            ))
        })?;

        let logical_clock = self
            .clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |clock| clock.checked_add(1))
            .map_err(|_| Error::FallbackFailure("logical clock exhausted".to_string()))?;

        let root = tree.root();
        Ok(FallbackCommitment {
            root,
            pseudo_signature: Self::recompute(&root, logical_clock, leaf_count),
            logical_clock,
            leaf_count,
        })
    }

    /// Re-derives a pseudo-signature.
    pub fn recompute(root: &Digest, logical_clock: u64, leaf_count: u32) -> Digest {
        let mut hasher = Sha256::new();
        hasher.update(FALLBACK_DOMAIN_TAG);
        hasher.update(root.as_bytes());
        hasher.update(logical_clock.to_le_bytes());
        hasher.update(leaf_count.to_le_bytes());
        Digest::from_bytes(hasher.finalize().into())
    }

    /// Checks a commitment's pseudo-signature against its own fields.
    pub fn check(commitment: &FallbackCommitment) -> bool {
        Self::recompute(&commitment.root, commitment.logical_clock, commitment.leaf_count)
            == commitment.pseudo_signature
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::sha256;

    fn tree(n: usize) -> MerkleTree {
        let leaves: Vec<Digest> = (0..n).map(|i| sha256(&[i as u8])).collect();
        MerkleTree::build(&leaves).unwrap()
    }

    #[test]
    fn test_root_matches_builder() {
        let t = tree(5);
        let commitment = FallbackCompressor::new(0).commit(&t).unwrap();
        assert_eq!(commitment.root, t.root());
        assert_eq!(commitment.leaf_count, 5);
    }

    #[test]
    fn test_clock_advances_per_commit() {
        let compressor = FallbackCompressor::new(41);
        let t = tree(2);
        let first = compressor.commit(&t).unwrap();
        let second = compressor.commit(&t).unwrap();
        assert_eq!(first.logical_clock, 41);
        assert_eq!(second.logical_clock, 42);
        assert_eq!(compressor.clock(), 43);
        assert_ne!(first.pseudo_signature, second.pseudo_signature);
    }

    #[test]
    fn test_reproducible_across_instances() {
        let t = tree(3);
        let a = FallbackCompressor::new(9).commit(&t).unwrap();
        let b = FallbackCompressor::new(9).commit(&t).unwrap();
        assert_eq!(a, b);
        assert!(FallbackCompressor::check(&a));
        assert_eq!(
            FallbackCompressor::recompute(&a.root, 9, 3),
            a.pseudo_signature
        );
    }

    #[test]
    fn test_check_detects_tampering() {
        let mut commitment = FallbackCompressor::new(0).commit(&tree(4)).unwrap();
        commitment.leaf_count = 5;
        assert!(!FallbackCompressor::check(&commitment));
    }

    #[test]
    fn test_clock_exhaustion_is_fatal() {
        let compressor = FallbackCompressor::new(u64::MAX);
        let err = compressor.commit(&tree(1)).unwrap_err();
        assert!(matches!(err, Error::FallbackFailure(_)));
        assert_eq!(compressor.clock(), u64::MAX);
    }
}
