//! # Merkle Tree Builder
//!
//! Binary hash tree over the ordered leaf digests of one batch.
//!
//! ## Layout
//!
//! ```text
//! leaves [A, B, C]
//!
//! level 0:  A     B     C     C      <- odd level padded with its last node
//!            \   /       \   /
//! level 1:   H(A,B)      H(C,C)
//!                \        /
//! level 2:     H(H(A,B), H(C,C))     <- root
//! ```
//!
//! - **Padding**: a level with an odd number of nodes (other than the root
//!   level) is padded by duplicating its final node before pairing. This rule
//!   determines every root ever committed; changing it breaks proof
//!   compatibility with earlier batches.
//! - **Combine**: `H(l, r) = SHA-256(0x01 || l || r)`, see
//!   [`hash_node`](crate::codec::hash_node). Leaves are record digests and
//!   are used as-is (they are already domain-tagged by the content hasher).
//! - **No rebalancing**: the shape is a function of leaf count only.
//!
//! A single leaf is its own root with an empty proof. Zero leaves is invalid.

use serde::{Deserialize, Serialize};

use crate::codec::hash_node;
use crate::error::{Error, Result};
use crate::types::Digest;

// =============================================================================
// Tree
// =============================================================================

/// A fully materialized Merkle tree.
///
/// `levels[0]` holds the (padded) leaves and the last level holds only the
/// root. The tree is derived data: it is rebuilt from the leaves whenever it
/// is needed and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    levels: Vec<Vec<Digest>>,
    leaf_count: usize,
}

impl MerkleTree {
    /// Builds the tree over `leaves` in the given order.
    ///
    /// # Errors
    ///
    /// `Error::EmptyBatch` if `leaves` is empty.
    pub fn build(leaves: &[Digest]) -> Result<Self> {
        if leaves.is_empty() {
            return Err(Error::EmptyBatch);
        }

        let mut levels = Vec::new();
        let mut current = leaves.to_vec();

        while current.len() > 1 {
            if current.len() % 2 == 1 {
                let last = current[current.len() - 1];
                current.push(last);
            }
            let next = current
                .chunks_exact(2)
                .map(|pair| hash_node(&pair[0], &pair[1]))
                .collect();
            levels.push(current);
            current = next;
        }
        levels.push(current);

        Ok(Self {
            levels,
            leaf_count: leaves.len(),
        })
    }

    /// The root commitment.
    pub fn root(&self) -> Digest {
        // build() always pushes a final single-node level.
        self.levels[self.levels.len() - 1][0]
    }

    /// All levels, leaves first. Padding nodes are included.
    pub fn levels(&self) -> &[Vec<Digest>] {
        &self.levels
    }

    /// Number of real (unpadded) leaves.
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// The leaves in batch order, without padding.
    pub fn leaves(&self) -> &[Digest] {
        &self.levels[0][..self.leaf_count]
    }

    /// Number of sibling hashes in every proof of this tree.
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    /// Derives the inclusion proof for the leaf at `index`.
    ///
    /// # Errors
    ///
    /// `Error::IndexOutOfRange` if `index >= leaf_count()`.
    pub fn proof_for(&self, index: usize) -> Result<Proof> {
        if index >= self.leaf_count {
            return Err(Error::IndexOutOfRange {
                index,
                leaf_count: self.leaf_count,
            });
        }
        let leaf_index = u32::try_from(index).map_err(|_| Error::IndexOutOfRange {
            index,
            leaf_count: self.leaf_count,
        })?;

        let mut siblings = Vec::with_capacity(self.depth());
        let mut position = index;
        for level in &self.levels[..self.depth()] {
            // Every non-root level has even length, so the sibling exists.
            siblings.push(level[position ^ 1]);
            position >>= 1;
        }

        Ok(Proof {
            leaf_index,
            siblings,
        })
    }

    /// Proofs for every leaf, in leaf order.
    pub fn proofs(&self) -> Vec<Proof> {
        (0..self.leaf_count)
            .filter_map(|index| self.proof_for(index).ok())
            .collect()
    }
}

// =============================================================================
// Proof
// =============================================================================

/// Sibling path from one leaf up to the root.
///
/// The leaf index selects, level by level, whether the running hash is the
/// left (bit 0) or right (bit 1) input of the combine function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Proof {
    leaf_index: u32,
    siblings: Vec<Digest>,
}

impl Proof {
    pub fn new(leaf_index: u32, siblings: Vec<Digest>) -> Self {
        Self {
            leaf_index,
            siblings,
        }
    }

    pub fn leaf_index(&self) -> u32 {
        self.leaf_index
    }

    pub fn siblings(&self) -> &[Digest] {
        &self.siblings
    }

    pub fn len(&self) -> usize {
        self.siblings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.siblings.is_empty()
    }

    /// Replays the path from `leaf`.
    ///
    /// Returns `None` when the leaf index has bits above the path length,
    /// i.e. the proof claims a position the tree cannot have.
    pub fn compute_root(&self, leaf: &Digest) -> Option<Digest> {
        let mut node = *leaf;
        let mut position = self.leaf_index;
        for sibling in &self.siblings {
            node = if position & 1 == 0 {
                hash_node(&node, sibling)
            } else {
                hash_node(sibling, &node)
            };
            position >>= 1;
        }
        (position == 0).then_some(node)
    }
}

/// Checks that `leaf` is committed under `root` via `proof`.
pub fn verify_proof(leaf: &Digest, proof: &Proof, root: &Digest) -> bool {
    proof.compute_root(leaf).is_some_and(|computed| computed == *root)
}

// =============================================================================
// Tests
// =============================================================================
