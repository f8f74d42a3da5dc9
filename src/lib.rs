//! # sealbatch - Batched Merkle Commitments
//!
//! sealbatch accumulates small content records from many producers and seals
//! them, batch by batch, into one Merkle root with a proof per record. It
//! provides:
//!
//! - **Content addressing**: deterministic, domain-separated record digests
//! - **Group sealing**: size- or time-triggered batches, one commitment each
//! - **Inclusion proofs**: every record can be checked against its root
//! - **Degraded operation**: a deterministic local fallback when the external
//!   compression network is unreachable
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Async API Layer                          │
//! │            (compress, flush_now, verify, status, shutdown)      │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Batch Queue                              │
//! │      (digest on enqueue, size/time triggers, one mutex)         │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ take_batch
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   Flush Task (one at a time)                    │
//! │                                                                 │
//! │  ┌─────────────┐   ┌─────────────────┐   ┌───────────────────┐  │
//! │  │ Merkle Tree │──►│ Network Adapter │──►│ Fallback (on err) │  │
//! │  └─────────────┘   └─────────────────┘   └───────────────────┘  │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//!                 CompressionResult + per-record proofs
//! ```
//!
//! ## Core Invariants
//!
//! 1. **Determinism**: the same record always has the same digest; the same
//!    ordered leaves always produce the same root and proofs
//! 2. **No loss**: every accepted record lands in exactly one sealed batch,
//!    including on shutdown
//! 3. **Exactly-once completion**: each record's completion resolves once
//! 4. **Path parity**: network and fallback seals share root and proofs
//!
//! ## Module Organization
//!
//! - [`error`]: Error types for all failure modes
//! - [`types`]: Records, digests, identifiers
//! - [`codec`]: Canonical record encoding and hashing
//! - [`queue`]: Batch queue and completion handles
//! - [`merkle`]: Tree construction and proofs
//! - [`adapter`]: Compression network boundary
//! - [`fallback`]: Deterministic local commitments
//! - [`verify`]: Read-path integrity checks
//! - [`api`]: The [`Engine`] (main entry point)

// =============================================================================
// Module Declarations
// =============================================================================

/// Error types for sealbatch operations.
pub mod error;

/// Domain types: records, digests, identifiers.
///
/// Uses the newtype pattern for type safety. JSON records are decoded through
/// a closed schema.
pub mod types;

/// Canonical record encoding and content hashing.
pub mod codec;

/// Batch queue with size and time flush triggers.
pub mod queue;

/// Merkle tree construction and inclusion proofs.
pub mod merkle;

/// Sealed-batch results.
pub mod commitment;

/// External compression network boundary.
pub mod adapter;

/// Deterministic fallback compressor.
pub mod fallback;

/// Integrity verification for the read path.
pub mod verify;

/// Content-addressed blob storage.
pub mod blob;

/// Engine configuration.
pub mod config;

/// Compression counters.
pub mod stats;

/// Async API.
///
/// The main entry point is [`Engine`](api::Engine).
pub mod api;

// =============================================================================
// Re-exports
// =============================================================================

pub use adapter::{CompressionAdapter, NetworkReceipt, OfflineAdapter, TipRotation};
pub use api::{Compression, Engine, EngineStatus, FlushOutcome};
pub use blob::{BlobStore, MemoryBlobStore, StoredBlob};
pub use commitment::{Commitment, CompressionResult, RecordCommitment};
pub use config::EngineConfig;
pub use error::{Error, NetworkError, Result};
pub use fallback::{FallbackCommitment, FallbackCompressor};
pub use merkle::{MerkleTree, Proof};
pub use queue::PendingCompression;
pub use stats::CompressionStats;
pub use types::{
    BatchId, ChannelId, ContentRef, Digest, MessageType, ParticipantId, Record, RecordKind,
};
pub use verify::{verify_bundle, verify_record, ProofBundle};
