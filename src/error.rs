//! # Error Handling for sealbatch
//!
//! This module defines the error types used throughout the engine. A single
//! error enum ([`Error`]) covers every failure mode a caller can observe, plus a
//! narrower [`NetworkError`] for the external compression network boundary.
//!
//! ## Rust Pattern: thiserror
//!
//! We use the `thiserror` crate to derive `std::error::Error` implementations:
//! - `Display` comes from the `#[error(...)]` attributes
//! - `From` impls come from `#[from]` attributes
//! - Source chaining is preserved for wrapped errors
//!
//! ## Error Categories
//!
//! | Category | Examples | Typical Response |
//! |----------|----------|------------------|
//! | Caller bug | Malformed record, bad config | Fix the input, do not retry |
//! | Degraded | Network unavailable or timed out | Absorbed by the fallback path |
//! | Fatal | Fallback commitment failed | Surface to an operator |
//! | Lifecycle | Engine shut down, completion dropped | Stop submitting |
//!
//! Verification mismatches are deliberately absent: `verify` answers a
//! question and returns `false`.

use thiserror::Error;

// =============================================================================
// Engine Error
// =============================================================================

/// All errors that can occur in sealbatch operations.
///
/// # Example
///
/// ```rust
/// use sealbatch::Error;
///
/// let err = Error::InvalidRecord {
///     field: "channel",
///     reason: "must not be empty".to_string(),
/// };
/// assert_eq!(err.to_string(), "invalid record: channel must not be empty");
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // =========================================================================
    // Caller Errors (fail fast, never retried)
    // =========================================================================

    /// The record could not be canonicalized.
    ///
    /// # When This Happens
    ///
    /// - An identifier is empty or longer than the canonical field limit
    /// - The payload reference is not a recognised content address
    /// - A JSON record does not match the closed record schema
    ///
    /// The record is rejected before it reaches the queue.
    #[error("invalid record: {field} {reason}")]
    InvalidRecord {
        /// The offending field
        field: &'static str,
        /// Why the field was rejected
        reason: String,
    },

    /// A Merkle tree was requested over zero leaves.
    ///
    /// Callers must never flush an empty batch; the engine reports
    /// [`FlushOutcome::EmptyBatch`](crate::api::FlushOutcome) instead of
    /// producing this error.
    #[error("cannot build a commitment over an empty batch")]
    EmptyBatch,

    /// A proof was requested for a leaf the tree does not have.
    #[error("leaf index {index} out of range for {leaf_count} leaves")]
    IndexOutOfRange {
        /// Requested leaf index
        index: usize,
        /// Number of leaves in the tree
        leaf_count: usize,
    },

    /// Engine configuration failed validation.
    #[error("invalid configuration: {field}: {reason}")]
    InvalidConfig {
        /// Configuration field name
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// The queue already holds `capacity` records waiting to be sealed.
    ///
    /// Only returned by the non-blocking [`BatchQueue::enqueue`](crate::queue::BatchQueue::enqueue).
    /// [`Engine::compress`](crate::api::Engine::compress) waits for room instead.
    #[error("queue is full ({capacity} records pending)")]
    QueueFull {
        /// Configured queue capacity
        capacity: usize,
    },

    // =========================================================================
    // Degraded Path (absorbed by the fallback)
    // =========================================================================

    /// The external compression network rejected or lost a submission.
    ///
    /// The engine never returns this from a flush: it switches to the
    /// deterministic fallback instead. It is exposed so adapters and callers
    /// that talk to the network directly can use `?`.
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    // =========================================================================
    // Fatal Errors (surface to an operator)
    // =========================================================================

    /// The deterministic fallback path itself failed.
    ///
    /// This indicates an environment defect (for example a batch too large
    /// to index). Every record in the affected batch receives this error.
    #[error("fallback commitment failed: {0}")]
    FallbackFailure(String),

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// The engine has shut down and no longer accepts records.
    #[error("engine has shut down")]
    ShutDown,

    /// A completion handle was dropped before its batch was sealed.
    #[error("completion dropped before the batch was sealed")]
    Dropped,

    /// A blob store operation failed.
    #[error("blob store error: {0}")]
    Blob(String),
}

// =============================================================================
// Network Error
// =============================================================================

/// Failures reported by a [`CompressionAdapter`](crate::adapter::CompressionAdapter).
///
/// Every variant is recoverable from the engine's point of view: the batch is
/// sealed through the fallback compressor and tagged accordingly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// No network endpoint is reachable (or none is configured).
    #[error("compression network unavailable: {0}")]
    Unavailable(String),

    /// The submission did not complete within the configured bound.
    #[error("submission timed out after {timeout_ms}ms")]
    Timeout {
        /// The bound that elapsed, in milliseconds
        timeout_ms: u64,
    },

    /// The network answered but refused the commitment.
    #[error("submission rejected: {0}")]
    Rejected(String),
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A `Result` type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Tests
// =============================================================================
