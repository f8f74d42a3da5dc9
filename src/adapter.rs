//! # Compression Network Boundary
//!
//! The engine hands each sealed root to a [`CompressionAdapter`]. Real
//! adapters talk to an external network and may be slow, fail, or apply a
//! submission twice if retried, so the engine calls `submit` at most once per
//! batch and bounds the call with a timeout. Any failure sends the batch
//! down the fallback path.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::NetworkError;
use crate::types::Digest;

/// What the network returns for an accepted root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkReceipt {
    /// Opaque commitment signature.
    pub signature: String,
    /// Account that was tipped for this submission, if any.
    pub tip_account: Option<String>,
}

impl NetworkReceipt {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            tip_account: None,
        }
    }

    pub fn with_tip_account(mut self, account: impl Into<String>) -> Self {
        self.tip_account = Some(account.into());
        self
    }
}

/// Submits batch roots to an external compression network.
#[async_trait]
pub trait CompressionAdapter: Send + Sync {
    /// Submits one root covering `leaf_count` records.
    async fn submit(&self, root: &Digest, leaf_count: usize) -> Result<NetworkReceipt, NetworkError>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "network"
    }
}

// =============================================================================
// Offline Adapter
// =============================================================================

/// Adapter for deployments with no network configured.
///
/// Every submission is `Unavailable`, so every batch is sealed by the
/// fallback compressor.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineAdapter;

#[async_trait]
impl CompressionAdapter for OfflineAdapter {
    async fn submit(&self, _root: &Digest, _leaf_count: usize) -> Result<NetworkReceipt, NetworkError> {
        Err(NetworkError::Unavailable("no compression network configured".to_string()))
    }

    fn name(&self) -> &str {
        "offline"
    }
}

// =============================================================================
// Tip Rotation
// =============================================================================

/// Round-robin cursor over tip accounts.
///
/// Each adapter owns its own rotation; two adapters never share a cursor.
#[derive(Debug)]
pub struct TipRotation {
    accounts: Vec<String>,
    cursor: AtomicUsize,
}

impl TipRotation {
    pub fn new<I, S>(accounts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            accounts: accounts.into_iter().map(Into::into).collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Returns the current account and advances, wrapping at the end.
    ///
    /// `None` when no accounts are configured.
    pub fn next(&self) -> Option<&str> {
        if self.accounts.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.accounts.len();
        Some(self.accounts[index].as_str())
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
