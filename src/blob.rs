//! Content-addressed blob storage.
//!
//! Records never carry payload bytes, only the content hash of bytes kept
//! elsewhere. [`BlobStore`] is that elsewhere. [`MemoryBlobStore`] is the
//! in-process implementation used by tests and the stress binary.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::codec::sha256;
use crate::error::{Error, Result};
use crate::types::ContentRef;

/// Where a stored blob can be fetched from, and the hash records should cite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub content_hash: ContentRef,
    pub locator: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn store(&self, bytes: Vec<u8>, metadata: BTreeMap<String, String>) -> Result<StoredBlob>;

    async fn retrieve(&self, locator: &str) -> Result<Vec<u8>>;
}

struct BlobEntry {
    bytes: Vec<u8>,
    metadata: BTreeMap<String, String>,
}

/// SHA-256 addressed store held in memory. Identical bytes are stored once.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, BlobEntry>>,
}

const MEMORY_SCHEME: &str = "mem://";

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    /// Metadata recorded for a blob. Re-storing identical bytes merges
    /// metadata, later keys winning.
    pub async fn metadata(&self, locator: &str) -> Option<BTreeMap<String, String>> {
        let hex = locator.strip_prefix(MEMORY_SCHEME)?;
        self.blobs.read().await.get(hex).map(|entry| entry.metadata.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn store(&self, bytes: Vec<u8>, metadata: BTreeMap<String, String>) -> Result<StoredBlob> {
        let digest = sha256(&bytes);
        let hex = digest.to_hex();

        let mut blobs = self.blobs.write().await;
        blobs
            .entry(hex.clone())
            .and_modify(|entry| entry.metadata.extend(metadata.clone()))
            .or_insert(BlobEntry { bytes, metadata });

        Ok(StoredBlob {
            content_hash: ContentRef::from_sha256(&digest),
            locator: format!("{}{}", MEMORY_SCHEME, hex),
        })
    }

    async fn retrieve(&self, locator: &str) -> Result<Vec<u8>> {
        let hex = locator
            .strip_prefix(MEMORY_SCHEME)
            .ok_or_else(|| Error::Blob(format!("unsupported locator: {}", locator)))?;

        self.blobs
            .read()
            .await
            .get(hex)
            .map(|entry| entry.bytes.clone())
            .ok_or_else(|| Error::Blob(format!("blob not found: {}", locator)))
    }
}
