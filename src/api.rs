//! # Async API for sealbatch
//!
//! [`Engine`] is the entry point. It owns the batch queue, one background
//! flush task, the compression adapter and the fallback compressor.
//!
//! ## Flush Path
//!
//! ```text
//!   producers ──compress──► BatchQueue ──(size | deadline)──► flush task
//!                                                                 │
//!                                                  flush gate (one at a time)
//!                                                                 │
//!                                       take_batch ─► MerkleTree::build
//!                                                                 │
//!                                        adapter.submit (bounded by timeout)
//!                                           │ ok                  │ err
//!                                     Commitment::Network   FallbackCompressor
//!                                           └─────────┬───────────┘
//!                                       resolve every record's completion
//! ```
//!
//! ## Concurrency
//!
//! - The queue lock is never held across an await. Records enqueue into the
//!   next batch while the previous batch's submission is in flight.
//! - Every flush (background, `flush_now`, `immediate` compress, shutdown)
//!   goes through the flush gate, so two flushes never overlap and a forced
//!   flush waits for any in-flight submission to reach a terminal state.
//! - The background task only re-arms after its flush has finished.
//! - `compress` waits while `max_pending` records are queued; slots free up
//!   as soon as the flush takes their batch.
//!
//! ## Shutdown
//!
//! [`Engine::shutdown`] closes the queue, stops the background task after its
//! current flush, then drains whatever is still queued. Dropping the last
//! clone without calling `shutdown` stops the task too, and any records still
//! queued resolve with `Error::Dropped`.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::adapter::{CompressionAdapter, NetworkReceipt, OfflineAdapter};
use crate::commitment::{Commitment, CompressionResult, RecordCommitment};
use crate::config::EngineConfig;
use crate::error::{Error, NetworkError, Result};
use crate::fallback::FallbackCompressor;
use crate::merkle::MerkleTree;
use crate::queue::{Batch, BatchQueue, PendingCompression};
use crate::stats::{CompressionStats, StatsRecorder};
use crate::types::{BatchId, Digest, Record};
use crate::verify::{verify_bundle, ProofBundle};

// =============================================================================
// Results
// =============================================================================

/// What `compress` hands back.
#[derive(Debug)]
pub enum Compression {
    /// The record's batch has been sealed.
    Committed(RecordCommitment),

    /// The record is queued; await the handle for its commitment.
    Pending(PendingCompression),
}

impl Compression {
    /// Waits for the commitment if it is not already available.
    pub async fn into_commitment(self) -> Result<RecordCommitment> {
        match self {
            Compression::Committed(commitment) => Ok(commitment),
            Compression::Pending(pending) => pending.wait().await,
        }
    }
}

/// Outcome of a forced flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Sealed(CompressionResult),
    /// Nothing was queued. Not an error.
    EmptyBatch,
}

/// Snapshot of the engine's queue and configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub queue_size: usize,
    pub max_batch_size: usize,
    pub batching_enabled: bool,
    /// Milliseconds until the next flush; `None` when the queue is empty or
    /// no timed flush is scheduled.
    pub next_flush_eta_ms: Option<u64>,
    pub queue_capacity: usize,
    pub shut_down: bool,
}

// =============================================================================
// Engine
// =============================================================================

/// Shared flush-side state. The background task holds its own `Arc`.
struct EngineInner {
    config: EngineConfig,
    queue: BatchQueue,
    adapter: Arc<dyn CompressionAdapter>,
    fallback: FallbackCompressor,
    /// Serializes flushes. Held for the whole seal, including submission.
    flush_gate: tokio::sync::Mutex<()>,
    stats: StatsRecorder,
}

/// Stops the background task when the last engine clone goes away.
struct Lifecycle {
    shutdown_tx: watch::Sender<bool>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a running batching engine.
///
/// `Engine` is `Clone`; all clones share one queue and one flush task.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use sealbatch::{ContentRef, Engine, EngineConfig, MessageType, OfflineAdapter, Record, RecordKind};
///
/// #[tokio::main]
/// async fn main() -> sealbatch::Result<()> {
///     let engine = Engine::new(EngineConfig::default(), Arc::new(OfflineAdapter))?;
///
///     let record = Record::new(
///         RecordKind::ChannelMessage(MessageType::Text),
///         "general",
///         "alice",
///         ContentRef::new("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG"),
///         1_700_000_000_000,
///     );
///     let commitment = engine.compress(record.clone(), true).await?.into_commitment().await?;
///     assert!(engine.verify(&record, &commitment.to_bundle()));
///
///     engine.shutdown().await
/// }
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
    lifecycle: Arc<Lifecycle>,
}

impl Engine {
    /// Validates `config` and starts the background flush task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: EngineConfig, adapter: Arc<dyn CompressionAdapter>) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| Error::InvalidConfig {
            field: "runtime",
            reason: e.to_string(),
        })?;

        let inner = Arc::new(EngineInner {
            queue: BatchQueue::new(config.max_batch_size, config.batch_timeout, config.max_pending),
            fallback: FallbackCompressor::new(config.fallback_clock_start),
            flush_gate: tokio::sync::Mutex::new(()),
            stats: StatsRecorder::default(),
            adapter,
            config,
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let flusher = runtime.spawn(run_flusher(Arc::clone(&inner), shutdown_rx));

        debug!(
            adapter = inner.adapter.name(),
            max_batch_size = inner.config.max_batch_size,
            batch_timeout_ms = inner.config.batch_timeout.as_millis() as u64,
            "engine started"
        );

        Ok(Self {
            inner,
            lifecycle: Arc::new(Lifecycle {
                shutdown_tx,
                flusher: Mutex::new(Some(flusher)),
            }),
        })
    }

    /// Engine with no network: every batch is sealed by the fallback.
    pub fn offline(config: EngineConfig) -> Result<Self> {
        Self::new(config, Arc::new(OfflineAdapter))
    }

    /// Queues a record for sealing.
    ///
    /// With `immediate` (or batching disabled) the queue is flushed until the
    /// record's batch is sealed and the commitment is returned directly.
    /// Otherwise a pending handle is returned and the record is sealed by the
    /// size or time trigger.
    ///
    /// Waits for room while `max_pending` records are already queued.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidRecord` if the record cannot be canonicalized
    /// - `Error::ShutDown` after [`shutdown`](Self::shutdown)
    /// - `Error::FallbackFailure` (immediate only) if sealing failed
    pub async fn compress(&self, record: Record, immediate: bool) -> Result<Compression> {
        let mut pending = self.inner.queue.enqueue_wait(record).await?;

        if !immediate && self.inner.config.batching_enabled {
            return Ok(Compression::Pending(pending));
        }

        loop {
            let outcome = self.inner.flush().await;
            if let Some(result) = pending.try_resolve() {
                return result.map(Compression::Committed);
            }
            // An empty queue means another flush already took the record and
            // resolved it before releasing the gate.
            if let Ok(FlushOutcome::EmptyBatch) = outcome {
                return pending.wait().await.map(Compression::Committed);
            }
        }
    }

    /// Seals whatever is queued, up to one batch.
    ///
    /// Waits for any in-flight flush first.
    pub async fn flush_now(&self) -> Result<FlushOutcome> {
        self.inner.flush().await
    }

    /// Checks a record against a proof bundle. Never errors.
    pub fn verify(&self, record: &Record, bundle: &ProofBundle) -> bool {
        verify_bundle(record, bundle)
    }

    pub fn status(&self) -> EngineStatus {
        let queue = &self.inner.queue;
        EngineStatus {
            queue_size: queue.len(),
            max_batch_size: queue.max_batch_size(),
            batching_enabled: self.inner.config.batching_enabled,
            next_flush_eta_ms: queue.next_flush_eta().map(|eta| eta.as_millis() as u64),
            queue_capacity: queue.capacity(),
            shut_down: queue.is_closed(),
        }
    }

    pub fn stats(&self) -> CompressionStats {
        self.inner.stats.snapshot()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Stops accepting records and seals everything still queued.
    ///
    /// 1. Closes the queue (`compress` now returns `Error::ShutDown`)
    /// 2. Stops the background task once its current flush completes
    /// 3. Drains the queue batch by batch
    ///
    /// Safe to call more than once. Returns the first sealing error, after
    /// every batch has been attempted.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.queue.close();
        let _ = self.lifecycle.shutdown_tx.send(true);

        let flusher = self
            .lifecycle
            .flusher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(flusher) = flusher {
            if let Err(e) = flusher.await {
                error!(error = %e, "flush task ended abnormally");
            }
        }

        let mut first_error = None;
        loop {
            match self.inner.flush().await {
                Ok(FlushOutcome::EmptyBatch) => break,
                Ok(FlushOutcome::Sealed(_)) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        info!(stats = ?self.inner.stats.snapshot(), "engine shut down");
        first_error.map_or(Ok(()), Err)
    }
}

// =============================================================================
// Flush Path
// =============================================================================

impl EngineInner {
    async fn flush(&self) -> Result<FlushOutcome> {
        let _gate = self.flush_gate.lock().await;
        match self.queue.take_batch() {
            None => Ok(FlushOutcome::EmptyBatch),
            Some(batch) => self.seal(batch).await.map(FlushOutcome::Sealed),
        }
    }

    /// Seals one batch and resolves every completion in it exactly once.
    async fn seal(&self, batch: Batch) -> Result<CompressionResult> {
        let (batch_id, leaves, completions) = batch.into_completions();
        debug!(batch_id = %batch_id, leaf_count = leaves.len(), "flushing batch");

        let sealed = self.commit(batch_id, leaves).await;
        match &sealed {
            Ok(result) => {
                for (index, completion) in completions.into_iter().enumerate() {
                    let reply = result.record_commitment(index).ok_or(Error::IndexOutOfRange {
                        index,
                        leaf_count: result.leaf_count(),
                    });
                    let _ = completion.send(reply);
                }
            }
            Err(e) => {
                for completion in completions {
                    let _ = completion.send(Err(e.clone()));
                }
            }
        }
        sealed
    }

    async fn commit(&self, batch_id: BatchId, leaves: Vec<Digest>) -> Result<CompressionResult> {
        let tree = MerkleTree::build(&leaves)?;
        let proofs = (0..tree.leaf_count())
            .map(|index| tree.proof_for(index))
            .collect::<Result<Vec<_>>>()?;
        let root = tree.root();

        let commitment = match self.submit(&root, tree.leaf_count()).await {
            Ok(receipt) => {
                self.stats.record_network();
                Commitment::Network {
                    root,
                    signature: receipt.signature,
                }
            }
            Err(network_error) => {
                warn!(
                    batch_id = %batch_id,
                    adapter = self.adapter.name(),
                    error = %network_error,
                    "network submission failed, sealing with fallback"
                );
                let fallback = self.fallback.commit(&tree).map_err(|e| {
                    self.stats.record_fallback_failure();
                    error!(batch_id = %batch_id, error = %e, "fallback commitment failed");
                    e
                })?;
                let reason = network_error.to_string();
                self.stats.record_fallback(&reason);
                Commitment::Fallback {
                    root: fallback.root,
                    pseudo_signature: fallback.pseudo_signature,
                    logical_clock: fallback.logical_clock,
                    leaf_count: fallback.leaf_count,
                    reason,
                }
            }
        };

        self.stats.record_sealed(leaves.len());
        let path = if commitment.is_fallback() { "fallback" } else { "network" };
        info!(
            batch_id = %batch_id,
            leaf_count = leaves.len(),
            root = %root,
            path,
            "batch sealed"
        );

        Ok(CompressionResult {
            batch_id,
            leaves,
            proofs,
            commitment,
        })
    }

    /// One adapter call, bounded by `submit_timeout`. Never retried.
    async fn submit(&self, root: &Digest, leaf_count: usize) -> std::result::Result<NetworkReceipt, NetworkError> {
        let bound = self.config.submit_timeout;
        match timeout(bound, self.adapter.submit(root, leaf_count)).await {
            Ok(result) => result,
            Err(_) => Err(NetworkError::Timeout {
                timeout_ms: bound.as_millis() as u64,
            }),
        }
    }
}

/// Background flush loop.
///
/// Waits for a trigger or shutdown, flushes, and only then waits again.
/// Shutdown is observed between flushes, never during one.
async fn run_flusher(inner: Arc<EngineInner>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            // Err means every engine handle was dropped.
            _ = shutdown.changed() => break,
            _ = inner.queue.wait_for_trigger() => {}
        }

        // Failures already reached the affected completions and the log.
        let _ = inner.flush().await;
    }
    debug!("flush task stopped");
}

// =============================================================================
// Tests
// =============================================================================
