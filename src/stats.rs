//! Compression counters.
//!
//! Updated by the flush path only; read at any time without touching the
//! queue lock.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

/// Point-in-time copy of the engine's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompressionStats {
    pub batches_sealed: u64,
    pub records_committed: u64,
    pub network_commits: u64,
    pub fallback_commits: u64,
    pub fallback_failures: u64,
    pub largest_batch: usize,
    pub last_fallback_reason: Option<String>,
}

impl CompressionStats {
    /// Share of sealed batches that went through the fallback, 0.0 to 1.0.
    pub fn fallback_ratio(&self) -> f64 {
        if self.batches_sealed == 0 {
            0.0
        } else {
            self.fallback_commits as f64 / self.batches_sealed as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    batches_sealed: AtomicU64,
    records_committed: AtomicU64,
    network_commits: AtomicU64,
    fallback_commits: AtomicU64,
    fallback_failures: AtomicU64,
    largest_batch: AtomicUsize,
    last_fallback_reason: Mutex<Option<String>>,
}

impl StatsRecorder {
    pub(crate) fn record_network(&self) {
        self.network_commits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fallback(&self, reason: &str) {
        self.fallback_commits.fetch_add(1, Ordering::Relaxed);
        *self
            .last_fallback_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(reason.to_string());
    }

    pub(crate) fn record_fallback_failure(&self) {
        self.fallback_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sealed(&self, leaf_count: usize) {
        self.batches_sealed.fetch_add(1, Ordering::Relaxed);
        self.records_committed
            .fetch_add(leaf_count as u64, Ordering::Relaxed);
        self.largest_batch.fetch_max(leaf_count, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CompressionStats {
        CompressionStats {
            batches_sealed: self.batches_sealed.load(Ordering::Relaxed),
            records_committed: self.records_committed.load(Ordering::Relaxed),
            network_commits: self.network_commits.load(Ordering::Relaxed),
            fallback_commits: self.fallback_commits.load(Ordering::Relaxed),
            fallback_failures: self.fallback_failures.load(Ordering::Relaxed),
            largest_batch: self.largest_batch.load(Ordering::Relaxed),
            last_fallback_reason: self
                .last_fallback_reason
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}
