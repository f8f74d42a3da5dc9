//! # Batch Queue
//!
//! Ordered buffer of digested records waiting to be sealed. Producers call
//! [`BatchQueue::enqueue`]; the flush side drains with
//! [`BatchQueue::take_batch`].
//!
//! ## Flush Triggers
//!
//! A batch is due when either:
//!
//! - the queue holds `max_batch_size` records (size trigger), or
//! - `batch_timeout` has elapsed since the oldest queued record was
//!   enqueued (time trigger)
//!
//! A timeout too large to represent as an `Instant` disables the time
//! trigger.
//!
//! ## Capacity
//!
//! At most `capacity` records wait in the queue. Each queued record holds a
//! semaphore permit that is released once its batch is handed to a flush.
//! [`BatchQueue::enqueue_wait`] waits for a permit; [`BatchQueue::enqueue`]
//! fails with `Error::QueueFull` instead.
//!
//! ```text
//!  enqueue ──► [r1 r2 r3 ...] ──take_batch──► Batch { id, r1..rN }
//!                   │                              │
//!           first record arms            ownership moves to the
//!           the deadline; size           flush; the queue is
//!           limit wakes the flusher      already accepting r(N+1)
//! ```
//!
//! ## Invariants
//!
//! - All state sits behind one mutex, so `enqueue` and `take_batch` never
//!   interleave: no record is dropped or appears in two batches.
//! - Records are digested before they are queued. An invalid record never
//!   enters the queue.
//! - `take_batch` preserves enqueue order. Leaf order is fixed there.
//! - Every queued record carries exactly one completion sender.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{oneshot, Notify, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::time::{sleep_until, Instant};

use crate::codec::hash_record;
use crate::commitment::RecordCommitment;
use crate::error::{Error, Result};
use crate::types::{BatchId, Digest, Record};

// =============================================================================
// Pending Records
// =============================================================================

/// A queued record and the sender that resolves its completion.
struct PendingRecord {
    digest: Digest,
    enqueued_at: Instant,
    completion: oneshot::Sender<Result<RecordCommitment>>,
    _slot: OwnedSemaphorePermit,
}

/// Completion handle returned to the producer.
///
/// Resolves exactly once, when the batch containing the record is sealed:
/// with the record's commitment, or with the error that sealing failed with.
#[derive(Debug)]
pub struct PendingCompression {
    digest: Digest,
    rx: oneshot::Receiver<Result<RecordCommitment>>,
}

impl PendingCompression {
    /// Digest of the queued record. Known before the batch is sealed.
    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// Waits for the batch to be sealed.
    ///
    /// Returns `Error::Dropped` if the engine went away without resolving
    /// the completion.
    pub async fn wait(self) -> Result<RecordCommitment> {
        self.rx.await.map_err(|_| Error::Dropped)?
    }

    /// Takes the result if the batch has already been sealed.
    pub fn try_resolve(&mut self) -> Option<Result<RecordCommitment>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(Error::Dropped)),
        }
    }
}

// =============================================================================
// Batch
// =============================================================================

/// Records drained from the queue for one flush.
///
/// Owned by exactly one flush; never mutated after `take_batch`.
pub struct Batch {
    id: BatchId,
    entries: Vec<PendingRecord>,
}

impl Batch {
    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Leaf digests in batch order.
    pub fn digests(&self) -> Vec<Digest> {
        self.entries.iter().map(|entry| entry.digest).collect()
    }

    /// Splits the batch into its leaves and the completion senders, both in
    /// batch order. Frees the batch's queue slots.
    pub fn into_completions(self) -> (BatchId, Vec<Digest>, Vec<oneshot::Sender<Result<RecordCommitment>>>) {
        let mut digests = Vec::with_capacity(self.entries.len());
        let mut completions = Vec::with_capacity(self.entries.len());
        for entry in self.entries {
            digests.push(entry.digest);
            completions.push(entry.completion);
        }
        (self.id, digests, completions)
    }
}

// =============================================================================
// Queue
// =============================================================================

struct QueueState {
    entries: Vec<PendingRecord>,
    next_batch_id: BatchId,
    closed: bool,
}

/// Bounded, ordered buffer of pending records.
pub struct BatchQueue {
    state: Mutex<QueueState>,
    max_batch_size: usize,
    batch_timeout: Duration,
    capacity: usize,
    slots: Arc<Semaphore>,
    /// Woken when the first record arms the deadline or the size trigger fires.
    wake: Notify,
}

impl BatchQueue {
    /// `capacity` is raised to at least `max_batch_size`, so the size
    /// trigger can always fire.
    pub fn new(max_batch_size: usize, batch_timeout: Duration, capacity: usize) -> Self {
        let max_batch_size = max_batch_size.max(1);
        let capacity = capacity.clamp(max_batch_size, Semaphore::MAX_PERMITS);
        Self {
            state: Mutex::new(QueueState {
                entries: Vec::new(),
                next_batch_id: BatchId::FIRST,
                closed: false,
            }),
            max_batch_size,
            batch_timeout,
            capacity,
            slots: Arc::new(Semaphore::new(capacity)),
            wake: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Every mutation is a single push or drain.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Digests `record` and appends it to the open batch without waiting.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidRecord` if the record cannot be canonicalized
    /// - `Error::QueueFull` if `capacity` records are already queued
    /// - `Error::ShutDown` once the queue has been closed
    pub fn enqueue(&self, record: Record) -> Result<PendingCompression> {
        let digest = hash_record(&record)?;
        let slot = match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(slot) => slot,
            Err(TryAcquireError::NoPermits) => {
                return Err(Error::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(TryAcquireError::Closed) => return Err(Error::ShutDown),
        };
        self.push(digest, slot)
    }

    /// Like [`enqueue`](Self::enqueue), but waits for a free slot when the
    /// queue is full.
    ///
    /// Cancel-safe: nothing is queued until a slot has been acquired.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidRecord` if the record cannot be canonicalized
    /// - `Error::ShutDown` once the queue has been closed, including while
    ///   waiting
    pub async fn enqueue_wait(&self, record: Record) -> Result<PendingCompression> {
        let digest = hash_record(&record)?;
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| Error::ShutDown)?;
        self.push(digest, slot)
    }

    fn push(&self, digest: Digest, slot: OwnedSemaphorePermit) -> Result<PendingCompression> {
        let (tx, rx) = oneshot::channel();

        let len = {
            let mut state = self.lock();
            if state.closed {
                return Err(Error::ShutDown);
            }
            state.entries.push(PendingRecord {
                digest,
                enqueued_at: Instant::now(),
                completion: tx,
                _slot: slot,
            });
            state.entries.len()
        };

        tracing::debug!(digest = %digest, queue_size = len, "record enqueued");

        if len == 1 || len >= self.max_batch_size {
            self.wake.notify_one();
        }

        Ok(PendingCompression { digest, rx })
    }

    /// Whether either flush trigger has fired.
    pub fn should_flush(&self) -> bool {
        let state = self.lock();
        self.is_due(&state, Instant::now())
    }

    fn is_due(&self, state: &QueueState, now: Instant) -> bool {
        if state.entries.len() >= self.max_batch_size {
            return true;
        }
        self.deadline_of(state).is_some_and(|deadline| now >= deadline)
    }

    /// `None` when empty or when the deadline is past what `Instant` can hold.
    fn deadline_of(&self, state: &QueueState) -> Option<Instant> {
        state
            .entries
            .first()
            .and_then(|oldest| oldest.enqueued_at.checked_add(self.batch_timeout))
    }

    /// Drains up to `max_batch_size` records, oldest first.
    ///
    /// Returns `None` when the queue is empty. Batch ids are assigned here,
    /// so ids of non-empty batches are consecutive.
    pub fn take_batch(&self) -> Option<Batch> {
        let mut state = self.lock();
        if state.entries.is_empty() {
            return None;
        }

        let take = state.entries.len().min(self.max_batch_size);
        let entries: Vec<PendingRecord> = state.entries.drain(..take).collect();
        let id = state.next_batch_id;
        state.next_batch_id = id.next();

        Some(Batch { id, entries })
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// When the time trigger will fire, if anything is queued.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline_of(&self.lock())
    }

    /// Time until the next flush, if anything is queued and a flush is
    /// scheduled.
    ///
    /// Zero when a flush is already due.
    pub fn next_flush_eta(&self) -> Option<Duration> {
        let state = self.lock();
        let now = Instant::now();
        if self.is_due(&state, now) {
            return Some(Duration::ZERO);
        }
        self.deadline_of(&state)
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Sleeps until a flush trigger fires.
    ///
    /// Cancel-safe: dropping the future loses no wakeups, since `Notify`
    /// keeps a permit for the next waiter.
    pub async fn wait_for_trigger(&self) {
        loop {
            if self.should_flush() {
                return;
            }
            match self.deadline() {
                Some(deadline) => {
                    tokio::select! {
                        _ = sleep_until(deadline) => {}
                        _ = self.wake.notified() => {}
                    }
                }
                None => self.wake.notified().await,
            }
        }
    }

    /// Stops accepting records. Already queued records stay until drained.
    ///
    /// Producers waiting in [`enqueue_wait`](Self::enqueue_wait) get
    /// `Error::ShutDown`.
    pub fn close(&self) {
        self.lock().closed = true;
        self.slots.close();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentRef, MessageType, RecordKind};

    const HASH_REF: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    fn record(n: u64) -> Record {
        Record::new(
            RecordKind::ChannelMessage(MessageType::Text),
            "general",
            "alice",
            ContentRef::new(HASH_REF),
            n,
        )
    }

    #[test]
    fn test_size_trigger() {
        let queue = BatchQueue::new(3, Duration::from_secs(60), 100);
        queue.enqueue(record(1)).unwrap();
        queue.enqueue(record(2)).unwrap();
        assert!(!queue.should_flush());
        queue.enqueue(record(3)).unwrap();
        assert!(queue.should_flush());
        assert_eq!(queue.next_flush_eta(), Some(Duration::ZERO));
    }

    #[test]
    fn test_take_batch_preserves_order_and_bound() {
        let queue = BatchQueue::new(2, Duration::from_secs(60), 100);
        let pending: Vec<_> = (0..5).map(|n| queue.enqueue(record(n)).unwrap()).collect();

        let first = queue.take_batch().unwrap();
        assert_eq!(first.id(), BatchId::FIRST);
        assert_eq!(first.digests(), vec![*pending[0].digest(), *pending[1].digest()]);

        let second = queue.take_batch().unwrap();
        assert_eq!(second.id().as_raw(), 2);
        assert_eq!(second.len(), 2);

        let third = queue.take_batch().unwrap();
        assert_eq!(third.digests(), vec![*pending[4].digest()]);

        assert!(queue.take_batch().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_invalid_record_never_enters_queue() {
        let queue = BatchQueue::new(10, Duration::from_secs(60), 100);
        let bad = Record::new(RecordKind::ParticipantJoined, "", "alice", ContentRef::new(HASH_REF), 0);
        assert!(matches!(queue.enqueue(bad), Err(Error::InvalidRecord { .. })));
        assert_eq!(queue.len(), 0);
        assert!(queue.deadline().is_none());
    }

    #[test]
    fn test_closed_queue_rejects() {
        let queue = BatchQueue::new(10, Duration::from_secs(60), 100);
        queue.enqueue(record(1)).unwrap();
        queue.close();
        assert_eq!(queue.enqueue(record(2)).unwrap_err(), Error::ShutDown);
        // Already queued records can still be drained.
        assert_eq!(queue.take_batch().unwrap().len(), 1);
    }

    #[test]
    fn test_eta_empty_queue() {
        let queue = BatchQueue::new(10, Duration::from_secs(60), 100);
        assert_eq!(queue.next_flush_eta(), None);
        queue.enqueue(record(1)).unwrap();
        let eta = queue.next_flush_eta().unwrap();
        assert!(eta > Duration::from_secs(59) && eta <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_time_trigger() {
        let queue = BatchQueue::new(10, Duration::from_millis(20), 100);
        queue.enqueue(record(1)).unwrap();
        assert!(!queue.should_flush());

        tokio::time::timeout(Duration::from_secs(2), queue.wait_for_trigger())
            .await
            .unwrap();
        assert!(queue.should_flush());
    }

    #[test]
    fn test_unrepresentable_timeout_disables_time_trigger() {
        let queue = BatchQueue::new(2, Duration::MAX, 100);
        queue.enqueue(record(1)).unwrap();
        assert!(!queue.should_flush());
        assert!(queue.deadline().is_none());
        assert_eq!(queue.next_flush_eta(), None);

        // Size trigger still fires.
        queue.enqueue(record(2)).unwrap();
        assert!(queue.should_flush());
        assert_eq!(queue.next_flush_eta(), Some(Duration::ZERO));
    }

    #[test]
    fn test_full_queue_rejects_until_drained() {
        let queue = BatchQueue::new(2, Duration::from_secs(60), 3);
        for n in 0..3 {
            queue.enqueue(record(n)).unwrap();
        }
        assert_eq!(queue.enqueue(record(3)).unwrap_err(), Error::QueueFull { capacity: 3 });

        let batch = queue.take_batch().unwrap();
        // Slots are held until the flush consumes the batch.
        assert!(queue.enqueue(record(3)).is_err());
        drop(batch.into_completions());

        queue.enqueue(record(3)).unwrap();
        queue.enqueue(record(4)).unwrap();
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_capacity_never_below_batch_size() {
        let queue = BatchQueue::new(5, Duration::from_secs(60), 1);
        assert_eq!(queue.capacity(), 5);
    }

    #[tokio::test]
    async fn test_enqueue_wait_resumes_when_slots_free() {
        let queue = Arc::new(BatchQueue::new(1, Duration::from_secs(60), 1));
        queue.enqueue(record(1)).unwrap();

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.enqueue_wait(record(2)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        let (_, _, completions) = queue.take_batch().unwrap().into_completions();
        let pending = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(queue.len(), 1);
        drop(completions);
        drop(pending);
    }

    #[tokio::test]
    async fn test_close_releases_waiting_producers() {
        let queue = Arc::new(BatchQueue::new(1, Duration::from_secs(60), 1));
        queue.enqueue(record(1)).unwrap();

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.enqueue_wait(record(2)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let result = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.unwrap_err(), Error::ShutDown);
    }

    #[tokio::test]
    async fn test_dropped_completion_reports_dropped() {
        let queue = BatchQueue::new(10, Duration::from_secs(60), 100);
        let mut pending = queue.enqueue(record(1)).unwrap();
        assert!(pending.try_resolve().is_none());

        let batch = queue.take_batch().unwrap();
        let (_, _, completions) = batch.into_completions();
        drop(completions);

        assert_eq!(pending.wait().await.unwrap_err(), Error::Dropped);
    }
}
