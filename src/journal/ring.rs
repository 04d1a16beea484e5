//! In-memory journal implementations.
//!
//! The journal inside the core is a contract, not storage: `append` is the
//! only synchronous dependency on the submission path, so it must never
//! block. [`RingJournal`] is a bounded ring drained by an external writer;
//! a full ring rejects the submission with backpressure rather than
//! stalling the matching thread. [`MemoryJournal`] is unbounded, for tests
//! and replay verification.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use super::error::JournalError;
use super::types::{JournalEvent, JournaledEvent};
use crate::types::TimestampMs;

/// An append-only event journal. Write-ahead: `append` is called before
/// the state-changing operation is acknowledged, and an `Err` aborts the
/// operation.
pub trait Journal: Send + Sync {
    /// Append an event, returning its sequence number.
    ///
    /// # Errors
    /// [`JournalError::RingFull`] when the implementation is at capacity.
    fn append(&self, ts_ms: TimestampMs, event: &JournalEvent) -> Result<u64, JournalError>;

    /// Every retained event in sequence order. Replay input at startup.
    fn read_all(&self) -> Vec<JournaledEvent>;

    /// Sequence number of the last appended event, or `None` if empty.
    fn last_sequence(&self) -> Option<u64>;
}

/// Bounded ring buffer journal. The external persistence adapter drains
/// entries with [`RingJournal::drain`]; the matching path only ever
/// appends.
#[derive(Debug)]
pub struct RingJournal {
    entries: Mutex<VecDeque<JournaledEvent>>,
    capacity: usize,
    next_seq: AtomicU64,
}

impl RingJournal {
    /// A ring holding at most `capacity` undrained events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
            next_seq: AtomicU64::new(1),
        }
    }

    /// Remove and return up to `max` entries from the front of the ring.
    pub fn drain(&self, max: usize) -> Vec<JournaledEvent> {
        let mut entries = self.lock();
        let n = max.min(entries.len());
        entries.drain(..n).collect()
    }

    /// Number of undrained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the ring holds no undrained entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<JournaledEvent>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Journal for RingJournal {
    fn append(&self, ts_ms: TimestampMs, event: &JournalEvent) -> Result<u64, JournalError> {
        let mut entries = self.lock();
        if entries.len() >= self.capacity {
            return Err(JournalError::RingFull {
                capacity: self.capacity,
            });
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        entries.push_back(JournaledEvent {
            seq,
            ts_ms,
            event: event.clone(),
        });
        Ok(seq)
    }

    fn read_all(&self) -> Vec<JournaledEvent> {
        self.lock().iter().cloned().collect()
    }

    fn last_sequence(&self) -> Option<u64> {
        let last = self.next_seq.load(Ordering::Relaxed) - 1;
        (last > 0).then_some(last)
    }
}

/// Unbounded journal retaining every event. Backs replay tests and the
/// recovery path.
#[derive(Debug)]
pub struct MemoryJournal {
    entries: Mutex<Vec<JournaledEvent>>,
    next_seq: AtomicU64,
}

impl MemoryJournal {
    /// An empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_seq: AtomicU64::new(1),
        }
    }
}

impl Default for MemoryJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl Journal for MemoryJournal {
    fn append(&self, ts_ms: TimestampMs, event: &JournalEvent) -> Result<u64, JournalError> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        entries.push(JournaledEvent {
            seq,
            ts_ms,
            event: event.clone(),
        });
        Ok(seq)
    }

    fn read_all(&self) -> Vec<JournaledEvent> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn last_sequence(&self) -> Option<u64> {
        let last = self.next_seq.load(Ordering::Relaxed).saturating_sub(1);
        (last > 0).then_some(last)
    }
}
