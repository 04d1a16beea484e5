//! Monotonic logical time and sequential identifier allocation.
//!
//! Timestamps are required to be nondecreasing for correct price-time
//! tie-breaking and deterministic replay. Order and trade identifiers are
//! sequential 64-bit values, unique across the process lifetime and,
//! together with the journal, across restarts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A monotonic nondecreasing millisecond clock.
///
/// `Clock::system()` follows wall time but clamps backwards jumps so two
/// successive reads never decrease. `Clock::manual(start)` is fully
/// controlled by `advance`/`set`, used by tests that exercise staleness
/// thresholds, trading hours, and hedge throttling.
#[derive(Debug)]
pub struct Clock {
    last_ms: AtomicU64,
    manual: bool,
}

impl Clock {
    /// A clock driven by `SystemTime`, clamped monotonic.
    #[must_use]
    pub fn system() -> Self {
        Self {
            last_ms: AtomicU64::new(wall_clock_ms()),
            manual: false,
        }
    }

    /// A manually driven clock starting at `start_ms`.
    #[must_use]
    pub fn manual(start_ms: u64) -> Self {
        Self {
            last_ms: AtomicU64::new(start_ms),
            manual: true,
        }
    }

    /// Current time in milliseconds. Never decreases.
    pub fn now_ms(&self) -> u64 {
        if self.manual {
            return self.last_ms.load(Ordering::Acquire);
        }
        let wall = wall_clock_ms();
        self.last_ms.fetch_max(wall, Ordering::AcqRel).max(wall)
    }

    /// Advance a manual clock by `delta_ms`. No-op scale for system clocks
    /// is intentional: advancing wall time is not this component's job.
    pub fn advance(&self, delta_ms: u64) {
        self.last_ms.fetch_add(delta_ms, Ordering::AcqRel);
    }

    /// Set a manual clock to an absolute time, clamped nondecreasing.
    pub fn set(&self, now_ms: u64) {
        self.last_ms.fetch_max(now_ms, Ordering::AcqRel);
    }
}

fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Sequential 64-bit identifier allocator.
///
/// The first allocated id is 1; 0 is reserved as a sentinel.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    /// Allocator starting at id 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next identifier.
    #[inline]
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// The last identifier handed out, or 0 if none.
    pub fn last_id(&self) -> u64 {
        self.next.load(Ordering::Relaxed).saturating_sub(1)
    }

    /// Ensure future ids are strictly greater than `id`. Called during
    /// journal replay so recovered ids never collide with new ones.
    pub fn resume_after(&self, id: u64) {
        self.next.fetch_max(id + 1, Ordering::Relaxed);
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// The clock and id service handed to every component that stamps time or
/// allocates identifiers. Order and trade ids are separate sequences.
#[derive(Debug)]
pub struct ClockService {
    /// The shared monotonic clock.
    pub clock: Clock,
    /// Order id sequence.
    pub order_ids: IdAllocator,
    /// Trade id sequence.
    pub trade_ids: IdAllocator,
}

impl ClockService {
    /// Service backed by the system clock.
    #[must_use]
    pub fn system() -> Self {
        Self {
            clock: Clock::system(),
            order_ids: IdAllocator::new(),
            trade_ids: IdAllocator::new(),
        }
    }

    /// Service backed by a manual clock, for tests and replay.
    #[must_use]
    pub fn manual(start_ms: u64) -> Self {
        Self {
            clock: Clock::manual(start_ms),
            order_ids: IdAllocator::new(),
            trade_ids: IdAllocator::new(),
        }
    }

    /// Current time in milliseconds.
    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}
