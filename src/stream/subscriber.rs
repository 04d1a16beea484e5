//! Per-subscriber bounded queue with latest-wins coalescing.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

use super::event::{ChannelMask, Envelope, StreamEvent};
use crate::types::UserId;

/// What a subscriber wants to see. `symbol`/`user_id` of `None` means
/// unscoped; user-carrying events (`position`, `order-status`) are only
/// delivered unscoped or to their own user.
#[derive(Debug, Clone)]
pub struct SubscriptionFilter {
    /// Channels to receive.
    pub channels: ChannelMask,
    /// Restrict to one symbol.
    pub symbol: Option<String>,
    /// Restrict user-scoped channels to one user.
    pub user_id: Option<UserId>,
}

impl SubscriptionFilter {
    /// Everything, unscoped. Operator-grade.
    #[must_use]
    pub fn all() -> Self {
        Self {
            channels: ChannelMask::ALL,
            symbol: None,
            user_id: None,
        }
    }

    /// Whether `event` passes this filter.
    #[must_use]
    pub fn matches(&self, event: &StreamEvent) -> bool {
        if !self.channels.contains(event.channel().mask()) {
            return false;
        }
        if let (Some(want), Some(has)) = (self.symbol.as_deref(), event.symbol())
            && want != has
        {
            return false;
        }
        if let (Some(want), Some(has)) = (self.user_id, event.user_id())
            && want != has
        {
            return false;
        }
        true
    }
}

/// Outcome of one push onto a subscriber queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum PushOutcome {
    /// Enqueued normally.
    Queued,
    /// Replaced (or evicted) an older coalescable event.
    Coalesced,
    /// A droppable event was discarded because nothing could make room.
    Dropped,
    /// A non-droppable event was queued beyond capacity.
    Overflowed,
    /// The subscriber exceeded its blockage budget and must be removed.
    Disconnect,
}

/// One subscriber: a bounded queue drained by an async consumer.
///
/// Overflow policy per the hub contract: `quote`/`depth` are coalesced
/// per (channel, symbol) with only the latest retained; `trade`,
/// `position`, `order-status` and `operator-alert` are never dropped;
/// they stack beyond capacity until the blockage budget disconnects the
/// subscriber.
#[derive(Debug)]
pub struct Subscriber {
    pub(super) id: u64,
    pub(super) filter: SubscriptionFilter,
    queue: Mutex<VecDeque<Envelope>>,
    notify: Notify,
    capacity: usize,
    block_budget: usize,
    disconnected: AtomicBool,
}

impl Subscriber {
    pub(super) fn new(
        id: u64,
        filter: SubscriptionFilter,
        capacity: usize,
        block_budget: usize,
    ) -> Self {
        Self {
            id,
            filter,
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            notify: Notify::new(),
            capacity: capacity.max(1),
            block_budget,
            disconnected: AtomicBool::new(false),
        }
    }

    /// Subscriber id assigned by the hub.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the hub disconnected this subscriber.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    /// Queued event count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub(super) fn push(&self, envelope: Envelope) -> PushOutcome {
        if self.is_disconnected() {
            return PushOutcome::Dropped;
        }
        let mut queue = self.lock();

        if queue.len() < self.capacity {
            queue.push_back(envelope);
            drop(queue);
            self.notify.notify_one();
            return PushOutcome::Queued;
        }

        if envelope.event.coalescable() {
            let key = (envelope.event.channel(), envelope.event.symbol().map(str::to_owned));
            // Latest wins: replace the queued event with the same key.
            if let Some(slot) = queue.iter_mut().find(|queued| {
                queued.event.channel() == key.0
                    && queued.event.symbol() == key.1.as_deref()
            }) {
                *slot = envelope;
                drop(queue);
                self.notify.notify_one();
                return PushOutcome::Coalesced;
            }
            // No same-key entry: evict the oldest coalescable event.
            if let Some(index) = queue.iter().position(|queued| queued.event.coalescable()) {
                queue.remove(index);
                queue.push_back(envelope);
                drop(queue);
                self.notify.notify_one();
                return PushOutcome::Coalesced;
            }
            return PushOutcome::Dropped;
        }

        // Never dropped: stack beyond capacity, within the budget.
        queue.push_back(envelope);
        let overage = queue.len() - self.capacity;
        drop(queue);
        self.notify.notify_one();
        if overage > self.block_budget {
            self.disconnected.store(true, Ordering::Release);
            return PushOutcome::Disconnect;
        }
        PushOutcome::Overflowed
    }

    /// Pop the next event without waiting.
    pub fn try_recv(&self) -> Option<Envelope> {
        self.lock().pop_front()
    }

    /// Await the next event. Returns `None` once disconnected and
    /// drained.
    pub async fn recv(&self) -> Option<Envelope> {
        loop {
            if let Some(envelope) = self.try_recv() {
                return Some(envelope);
            }
            if self.is_disconnected() {
                return None;
            }
            self.notify.notified().await;
        }
    }

    pub(super) fn wake(&self) {
        self.notify.notify_one();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Envelope>> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
