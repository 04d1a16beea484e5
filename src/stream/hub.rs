//! The stream hub: fan-out of core events to subscribers.
//!
//! Publication never blocks the match path: each subscriber has a bounded
//! queue pushed under a short lock, and delivery to the consumer happens
//! on the subscriber's own task. Submitter acknowledgements never wait on
//! delivery.

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::event::{Envelope, StreamEvent};
use super::subscriber::{PushOutcome, Subscriber, SubscriptionFilter};
use crate::clock::ClockService;

const CHANNEL_COUNT: usize = 6;

/// The publish/subscribe bus.
#[derive(Debug)]
pub struct StreamHub {
    subscribers: DashMap<u64, Arc<Subscriber>>,
    next_subscriber_id: AtomicU64,
    seqs: [AtomicU64; CHANNEL_COUNT],
    queue_depth: usize,
    block_budget: usize,
    clock: Arc<ClockService>,
}

impl StreamHub {
    /// A hub with the given per-subscriber queue depth and blockage
    /// budget (undeliverable non-droppable events tolerated before
    /// disconnection).
    #[must_use]
    pub fn new(clock: Arc<ClockService>, queue_depth: usize, block_budget: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            next_subscriber_id: AtomicU64::new(1),
            seqs: Default::default(),
            queue_depth,
            block_budget,
            clock,
        }
    }

    /// Register a subscriber. The returned handle is the receive side;
    /// dropping it without unsubscribing leaves a dead queue that the
    /// disconnect budget will eventually reap.
    pub fn subscribe(&self, filter: SubscriptionFilter) -> Arc<Subscriber> {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Arc::new(Subscriber::new(
            id,
            filter,
            self.queue_depth,
            self.block_budget,
        ));
        self.subscribers.insert(id, Arc::clone(&subscriber));
        debug!("stream hub: subscriber {id} registered");
        subscriber
    }

    /// Remove a subscriber.
    pub fn unsubscribe(&self, subscriber_id: u64) {
        if let Some((_, subscriber)) = self.subscribers.remove(&subscriber_id) {
            subscriber.wake();
            debug!("stream hub: subscriber {subscriber_id} removed");
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Publish one event to every matching subscriber. Assigns the
    /// per-channel sequence number and returns it.
    pub fn publish(&self, event: StreamEvent) -> u64 {
        let channel = event.channel();
        let seq = self.seqs[channel.index()].fetch_add(1, Ordering::Relaxed) + 1;
        let envelope = Envelope {
            seq,
            ts: self.clock.now_ms(),
            event,
        };

        let mut to_remove = Vec::new();
        for entry in self.subscribers.iter() {
            let subscriber = entry.value();
            if !subscriber.filter.matches(&envelope.event) {
                continue;
            }
            match subscriber.push(envelope.clone()) {
                PushOutcome::Disconnect => {
                    warn!(
                        "stream hub: subscriber {} blocked past budget, disconnecting",
                        subscriber.id()
                    );
                    to_remove.push(subscriber.id());
                }
                PushOutcome::Dropped | PushOutcome::Coalesced => {}
                PushOutcome::Queued | PushOutcome::Overflowed => {}
            }
        }
        for id in to_remove {
            self.subscribers.remove(&id);
        }
        seq
    }
}
