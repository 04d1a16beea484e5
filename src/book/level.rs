//! A single price level: a FIFO queue of resting orders at one price.
//!
//! Every order in a level shares the level's price and has strictly
//! positive remaining quantity. The aggregate quantity is mirrored into an
//! atomic so depth reads never take the queue lock.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::{OrderId, Price, Qty, TimestampMs, UserId};

/// An order resting in the book. Owned exclusively by its price level;
/// the rest of the system refers to it by id through the book's locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestingOrder {
    /// Order identifier.
    pub id: OrderId,
    /// Owner.
    pub user_id: UserId,
    /// Quantity at submission (or at the last priority-losing modify).
    pub quantity: Qty,
    /// Unexecuted quantity. Always > 0 while resting.
    pub remaining: Qty,
    /// Arrival time, for price-time priority.
    pub timestamp_ms: TimestampMs,
    /// Whether the order was submitted post-only. A post-only resting
    /// order may not be modified to a crossing price.
    pub post_only: bool,
}

/// One fill against a resting maker.
#[derive(Debug, Clone)]
pub struct LevelFill {
    /// The maker order matched.
    pub maker_order_id: OrderId,
    /// The maker's owner.
    pub maker_user_id: UserId,
    /// Quantity executed.
    pub quantity: Qty,
    /// Maker remaining after this fill; 0 means fully consumed and
    /// removed from the level.
    pub maker_remaining_after: Qty,
}

/// Outcome of matching an incoming quantity against one level.
#[derive(Debug, Default)]
pub struct LevelMatch {
    /// Fills in FIFO order.
    pub fills: Vec<LevelFill>,
    /// Same-user makers cancelled by self-trade prevention.
    pub stp_cancelled: Vec<RestingOrder>,
    /// Taker quantity still unexecuted after this level.
    pub remaining: Qty,
}

/// A price level. The queue is guarded by a mutex (book mutations for a
/// symbol are serialized by the matching worker); `total_quantity` is
/// atomic so BBO/depth readers stay off the lock.
#[derive(Debug)]
pub struct PriceLevel {
    price: Price,
    total_quantity: AtomicU64,
    orders: Mutex<VecDeque<RestingOrder>>,
}

impl PriceLevel {
    /// Create an empty level at `price`.
    #[must_use]
    pub fn new(price: Price) -> Self {
        Self {
            price,
            total_quantity: AtomicU64::new(0),
            orders: Mutex::new(VecDeque::new()),
        }
    }

    /// The level's price key.
    #[must_use]
    #[inline]
    pub fn price(&self) -> Price {
        self.price
    }

    /// Aggregate remaining quantity at this level.
    #[must_use]
    #[inline]
    pub fn total_quantity(&self) -> Qty {
        self.total_quantity.load(Ordering::Acquire)
    }

    /// Number of resting orders at this level.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.lock().len()
    }

    /// Append an order at the back of the time-priority queue.
    pub fn push_back(&self, order: RestingOrder) {
        debug_assert!(order.remaining > 0);
        let mut queue = self.lock();
        self.total_quantity
            .fetch_add(order.remaining, Ordering::AcqRel);
        queue.push_back(order);
    }

    /// Match up to `taker_remaining` against this level in FIFO order.
    ///
    /// With `stp` enabled, makers owned by `taker_user` are cancelled
    /// (removed without matching) and reported in
    /// [`LevelMatch::stp_cancelled`]; the taker then continues against the
    /// next maker in the queue.
    pub fn match_fifo(&self, taker_remaining: Qty, taker_user: UserId, stp: bool) -> LevelMatch {
        let mut result = LevelMatch {
            remaining: taker_remaining,
            ..LevelMatch::default()
        };
        let mut queue = self.lock();

        while result.remaining > 0 {
            let Some(front) = queue.front_mut() else {
                break;
            };

            if stp && front.user_id == taker_user {
                if let Some(cancelled) = queue.pop_front() {
                    self.total_quantity
                        .fetch_sub(cancelled.remaining, Ordering::AcqRel);
                    result.stp_cancelled.push(cancelled);
                }
                continue;
            }

            let fill_qty = result.remaining.min(front.remaining);
            front.remaining -= fill_qty;
            result.remaining -= fill_qty;
            self.total_quantity.fetch_sub(fill_qty, Ordering::AcqRel);

            result.fills.push(LevelFill {
                maker_order_id: front.id,
                maker_user_id: front.user_id,
                quantity: fill_qty,
                maker_remaining_after: front.remaining,
            });

            if front.remaining == 0 {
                queue.pop_front();
            }
        }

        result
    }

    /// Remove an order from the level. Returns the removed order, or
    /// `None` if the id is not at this level.
    pub fn remove(&self, order_id: OrderId) -> Option<RestingOrder> {
        let mut queue = self.lock();
        let index = queue.iter().position(|o| o.id == order_id)?;
        let removed = queue.remove(index)?;
        self.total_quantity
            .fetch_sub(removed.remaining, Ordering::AcqRel);
        Some(removed)
    }

    /// Decrease an order's remaining quantity in place, preserving its
    /// queue position. `new_remaining` must be a strict decrease and > 0;
    /// anything else returns `None` and leaves the level untouched.
    pub fn reduce_quantity(&self, order_id: OrderId, new_remaining: Qty) -> Option<RestingOrder> {
        let mut queue = self.lock();
        let order = queue.iter_mut().find(|o| o.id == order_id)?;
        if new_remaining == 0 || new_remaining >= order.remaining {
            return None;
        }
        let delta = order.remaining - new_remaining;
        order.remaining = new_remaining;
        self.total_quantity.fetch_sub(delta, Ordering::AcqRel);
        Some(order.clone())
    }

    /// Snapshot the resting orders in queue order.
    #[must_use]
    pub fn orders(&self) -> Vec<RestingOrder> {
        self.lock().iter().cloned().collect()
    }

    /// Find one resting order by id.
    #[must_use]
    pub fn get(&self, order_id: OrderId) -> Option<RestingOrder> {
        self.lock().iter().find(|o| o.id == order_id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<RestingOrder>> {
        self.orders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
