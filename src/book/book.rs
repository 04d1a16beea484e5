//! Core order book: price levels, locator, and read-side views.

use crossbeam::atomic::AtomicCell;
use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

use super::level::{PriceLevel, RestingOrder};
use crate::clock::ClockService;
use crate::types::{OrderId, Price, Qty, Side, TimestampMs, UserId};

/// Cached best bid/ask so repeated BBO reads skip the skip-list probe.
/// Invalidated on every mutation that can move the top of book.
#[derive(Debug)]
pub(super) struct BboCache {
    best_bid: AtomicCell<Option<Price>>,
    best_ask: AtomicCell<Option<Price>>,
}

impl BboCache {
    fn new() -> Self {
        Self {
            best_bid: AtomicCell::new(None),
            best_ask: AtomicCell::new(None),
        }
    }

    pub(super) fn invalidate(&self) {
        self.best_bid.store(None);
        self.best_ask.store(None);
    }
}

/// One aggregated depth level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    /// Level price.
    pub price: Price,
    /// Aggregate resting quantity at the level.
    pub quantity: Qty,
}

/// Top-N aggregated view of both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthSnapshot {
    /// Symbol of the book.
    pub symbol: String,
    /// Bid levels, best (highest) first.
    pub bids: Vec<DepthLevel>,
    /// Ask levels, best (lowest) first.
    pub asks: Vec<DepthLevel>,
    /// When the snapshot was taken.
    pub timestamp_ms: TimestampMs,
}

/// A resting order as reported to queries, with its location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenOrder {
    /// Order identifier.
    pub id: OrderId,
    /// Owner.
    pub user_id: UserId,
    /// Side it rests on.
    pub side: Side,
    /// Price it rests at.
    pub price: Price,
    /// Quantity at submission.
    pub quantity: Qty,
    /// Unexecuted quantity.
    pub remaining: Qty,
    /// Arrival time.
    pub timestamp_ms: TimestampMs,
}

/// A price-time priority limit order book for one symbol.
///
/// Bids and asks are concurrent ordered maps keyed by price; each value is
/// a FIFO [`PriceLevel`]. The locator maps order id to (price, side) so
/// cancels and modifies never scan levels. A per-user index backs open
/// order queries and mass cancellation.
#[derive(Debug)]
pub struct OrderBook {
    /// The symbol this book trades.
    pub(super) symbol: String,

    /// Bid levels. SkipMap keeps prices sorted; best bid is the last key.
    pub(super) bids: SkipMap<Price, Arc<PriceLevel>>,

    /// Ask levels. Best ask is the first key.
    pub(super) asks: SkipMap<Price, Arc<PriceLevel>>,

    /// Order id → (price, side) for O(1) location of resting orders.
    pub(super) order_locations: DashMap<OrderId, (Price, Side)>,

    /// User id → resting order ids, for open-order queries and mass cancel.
    pub(super) user_orders: DashMap<UserId, Vec<OrderId>>,

    /// Price of the most recent trade.
    pub(super) last_trade_price: AtomicCell<Price>,

    /// Whether any trade has occurred on this book.
    pub(super) has_traded: AtomicBool,

    /// Cached best prices.
    pub(super) cache: BboCache,

    /// Maker-cancel self-trade prevention, fixed at construction.
    pub(super) stp_enabled: bool,

    /// Clock and trade-id source.
    pub(super) clock: Arc<ClockService>,
}

impl OrderBook {
    /// Create a book for `symbol`. `stp_enabled` turns on maker-cancel
    /// self-trade prevention for every submission to this book.
    #[must_use]
    pub fn new(symbol: &str, stp_enabled: bool, clock: Arc<ClockService>) -> Self {
        Self {
            symbol: symbol.to_string(),
            bids: SkipMap::new(),
            asks: SkipMap::new(),
            order_locations: DashMap::new(),
            user_orders: DashMap::new(),
            last_trade_price: AtomicCell::new(0),
            has_traded: AtomicBool::new(false),
            cache: BboCache::new(),
            stp_enabled,
            clock,
        }
    }

    /// The symbol of this book.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Whether self-trade prevention is active on this book.
    #[must_use]
    #[inline]
    pub fn stp_enabled(&self) -> bool {
        self.stp_enabled
    }

    /// Best bid price, if any. O(1) amortized through the cache.
    pub fn best_bid(&self) -> Option<Price> {
        if let Some(cached) = self.cache.best_bid.load() {
            return Some(cached);
        }
        let best = self.bids.iter().next_back().map(|e| *e.key());
        if let Some(price) = best {
            self.cache.best_bid.store(Some(price));
        }
        best
    }

    /// Best ask price, if any.
    pub fn best_ask(&self) -> Option<Price> {
        if let Some(cached) = self.cache.best_ask.load() {
            return Some(cached);
        }
        let best = self.asks.iter().next().map(|e| *e.key());
        if let Some(price) = best {
            self.cache.best_ask.store(Some(price));
        }
        best
    }

    /// Best bid and best ask.
    #[must_use]
    pub fn bbo(&self) -> (Option<Price>, Option<Price>) {
        (self.best_bid(), self.best_ask())
    }

    /// Price of the last trade, if any trade has occurred.
    pub fn last_trade_price(&self) -> Option<Price> {
        if self.has_traded.load(Ordering::Relaxed) {
            Some(self.last_trade_price.load())
        } else {
            None
        }
    }

    /// Whether an incoming price on `side` would cross the opposing best.
    #[must_use]
    pub fn would_cross(&self, price: Price, side: Side) -> bool {
        match side {
            Side::Buy => self.best_ask().is_some_and(|ask| price >= ask),
            Side::Sell => self.best_bid().is_some_and(|bid| price <= bid),
        }
    }

    /// Top-`n` aggregated levels per side.
    #[must_use]
    pub fn depth(&self, n: usize) -> DepthSnapshot {
        let bids = self
            .bids
            .iter()
            .rev()
            .take(n)
            .map(|e| DepthLevel {
                price: *e.key(),
                quantity: e.value().total_quantity(),
            })
            .collect();
        let asks = self
            .asks
            .iter()
            .take(n)
            .map(|e| DepthLevel {
                price: *e.key(),
                quantity: e.value().total_quantity(),
            })
            .collect();
        DepthSnapshot {
            symbol: self.symbol.clone(),
            bids,
            asks,
            timestamp_ms: self.clock.now_ms(),
        }
    }

    /// Aggregate quantity resting on one side.
    #[must_use]
    pub fn side_quantity(&self, side: Side) -> Qty {
        let levels = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        levels
            .iter()
            .map(|e| e.value().total_quantity())
            .fold(0u64, Qty::saturating_add)
    }

    /// Locate one resting order by id.
    #[must_use]
    pub fn get_order(&self, order_id: OrderId) -> Option<OpenOrder> {
        let (price, side) = *self.order_locations.get(&order_id)?;
        let level = self.level_at(price, side)?;
        let resting = level.get(order_id)?;
        Some(Self::open_order(&resting, price, side))
    }

    /// All resting orders belonging to `user`, in id order.
    #[must_use]
    pub fn orders_for_user(&self, user_id: UserId) -> Vec<OpenOrder> {
        let Some(ids) = self.user_orders.get(&user_id) else {
            return Vec::new();
        };
        let mut ids: Vec<OrderId> = ids.value().clone();
        ids.sort_unstable();
        ids.into_iter()
            .filter_map(|id| self.get_order(id))
            .collect()
    }

    /// Number of orders resting in the book.
    #[must_use]
    pub fn resting_order_count(&self) -> usize {
        self.order_locations.len()
    }

    pub(super) fn level_at(&self, price: Price, side: Side) -> Option<Arc<PriceLevel>> {
        let levels = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        levels.get(&price).map(|e| e.value().clone())
    }

    pub(super) fn open_order(resting: &RestingOrder, price: Price, side: Side) -> OpenOrder {
        OpenOrder {
            id: resting.id,
            user_id: resting.user_id,
            side,
            price,
            quantity: resting.quantity,
            remaining: resting.remaining,
            timestamp_ms: resting.timestamp_ms,
        }
    }

    pub(super) fn track_user_order(&self, user_id: UserId, order_id: OrderId) {
        self.user_orders.entry(user_id).or_default().push(order_id);
    }

    pub(super) fn untrack_user_order(&self, user_id: UserId, order_id: OrderId) {
        if let Some(mut entry) = self.user_orders.get_mut(&user_id) {
            entry.value_mut().retain(|id| *id != order_id);
            if entry.value().is_empty() {
                drop(entry);
                self.user_orders.remove(&user_id);
            }
        }
    }

    /// Verify the structural invariants: no crossed book at rest, locator
    /// consistency, no zero-remaining orders, sides sorted by the SkipMap.
    ///
    /// # Errors
    /// A description of the first violated invariant. A violation is
    /// fatal-class: the engine treats it as `InvariantViolated`.
    pub fn check_invariants(&self) -> Result<(), String> {
        if let (Some(bid), Some(ask)) = self.bbo()
            && bid >= ask
        {
            return Err(format!(
                "crossed book at rest: best bid {bid} >= best ask {ask}"
            ));
        }
        for (side, levels) in [(Side::Buy, &self.bids), (Side::Sell, &self.asks)] {
            for entry in levels.iter() {
                let level = entry.value();
                for order in level.orders() {
                    if order.remaining == 0 {
                        return Err(format!(
                            "zero-remaining order {} at {} {:?}",
                            order.id,
                            level.price(),
                            side
                        ));
                    }
                    match self.order_locations.get(&order.id) {
                        Some(loc) if *loc == (level.price(), side) => {}
                        _ => {
                            return Err(format!(
                                "locator inconsistent for order {} at {} {:?}",
                                order.id,
                                level.price(),
                                side
                            ));
                        }
                    }
                }
            }
        }
        for entry in self.order_locations.iter() {
            let (price, side) = *entry.value();
            let reachable = self
                .level_at(price, side)
                .is_some_and(|level| level.get(*entry.key()).is_some());
            if !reachable {
                return Err(format!(
                    "locator entry for order {} points at no resting order",
                    entry.key()
                ));
            }
        }
        Ok(())
    }

    pub(super) fn record_trade_price(&self, price: Price) {
        self.last_trade_price.store(price);
        self.has_traded.store(true, Ordering::Relaxed);
        trace!("book {}: last trade price {}", self.symbol, price);
    }
}
