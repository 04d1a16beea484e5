//! Matching walk: an incoming order against the opposing side.
//!
//! Iterates opposing levels in price priority (already sorted by the
//! SkipMap), matching FIFO within each level, until the taker is filled,
//! the limit bound stops it, or the side is exhausted. Maker-cancel
//! self-trade prevention runs inside each level so the taker keeps
//! matching against the next maker.

use std::sync::Arc;

use tracing::trace;

use super::book::OrderBook;
use super::level::PriceLevel;
use super::trade::{CancelledMaker, Trade};
use crate::types::{Price, Qty, Side, UserId};

/// Internal accumulator for one matching walk.
#[derive(Debug, Default)]
pub(super) struct MatchWalk {
    pub(super) trades: Vec<Trade>,
    pub(super) filled_maker_ids: Vec<crate::types::OrderId>,
    pub(super) stp_cancelled: Vec<CancelledMaker>,
}

impl OrderBook {
    /// Match `remaining` of an incoming order against the opposing side.
    ///
    /// `limit_price` of `None` means a market order (no price bound).
    /// On return, `remaining` holds the unexecuted quantity; trades,
    /// fully consumed makers and STP cancellations are in the walk result.
    pub(super) fn match_incoming(
        &self,
        taker_order_id: crate::types::OrderId,
        taker_user_id: UserId,
        side: Side,
        remaining: &mut Qty,
        limit_price: Option<Price>,
    ) -> MatchWalk {
        self.cache.invalidate();
        let mut walk = MatchWalk::default();

        let opposing = match side {
            Side::Buy => &self.asks,
            Side::Sell => &self.bids,
        };
        if opposing.is_empty() || *remaining == 0 {
            return walk;
        }

        let mut empty_levels: Vec<Price> = Vec::new();

        // Best opposing price first: asks ascending for buys, bids
        // descending for sells.
        let level_iter: Box<dyn Iterator<Item = crossbeam_skiplist::map::Entry<'_, Price, Arc<PriceLevel>>>> =
            match side {
                Side::Buy => Box::new(opposing.iter()),
                Side::Sell => Box::new(opposing.iter().rev()),
            };

        for entry in level_iter {
            if *remaining == 0 {
                break;
            }
            let price = *entry.key();
            if let Some(limit) = limit_price {
                match side {
                    Side::Buy if price > limit => break,
                    Side::Sell if price < limit => break,
                    _ => {}
                }
            }

            let level = entry.value();
            let level_match = level.match_fifo(*remaining, taker_user_id, self.stp_enabled);

            for cancelled in level_match.stp_cancelled {
                self.order_locations.remove(&cancelled.id);
                self.untrack_user_order(cancelled.user_id, cancelled.id);
                trace!(
                    "book {}: self-trade prevention cancelled maker {} at {}",
                    self.symbol, cancelled.id, price
                );
                walk.stp_cancelled.push(CancelledMaker {
                    order_id: cancelled.id,
                    user_id: cancelled.user_id,
                    remaining: cancelled.remaining,
                    price,
                    side: side.opposite(),
                });
            }

            for fill in &level_match.fills {
                let trade = Trade {
                    trade_id: self.clock.trade_ids.next_id(),
                    symbol: self.symbol.clone(),
                    price,
                    quantity: fill.quantity,
                    maker_order_id: fill.maker_order_id,
                    taker_order_id,
                    maker_user_id: fill.maker_user_id,
                    taker_user_id,
                    taker_side: side,
                    timestamp_ms: self.clock.now_ms(),
                };
                trace!(
                    "book {}: trade {} qty {} @ {} (maker {}, taker {})",
                    self.symbol,
                    trade.trade_id,
                    trade.quantity,
                    trade.price,
                    trade.maker_order_id,
                    trade.taker_order_id
                );
                walk.trades.push(trade);
                if fill.maker_remaining_after == 0 {
                    walk.filled_maker_ids.push(fill.maker_order_id);
                    self.order_locations.remove(&fill.maker_order_id);
                    self.untrack_user_order(fill.maker_user_id, fill.maker_order_id);
                }
            }

            if !level_match.fills.is_empty() {
                self.record_trade_price(price);
            }

            *remaining = level_match.remaining;
            if level.order_count() == 0 {
                empty_levels.push(price);
            }
        }

        for price in empty_levels {
            opposing.remove(&price);
        }

        walk
    }

    /// Quantity that would execute for `quantity` at `limit_price` without
    /// mutating the book. Used by post-only pre-checks and diagnostics.
    #[must_use]
    pub fn peek_match(&self, side: Side, quantity: Qty, limit_price: Option<Price>) -> Qty {
        let opposing = match side {
            Side::Buy => &self.asks,
            Side::Sell => &self.bids,
        };
        if opposing.is_empty() {
            return 0;
        }
        let mut matched = 0u64;
        let level_iter: Box<dyn Iterator<Item = crossbeam_skiplist::map::Entry<'_, Price, Arc<PriceLevel>>>> =
            match side {
                Side::Buy => Box::new(opposing.iter()),
                Side::Sell => Box::new(opposing.iter().rev()),
            };
        for entry in level_iter {
            if matched >= quantity {
                break;
            }
            let price = *entry.key();
            if let Some(limit) = limit_price {
                match side {
                    Side::Buy if price > limit => break,
                    Side::Sell if price < limit => break,
                    _ => {}
                }
            }
            matched = matched.saturating_add(entry.value().total_quantity());
        }
        matched.min(quantity)
    }
}
