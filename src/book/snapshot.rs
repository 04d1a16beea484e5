//! Book state capture and restore for the snapshot/recovery boundary.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::book::OrderBook;
use super::level::{PriceLevel, RestingOrder};
use crate::types::{Price, Side};

/// One price level with its resting orders in queue order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSnapshot {
    /// Level price.
    pub price: Price,
    /// Resting orders, front of queue first.
    pub orders: Vec<RestingOrder>,
}

/// A full capture of one book. Restoring it into a fresh book reproduces
/// byte-identical resting state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    /// Symbol of the book.
    pub symbol: String,
    /// Bid levels, best (highest) first.
    pub bids: Vec<LevelSnapshot>,
    /// Ask levels, best (lowest) first.
    pub asks: Vec<LevelSnapshot>,
    /// Last trade price, if any trade occurred.
    pub last_trade_price: Option<Price>,
}

impl OrderBook {
    /// Capture the resting state of this book.
    #[must_use]
    pub fn snapshot(&self) -> BookSnapshot {
        let capture = |levels: &crossbeam_skiplist::SkipMap<Price, Arc<PriceLevel>>,
                       reverse: bool| {
            let mut out: Vec<LevelSnapshot> = levels
                .iter()
                .map(|entry| LevelSnapshot {
                    price: *entry.key(),
                    orders: entry.value().orders(),
                })
                .collect();
            if reverse {
                out.reverse();
            }
            out
        };
        BookSnapshot {
            symbol: self.symbol.clone(),
            bids: capture(&self.bids, true),
            asks: capture(&self.asks, false),
            last_trade_price: self.last_trade_price(),
        }
    }

    /// Rebuild resting state from a snapshot. The book must be fresh:
    /// restoring over existing orders is undefined.
    pub fn restore(&self, snapshot: &BookSnapshot) {
        for (side, levels) in [(Side::Buy, &snapshot.bids), (Side::Sell, &snapshot.asks)] {
            let side_levels = match side {
                Side::Buy => &self.bids,
                Side::Sell => &self.asks,
            };
            for level_snapshot in levels {
                let level = side_levels
                    .get_or_insert(
                        level_snapshot.price,
                        Arc::new(PriceLevel::new(level_snapshot.price)),
                    )
                    .value()
                    .clone();
                for order in &level_snapshot.orders {
                    level.push_back(order.clone());
                    self.order_locations
                        .insert(order.id, (level_snapshot.price, side));
                    self.track_user_order(order.user_id, order.id);
                }
            }
        }
        if let Some(price) = snapshot.last_trade_price {
            self.record_trade_price(price);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::book::tests::test_helpers::{book, limit};
    use crate::types::Side;

    #[test]
    fn snapshot_then_restore_reproduces_resting_state() {
        let original = book("XAU-MNT");
        original.add_order(limit(1, 7, Side::Buy, 10, 100)).unwrap();
        original.add_order(limit(2, 8, Side::Buy, 5, 100)).unwrap();
        original.add_order(limit(3, 9, Side::Sell, 7, 105)).unwrap();

        let snapshot = original.snapshot();
        assert_eq!(snapshot.bids.len(), 1);
        assert_eq!(snapshot.bids[0].orders.len(), 2);

        let restored = book("XAU-MNT");
        restored.restore(&snapshot);
        assert_eq!(restored.snapshot(), snapshot);
        assert_eq!(restored.bbo(), (Some(100), Some(105)));
        restored.check_invariants().unwrap();

        // Queue order survives: the market sell hits order 1 first.
        let result = restored
            .add_order(crate::book::tests::test_helpers::market(4, 10, Side::Sell, 10))
            .unwrap();
        assert_eq!(result.trades[0].maker_order_id, 1);
    }
}
