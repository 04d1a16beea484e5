//! Trade records and match results produced by the book.

use serde::{Deserialize, Serialize};

use crate::types::{OrderId, OrderStatus, Price, Qty, Side, TimestampMs, TradeId, UserId};

/// A single executed match. Trades are append-only: once emitted they are
/// journalled and streamed, never mutated.
///
/// The price is always the maker's resting price; maker and taker are on
/// opposite sides by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Monotonic trade identifier.
    pub trade_id: TradeId,
    /// Symbol the trade occurred on.
    pub symbol: String,
    /// Execution price (the maker's resting price).
    pub price: Price,
    /// Executed quantity.
    pub quantity: Qty,
    /// The resting (passive) order.
    pub maker_order_id: OrderId,
    /// The incoming (aggressive) order.
    pub taker_order_id: OrderId,
    /// Owner of the maker order.
    pub maker_user_id: UserId,
    /// Owner of the taker order.
    pub taker_user_id: UserId,
    /// Side of the taker.
    pub taker_side: Side,
    /// When the match occurred.
    pub timestamp_ms: TimestampMs,
}

/// A resting maker removed by self-trade prevention instead of matching.
/// Exactly one notification is emitted per cancelled maker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelledMaker {
    /// The cancelled resting order.
    pub order_id: OrderId,
    /// Its owner (always the taker's user).
    pub user_id: UserId,
    /// Remaining quantity at the time of cancellation.
    pub remaining: Qty,
    /// The price level it rested at.
    pub price: Price,
    /// The side it rested on.
    pub side: Side,
}

/// The full outcome of submitting one order to the book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    /// The incoming order's identifier.
    pub order_id: OrderId,
    /// The incoming order's side.
    pub side: Side,
    /// Quantity originally submitted.
    pub original_quantity: Qty,
    /// Quantity left unexecuted after matching (rested or cancelled,
    /// depending on `status`).
    pub remaining_quantity: Qty,
    /// Whether the unexecuted remainder rests in the book.
    pub rested: bool,
    /// Terminal or resting status of the incoming order after this call.
    pub status: OrderStatus,
    /// Trades generated, in match order.
    pub trades: Vec<Trade>,
    /// Makers fully consumed by this submission.
    pub filled_maker_ids: Vec<OrderId>,
    /// Makers cancelled by self-trade prevention.
    pub stp_cancelled: Vec<CancelledMaker>,
}

impl MatchResult {
    /// Quantity executed by this submission.
    #[must_use]
    #[inline]
    pub fn executed_quantity(&self) -> Qty {
        self.original_quantity - self.remaining_quantity
    }

    /// Whether the order fully executed.
    #[must_use]
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.remaining_quantity == 0
    }
}
