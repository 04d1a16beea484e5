//! Journal event types: the write-ahead record of every state-changing
//! operation.
//!
//! State changes are pure functions of (prior state, event): replaying
//! the event stream into a fresh core yields identical books, positions
//! and hedge state. Matching is deterministic, so trades and position
//! changes re-derive during replay; their events exist for the external
//! store and for verification.

use serde::{Deserialize, Serialize};

use crate::book::{Order, Trade};
use crate::types::{
    Money, OrderId, OrderOrigin, OrderStatus, Price, Qty, SignedQty, TimestampMs, UserId,
};

/// Why an order reached a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalReason {
    /// Fully executed.
    Filled,
    /// Cancelled on user request.
    UserCancel,
    /// IOC remainder cancelled after matching.
    IocRemainder,
    /// Market order remainder could not be filled.
    Unfilled,
    /// Resting maker cancelled by self-trade prevention.
    SelfTrade,
    /// Rejected before or during matching.
    Rejected,
}

/// A state-changing event, appended before the operation is acknowledged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JournalEvent {
    /// An order passed validation and was handed to the book.
    OrderAccepted {
        /// Symbol the order targets.
        symbol: String,
        /// The accepted order, with its engine-assigned id and timestamp.
        order: Order,
        /// Customer flow or internal liquidation.
        origin: OrderOrigin,
        /// Client-supplied correlation id, echoed in order-status events.
        client_order_id: Option<String>,
    },

    /// A match occurred.
    OrderTrade {
        /// The trade record.
        trade: Trade,
    },

    /// An order reached a terminal status.
    OrderTerminal {
        /// Symbol the order targeted.
        symbol: String,
        /// The order.
        order_id: OrderId,
        /// Terminal status.
        status: OrderStatus,
        /// Why.
        reason: TerminalReason,
    },

    /// A resting order was modified (price, quantity, or both).
    OrderModified {
        /// Symbol the order rests on.
        symbol: String,
        /// The order.
        order_id: OrderId,
        /// New limit price, if changed.
        new_price: Option<Price>,
        /// New quantity, if changed.
        new_qty: Option<Qty>,
    },

    /// A position changed. Derived state: emitted for the external store,
    /// verified (not applied) during replay.
    PositionChanged {
        /// Owner.
        user_id: UserId,
        /// Symbol.
        symbol: String,
        /// Net size after the change.
        size: SignedQty,
        /// Entry price after the change.
        entry_price: Price,
        /// Lifetime realized P&L after the change.
        realized_pnl: Money,
        /// Account balance after realized settlement.
        balance: Money,
    },

    /// Collateral was credited to an account.
    BalanceDeposited {
        /// Owner.
        user_id: UserId,
        /// Amount credited.
        amount: Money,
    },

    /// The broker adapter acknowledged a hedge; the hedged baseline moved.
    HedgeAcked {
        /// Hedged symbol.
        symbol: String,
        /// New hedged baseline (signed).
        hedged: SignedQty,
        /// When the ack was processed.
        ts_ms: TimestampMs,
    },

    /// A mark price was published. Optional for space; replay tolerates
    /// its absence.
    MarkUpdated {
        /// Symbol.
        symbol: String,
        /// The mark in quote minor units.
        price: Price,
        /// Input timestamp behind the mark.
        ts_ms: TimestampMs,
    },
}

/// An event as stored: sequenced and timestamped by the journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournaledEvent {
    /// Monotonic, gap-free sequence number.
    pub seq: u64,
    /// When the event was appended.
    pub ts_ms: TimestampMs,
    /// The event payload.
    pub event: JournalEvent,
}
