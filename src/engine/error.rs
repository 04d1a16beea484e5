//! The engine-level error taxonomy surfaced to the boundary adapter.

use std::fmt;

use crate::types::{Money, OrderId, Price, Qty, UserId};

/// Every failure a submission, cancel or modify can surface, with
/// explicit codes for the adapter. Validation, risk and state errors are
/// non-retryable; backpressure errors may be retried after a brief delay.
#[derive(Debug)]
#[non_exhaustive]
pub enum EngineError {
    /// The symbol is not in the catalog.
    SymbolUnknown(String),

    /// The product is not active for trading.
    SymbolInactive(String),

    /// The product is outside its trading-hours window.
    OutsideHours(String),

    /// The mark price is stale; new orders are suppressed.
    MarkStale(String),

    /// The limit price is not a multiple of the product tick size.
    TickViolation {
        /// Offending price.
        price: Price,
        /// Product tick size.
        tick_size: Price,
    },

    /// The quantity is outside the product bounds or off the step grid.
    QtyBounds {
        /// Offending quantity.
        quantity: Qty,
        /// Product minimum.
        min: Qty,
        /// Product maximum.
        max: Qty,
    },

    /// The requested leverage exceeds the product cap.
    LeverageCap {
        /// Requested leverage.
        requested: u32,
        /// Product cap.
        cap: u32,
    },

    /// The tentative margin reservation does not fit available margin.
    MarginInsufficient {
        /// Initial margin the order would reserve.
        required: Money,
        /// Available margin at submission.
        available: Money,
    },

    /// A post-only order (or modify) would cross.
    WouldCross {
        /// Offending price.
        price: Price,
    },

    /// A market order remainder could not be filled.
    Unfilled {
        /// Quantity submitted.
        requested: Qty,
        /// Quantity left unexecuted.
        remaining: Qty,
    },

    /// The order is unknown, terminal, or owned by another user.
    NotFound(OrderId),

    /// The order is already terminal.
    Terminal(OrderId),

    /// The modify request is not expressible.
    InvalidModify(String),

    /// No account exists for the user.
    UnknownAccount(UserId),

    /// The journal ring is full. Retryable after a brief delay.
    JournalFull,

    /// The stream hub cannot accept more backlog for this principal.
    /// Retryable after a brief delay.
    StreamBacklog,

    /// A core invariant was breached. Fatal: recovery is from journal.
    InvariantViolated(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::SymbolUnknown(symbol) => write!(f, "unknown symbol: {symbol}"),
            EngineError::SymbolInactive(symbol) => write!(f, "symbol inactive: {symbol}"),
            EngineError::OutsideHours(symbol) => write!(f, "outside trading hours: {symbol}"),
            EngineError::MarkStale(symbol) => write!(f, "mark price stale for {symbol}"),
            EngineError::TickViolation { price, tick_size } => {
                write!(
                    f,
                    "tick violation: price {price} not a multiple of {tick_size}"
                )
            }
            EngineError::QtyBounds { quantity, min, max } => {
                write!(
                    f,
                    "quantity out of bounds: {quantity} (min {min}, max {max})"
                )
            }
            EngineError::LeverageCap { requested, cap } => {
                write!(f, "leverage {requested} exceeds cap {cap}")
            }
            EngineError::MarginInsufficient {
                required,
                available,
            } => {
                write!(
                    f,
                    "insufficient margin: required {required}, available {available}"
                )
            }
            EngineError::WouldCross { price } => {
                write!(f, "post-only would cross at {price}")
            }
            EngineError::Unfilled {
                requested,
                remaining,
            } => {
                write!(
                    f,
                    "market order unfilled: {remaining} of {requested} remaining"
                )
            }
            EngineError::NotFound(order_id) => write!(f, "order not found: {order_id}"),
            EngineError::Terminal(order_id) => write!(f, "order terminal: {order_id}"),
            EngineError::InvalidModify(message) => write!(f, "invalid modify: {message}"),
            EngineError::UnknownAccount(user_id) => write!(f, "unknown account: {user_id}"),
            EngineError::JournalFull => write!(f, "journal ring full"),
            EngineError::StreamBacklog => write!(f, "stream backlog"),
            EngineError::InvariantViolated(message) => {
                write!(f, "invariant violated: {message}")
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl EngineError {
    /// Whether the adapter may retry after a brief delay (HTTP 503
    /// semantics). Everything else is non-retryable at the engine.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::JournalFull | EngineError::StreamBacklog)
    }
}
