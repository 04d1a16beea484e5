//! Order book error types.

use std::fmt;

use crate::types::{OrderId, Price, Qty, Side};

/// Errors that can occur within the order book.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum OrderBookError {
    /// Order not found in the book, or already terminal.
    OrderNotFound(OrderId),

    /// A post-only order (or post-only modify) would cross the opposing
    /// best price.
    WouldCross {
        /// Price that would cause the crossing.
        price: Price,
        /// Side of the order.
        side: Side,
        /// Best opposing price it would cross.
        opposite_price: Price,
    },

    /// A market order found no opposing liquidity at all.
    InsufficientLiquidity {
        /// Side of the market order.
        side: Side,
        /// Quantity requested.
        requested: Qty,
        /// Quantity available on the opposing side.
        available: Qty,
    },

    /// The requested modify is not expressible (no change, zero quantity,
    /// or quantity not a strict decrease when priority must be kept).
    InvalidModify {
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted for this order shape.
    InvalidOperation {
        /// Description of the problem.
        message: String,
    },
}

impl fmt::Display for OrderBookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderBookError::OrderNotFound(id) => write!(f, "order not found: {id}"),
            OrderBookError::WouldCross {
                price,
                side,
                opposite_price,
            } => write!(
                f,
                "post-only {side} at {price} would cross opposite at {opposite_price}"
            ),
            OrderBookError::InsufficientLiquidity {
                side,
                requested,
                available,
            } => write!(
                f,
                "insufficient liquidity for {side} market order: requested {requested}, available {available}"
            ),
            OrderBookError::InvalidModify { message } => write!(f, "invalid modify: {message}"),
            OrderBookError::InvalidOperation { message } => {
                write!(f, "invalid operation: {message}")
            }
        }
    }
}

impl std::error::Error for OrderBookError {}
