//! Shared primitive types used across the exchange core.
//!
//! Prices and quantities are fixed-point scaled integers to keep all book,
//! margin and P&L arithmetic exact. A price is expressed in quote-currency
//! minor units per whole contract; a quantity is scaled by
//! `10^tick_quantity_scale` (see [`crate::config::ExchangeConfig`]).
//! Conversion to floats happens only at the adapter boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonic order identifier, unique across the process lifetime.
pub type OrderId = u64;

/// Monotonic trade identifier, unique across the process lifetime.
pub type TradeId = u64;

/// User (account) identifier. Assigned by the boundary adapter.
pub type UserId = u64;

/// Price in quote-currency minor units, tick-scaled.
pub type Price = u128;

/// Unsigned quantity in fixed-point contract units.
pub type Qty = u64;

/// Signed quantity for net positions and exposure. Long > 0, short < 0.
pub type SignedQty = i64;

/// Money amount in quote-currency minor units. Signed: P&L can be negative.
pub type Money = i128;

/// Milliseconds since the Unix epoch, as stamped by [`crate::clock::Clock`].
pub type TimestampMs = u64;

/// The side of an order or trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Bid side: buying contracts.
    Buy,
    /// Ask side: selling contracts.
    Sell,
}

impl Side {
    /// Returns the opposing side.
    #[must_use]
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Sign convention for position deltas: buys increase, sells decrease.
    #[must_use]
    #[inline]
    pub fn sign(self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "Buy"),
            Side::Sell => write!(f, "Sell"),
        }
    }
}

/// The execution policy of a submitted order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    /// Match what crosses, rest the remainder at the limit price.
    Limit,
    /// Sweep the opposing side at maker prices; unfilled remainder is
    /// rejected, never rested.
    Market,
    /// Immediate-or-cancel: crossing behavior of a limit, remainder
    /// cancelled instead of rested.
    Ioc,
    /// Rejected outright if any portion would cross at submission;
    /// otherwise rests as a limit.
    PostOnly,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKind::Limit => write!(f, "Limit"),
            OrderKind::Market => write!(f, "Market"),
            OrderKind::Ioc => write!(f, "IOC"),
            OrderKind::PostOnly => write!(f, "PostOnly"),
        }
    }
}

/// Lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Resting with its full original quantity.
    Open,
    /// Resting with a partially executed quantity.
    PartiallyFilled,
    /// Fully executed. Terminal.
    Filled,
    /// Cancelled by the user, by self-trade prevention, or as an
    /// IOC/market remainder. Terminal.
    Cancelled,
    /// Rejected before reaching the book. Terminal.
    Rejected,
}

impl OrderStatus {
    /// Terminal orders are no longer reachable from any price level.
    #[must_use]
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Open => write!(f, "Open"),
            OrderStatus::PartiallyFilled => write!(f, "PartiallyFilled"),
            OrderStatus::Filled => write!(f, "Filled"),
            OrderStatus::Cancelled => write!(f, "Cancelled"),
            OrderStatus::Rejected => write!(f, "Rejected"),
        }
    }
}

/// Where a submission originated. Liquidations bypass the margin check
/// (but not the book) and cannot be cancelled by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderOrigin {
    /// Submitted through the boundary adapter by a user.
    Customer,
    /// Synthesized internally by the position manager.
    Liquidation,
}
