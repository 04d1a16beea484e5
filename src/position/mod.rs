//! Position and margin management: average-price accounting, realized and
//! unrealized P&L, integer margin computation, and the liquidation
//! trigger.

mod account;
mod manager;
mod position;


pub use account::Account;
pub use manager::{
    AccountSnapshot, LiquidationIntent, MarkToMarketOutcome, PositionError, PositionManager,
    PositionSnapshot,
};
pub use position::{
    FillOutcome, Position, apply_fill, initial_margin, liquidation_price, required_margin,
};
