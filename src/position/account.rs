//! Per-user account: quote-currency balance plus positions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::position::Position;
use crate::types::{Money, Price, UserId};

/// A user's account. All reads and writes go through the manager's
/// per-account mutex; the struct itself is plain data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Owner.
    pub user_id: UserId,
    /// Quote-currency balance. Realized P&L settles here.
    pub balance: Money,
    /// Positions keyed by symbol. Flat positions are removed.
    pub positions: HashMap<String, Position>,
    /// Set when a liquidation could not be executed against the book and
    /// the shortfall awaits socialization.
    pub socialized_loss_pending: bool,
}

impl Account {
    /// A fresh account with zero balance.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            balance: 0,
            positions: HashMap::new(),
            socialized_loss_pending: false,
        }
    }

    /// Sum of margins reserved across positions.
    #[must_use]
    pub fn margin_reserved_total(&self) -> Money {
        self.positions.values().map(|p| p.margin_reserved).sum()
    }

    /// Total unrealized P&L over all positions, marking each symbol
    /// through `mark_of`. Positions with no mark contribute zero.
    pub fn unrealized_total<F>(&self, qty_scale: u64, mark_of: F) -> Money
    where
        F: Fn(&str) -> Option<Price>,
    {
        self.positions
            .values()
            .map(|p| {
                mark_of(&p.symbol)
                    .map(|mark| p.unrealized_pnl(mark, qty_scale))
                    .unwrap_or(0)
            })
            .sum()
    }

    /// Equity: balance plus total unrealized P&L.
    pub fn equity<F>(&self, qty_scale: u64, mark_of: F) -> Money
    where
        F: Fn(&str) -> Option<Price>,
    {
        self.balance + self.unrealized_total(qty_scale, mark_of)
    }

    /// Available margin: equity minus total reserved. Must be ≥ 0 after
    /// any accepted order.
    pub fn available_margin<F>(&self, qty_scale: u64, mark_of: F) -> Money
    where
        F: Fn(&str) -> Option<Price>,
    {
        self.equity(qty_scale, mark_of) - self.margin_reserved_total()
    }
}
