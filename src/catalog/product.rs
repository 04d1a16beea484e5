//! Tradable product definitions.

use serde::{Deserialize, Serialize};

use crate::types::{Price, Qty};

/// How an external underlying quote is converted into the quote currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitConversion {
    /// The external quote is already denominated in the quote currency.
    Native,
    /// Multiply the external quote by the current reference rate.
    ViaReferenceRate,
}

/// Daily trading window in minutes from UTC midnight, `[open, close)`.
/// An inverted window (`open > close`) wraps past midnight; `open == close`
/// means the product trades around the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingHours {
    /// Opening minute of day, inclusive.
    pub open_minute: u16,
    /// Closing minute of day, exclusive.
    pub close_minute: u16,
}

impl TradingHours {
    /// A window that never closes.
    pub const ALWAYS: Self = Self {
        open_minute: 0,
        close_minute: 0,
    };

    /// Whether `ts_ms` (Unix milliseconds) falls inside the window.
    #[must_use]
    pub fn contains(&self, ts_ms: u64) -> bool {
        if self.open_minute == self.close_minute {
            return true;
        }
        let minute_of_day = ((ts_ms / 60_000) % (24 * 60)) as u16;
        if self.open_minute < self.close_minute {
            minute_of_day >= self.open_minute && minute_of_day < self.close_minute
        } else {
            minute_of_day >= self.open_minute || minute_of_day < self.close_minute
        }
    }
}

/// A tradable perpetual contract. Immutable at runtime; loaded at startup
/// and mutated only through the administrative channel.
///
/// The catalog is the single source of truth for tick size and margin
/// rates; no other component derives its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Unique symbol, e.g. `"XAU-MNT"`.
    pub symbol: String,
    /// Human-readable display name.
    pub display_name: String,
    /// Quote currency code. All settlement is in this currency.
    pub quote_currency: String,
    /// Key of the external underlying on the quote feed, e.g. `"XAUUSD"`.
    pub external_symbol: String,
    /// Contracts per lot on the external hedge venue, in fixed-point
    /// quantity units.
    pub contract_size: Qty,
    /// Minimum price increment in quote minor units.
    pub tick_size: Price,
    /// Minimum quantity increment in fixed-point units.
    pub qty_step: Qty,
    /// Minimum order quantity.
    pub min_order_qty: Qty,
    /// Maximum order quantity.
    pub max_order_qty: Qty,
    /// Maximum leverage.
    pub leverage_cap: u32,
    /// Maintenance margin rate in basis points of notional.
    pub maintenance_margin_bps: u32,
    /// Initial margin factor in basis points applied on top of `1/leverage`.
    /// 10_000 means exactly notional / leverage.
    pub initial_margin_factor_bps: u32,
    /// Daily trading window.
    pub trading_hours: TradingHours,
    /// Inactive products reject all new order flow.
    pub active: bool,
    /// Whether net exposure in this product is auto-hedged externally.
    pub hedgeable: bool,
    /// External quote to quote-currency conversion policy.
    pub conversion: UnitConversion,
    /// Minimum absolute change in net exposure before a hedge is emitted.
    pub hedge_deadband: Qty,
    /// Minimum milliseconds between successive hedges.
    pub hedge_throttle_ms: u64,
}

impl Product {
    /// Whether `price` sits on the product's tick grid.
    #[must_use]
    #[inline]
    pub fn price_on_tick(&self, price: Price) -> bool {
        self.tick_size == 0 || price % self.tick_size == 0
    }

    /// Whether `qty` is within bounds and on the quantity step.
    #[must_use]
    pub fn qty_in_bounds(&self, qty: Qty) -> bool {
        qty >= self.min_order_qty
            && qty <= self.max_order_qty
            && (self.qty_step == 0 || qty % self.qty_step == 0)
    }

    /// Round a quantity down onto the external lot grid.
    #[must_use]
    pub fn round_to_lot(&self, qty: Qty) -> Qty {
        if self.contract_size == 0 {
            return qty;
        }
        qty - qty % self.contract_size
    }
}
