//! Per-(user, symbol) position state and the integer margin/P&L math.
//!
//! All arithmetic is fixed-point integer: quantities are scaled by
//! `10^tick_quantity_scale`, prices and money are quote minor units.
//! Margin is rounded up to the smallest quote unit; P&L divisions
//! truncate toward zero.

use serde::{Deserialize, Serialize};

use crate::catalog::Product;
use crate::types::{Money, Price, Qty, SignedQty};

/// A net position. `size > 0` is long, `size < 0` is short.
///
/// Invariant: `size == 0` implies `entry_price == 0` and
/// `margin_reserved == 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Symbol the position is in.
    pub symbol: String,
    /// Signed net size, fixed-point quantity units.
    pub size: SignedQty,
    /// Weighted-average entry price. 0 when flat.
    pub entry_price: Price,
    /// Lifetime realized P&L accumulator.
    pub realized_pnl: Money,
    /// Initial margin currently reserved against this position.
    pub margin_reserved: Money,
    /// Cached liquidation price. 0 when flat.
    pub liquidation_price: Price,
}

impl Position {
    /// A flat position in `symbol`.
    #[must_use]
    pub fn flat(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            size: 0,
            entry_price: 0,
            realized_pnl: 0,
            margin_reserved: 0,
            liquidation_price: 0,
        }
    }

    /// Whether the position holds no exposure.
    #[must_use]
    #[inline]
    pub fn is_flat(&self) -> bool {
        self.size == 0
    }

    /// Unrealized P&L at `mark`: `(mark − entry) · size` for longs,
    /// `(entry − mark) · |size|` for shorts, as one signed expression.
    #[must_use]
    pub fn unrealized_pnl(&self, mark: Price, qty_scale: u64) -> Money {
        if self.size == 0 {
            return 0;
        }
        let diff = mark as i128 - self.entry_price as i128;
        diff * self.size as i128 / qty_scale as i128
    }

    /// Maintenance margin requirement at `mark`, rounded up.
    #[must_use]
    pub fn maintenance_margin(&self, mark: Price, product: &Product, qty_scale: u64) -> Money {
        if self.size == 0 {
            return 0;
        }
        ceil_div(
            self.size.unsigned_abs() as u128 * mark * product.maintenance_margin_bps as u128,
            qty_scale as u128 * 10_000,
        ) as Money
    }
}

/// The realized outcome of applying one signed fill to a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillOutcome {
    /// Realized P&L from the closing portion (0 for pure growth).
    pub realized_delta: Money,
    /// Quantity that closed existing exposure.
    pub closed_quantity: Qty,
    /// Whether the position crossed through flat and reopened.
    pub reversed: bool,
}

/// Apply a signed fill to `position`.
///
/// Same-sign growth (or a fill into a flat position) recomputes the
/// weighted-average entry and realizes nothing. A reducing or reversing
/// fill closes `min(|size|, |delta|)` at the entry against the fill price,
/// realizing `q · (fill − entry) · sign(size)`, and any remainder opens
/// fresh exposure with entry at the fill price.
pub fn apply_fill(
    position: &mut Position,
    delta: SignedQty,
    fill_price: Price,
    qty_scale: u64,
) -> FillOutcome {
    debug_assert!(delta != 0);
    let size = position.size;
    let new_size = size + delta;

    if size == 0 || size.signum() == delta.signum() {
        let abs_old = size.unsigned_abs() as u128;
        let abs_delta = delta.unsigned_abs() as u128;
        let abs_new = new_size.unsigned_abs() as u128;
        position.entry_price =
            (abs_old * position.entry_price + abs_delta * fill_price) / abs_new;
        position.size = new_size;
        return FillOutcome {
            realized_delta: 0,
            closed_quantity: 0,
            reversed: false,
        };
    }

    let closed = size.unsigned_abs().min(delta.unsigned_abs());
    let diff = fill_price as i128 - position.entry_price as i128;
    let realized = closed as i128 * diff * size.signum() as i128 / qty_scale as i128;
    position.realized_pnl += realized;

    let reversed = delta.unsigned_abs() > size.unsigned_abs();
    position.size = new_size;
    if reversed {
        position.entry_price = fill_price;
    } else if new_size == 0 {
        position.entry_price = 0;
    }

    FillOutcome {
        realized_delta: realized,
        closed_quantity: closed,
        reversed,
    }
}

/// Initial margin for `size_abs` at `price` under an explicit leverage:
/// `notional / leverage`, scaled by the initial margin factor, rounded up
/// to the smallest quote unit.
#[must_use]
pub fn required_margin(
    size_abs: Qty,
    price: Price,
    leverage: u32,
    initial_margin_factor_bps: u32,
    qty_scale: u64,
) -> Money {
    if size_abs == 0 {
        return 0;
    }
    ceil_div(
        size_abs as u128 * price * initial_margin_factor_bps as u128,
        qty_scale as u128 * leverage.max(1) as u128 * 10_000,
    ) as Money
}

/// Initial margin to reserve against a position, at the product's
/// leverage cap.
#[must_use]
pub fn initial_margin(size_abs: Qty, price: Price, product: &Product, qty_scale: u64) -> Money {
    required_margin(
        size_abs,
        price,
        product.leverage_cap,
        product.initial_margin_factor_bps,
        qty_scale,
    )
}

/// Liquidation price for an entry at `entry` with the product's leverage
/// cap and effective maintenance rate (maintenance + buffer, in bps).
///
/// Long: `E · (1 − 1/L + m)`. Short: `E · (1 + 1/L − m)`. Flat: 0.
#[must_use]
pub fn liquidation_price(
    size: SignedQty,
    entry: Price,
    product: &Product,
    buffer_bps: u32,
) -> Price {
    if size == 0 || entry == 0 {
        return 0;
    }
    let leverage = product.leverage_cap.max(1) as u128;
    let m_eff = (product.maintenance_margin_bps + buffer_bps) as u128;
    if size > 0 {
        entry * ((leverage - 1) * 10_000 + m_eff * leverage) / (leverage * 10_000)
    } else {
        entry * ((leverage + 1) * 10_000 - m_eff * leverage) / (leverage * 10_000)
    }
}

#[inline]
pub(crate) fn ceil_div(numerator: u128, denominator: u128) -> u128 {
    numerator.div_ceil(denominator)
}
