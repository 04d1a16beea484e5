//! The position manager: per-account serialization, fill application,
//! margin checks, mark-to-market and the liquidation trigger.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, warn};

use super::account::Account;
use super::position::{Position, apply_fill, initial_margin, liquidation_price};
use crate::catalog::ProductCatalog;
use crate::oracle::PriceOracle;
use crate::types::{Money, Price, Qty, Side, SignedQty, UserId};

/// Position-path failures.
#[derive(Debug)]
#[non_exhaustive]
pub enum PositionError {
    /// No account exists for the user (nothing has been deposited).
    UnknownAccount(UserId),

    /// The tentative reservation would push available margin below zero.
    MarginInsufficient {
        /// Initial margin the order would reserve.
        required: Money,
        /// Available margin before the reservation.
        available: Money,
    },

    /// A position invariant was breached. Fatal: recovery is from journal.
    InvariantViolated {
        /// Description of the breach.
        message: String,
    },
}

impl std::fmt::Display for PositionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionError::UnknownAccount(user_id) => {
                write!(f, "unknown account: {user_id}")
            }
            PositionError::MarginInsufficient {
                required,
                available,
            } => {
                write!(
                    f,
                    "insufficient margin: required {required}, available {available}"
                )
            }
            PositionError::InvariantViolated { message } => {
                write!(f, "position invariant violated: {message}")
            }
        }
    }
}

impl std::error::Error for PositionError {}

/// A position as reported to queries and streamed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// Owner.
    pub user_id: UserId,
    /// Symbol.
    pub symbol: String,
    /// Signed net size.
    pub size: SignedQty,
    /// Weighted-average entry price.
    pub entry_price: Price,
    /// Lifetime realized P&L.
    pub realized_pnl: Money,
    /// Unrealized P&L at the mark used for this snapshot.
    pub unrealized_pnl: Money,
    /// Initial margin reserved.
    pub margin_reserved: Money,
    /// Cached liquidation price.
    pub liquidation_price: Price,
    /// The mark the unrealized P&L was computed against (0 if none).
    pub mark_price: Price,
    /// Whether that mark was stale at snapshot time.
    pub mark_stale: bool,
}

/// An account as reported to queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Owner.
    pub user_id: UserId,
    /// Quote-currency balance.
    pub balance: Money,
    /// Balance plus total unrealized P&L.
    pub equity: Money,
    /// Total margin reserved across positions.
    pub margin_reserved: Money,
    /// Equity minus reserved margin.
    pub available_margin: Money,
    /// Pending socialized-loss flag.
    pub socialized_loss_pending: bool,
    /// Open positions.
    pub positions: Vec<PositionSnapshot>,
}

/// A liquidation the engine must execute: flatten the position at market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationIntent {
    /// Account being liquidated.
    pub user_id: UserId,
    /// Position to flatten.
    pub symbol: String,
    /// Side of the flattening order (opposite the position sign).
    pub side: Side,
    /// Quantity to flatten (the full position size).
    pub quantity: Qty,
}

/// Owns every account behind its own mutex. All reads and writes to a
/// given account's positions are serialized through that mutex; mark
/// prices are read as whole-record snapshots from the oracle.
#[derive(Debug)]
pub struct PositionManager {
    catalog: Arc<ProductCatalog>,
    oracle: Arc<PriceOracle>,
    accounts: DashMap<UserId, Arc<Mutex<Account>>>,
    qty_scale: u64,
    liquidation_buffer_bps: u32,
    house_accounts: std::collections::HashSet<UserId>,
}

impl PositionManager {
    /// Create a manager over the shared catalog and oracle.
    /// `house_accounts` are excluded from net exposure: hedging covers
    /// customer exposure only.
    #[must_use]
    pub fn new(
        catalog: Arc<ProductCatalog>,
        oracle: Arc<PriceOracle>,
        qty_scale: u64,
        liquidation_buffer_bps: u32,
        house_accounts: &[UserId],
    ) -> Self {
        Self {
            catalog,
            oracle,
            accounts: DashMap::new(),
            qty_scale,
            liquidation_buffer_bps,
            house_accounts: house_accounts.iter().copied().collect(),
        }
    }

    /// Credit `amount` to the user's balance, creating the account on
    /// first deposit. Returns the new balance.
    pub fn deposit(&self, user_id: UserId, amount: Money) -> Money {
        let handle = self
            .accounts
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(Account::new(user_id))))
            .clone();
        let mut account = lock(&handle);
        account.balance += amount;
        debug!("account {user_id}: deposited {amount}, balance {}", account.balance);
        account.balance
    }

    /// The serializer handle for an account.
    ///
    /// # Errors
    /// `PositionError::UnknownAccount` if the user never deposited.
    pub fn account_handle(&self, user_id: UserId) -> Result<Arc<Mutex<Account>>, PositionError> {
        self.accounts
            .get(&user_id)
            .map(|e| e.value().clone())
            .ok_or(PositionError::UnknownAccount(user_id))
    }

    /// Pre-trade margin check against an already locked account: the
    /// order's initial margin at the requested leverage must fit inside
    /// available margin. The caller holds the account lock from this
    /// check through the book `add` so no concurrent order races past the
    /// reservation.
    ///
    /// # Errors
    /// `PositionError::MarginInsufficient`.
    pub fn check_margin(
        &self,
        account: &Account,
        symbol: &str,
        quantity: Qty,
        price: Price,
        leverage: u32,
    ) -> Result<(), PositionError> {
        let Ok(product) = self.catalog.get(symbol) else {
            return Err(PositionError::InvariantViolated {
                message: format!("margin check against unknown symbol {symbol}"),
            });
        };
        let required = super::position::required_margin(
            quantity,
            price,
            leverage.min(product.leverage_cap).max(1),
            product.initial_margin_factor_bps,
            self.qty_scale,
        );
        let available = account.available_margin(self.qty_scale, |s| {
            self.oracle.mark(s).map(|m| m.price)
        });
        if available < required {
            return Err(PositionError::MarginInsufficient {
                required,
                available,
            });
        }
        Ok(())
    }

    /// Apply one fill to (user, symbol). Realized P&L settles into the
    /// balance immediately; margin reserved and the liquidation price are
    /// recomputed from the post-fill position at the current mark (falling
    /// back to the fill price before the first mark).
    ///
    /// # Errors
    /// `PositionError::UnknownAccount` or `PositionError::InvariantViolated`.
    pub fn apply_fill(
        &self,
        user_id: UserId,
        symbol: &str,
        side: Side,
        quantity: Qty,
        fill_price: Price,
    ) -> Result<PositionSnapshot, PositionError> {
        let Ok(quantity_signed) = SignedQty::try_from(quantity) else {
            return Err(PositionError::InvariantViolated {
                message: format!("fill quantity {quantity} exceeds signed range"),
            });
        };
        let delta = quantity_signed * side.sign();
        let product = self.catalog.get(symbol).map_err(|_| {
            PositionError::InvariantViolated {
                message: format!("fill against unknown symbol {symbol}"),
            }
        })?;

        let handle = self.account_handle(user_id)?;
        let mut account = lock(&handle);

        let outcome = {
            let pos = account
                .positions
                .entry(symbol.to_string())
                .or_insert_with(|| Position::flat(symbol));

            if pos.size.checked_add(delta).is_none() {
                error!("account {user_id}: position size overflow applying {delta}");
                return Err(PositionError::InvariantViolated {
                    message: format!("position size overflow for {user_id}/{symbol}"),
                });
            }

            apply_fill(pos, delta, fill_price, self.qty_scale)
        };
        account.balance += outcome.realized_delta;

        let mark = self
            .oracle
            .mark(symbol)
            .map(|m| m.price)
            .unwrap_or(fill_price);
        let pos = account
            .positions
            .get_mut(symbol)
            .expect("position just inserted");
        pos.margin_reserved = initial_margin(pos.size.unsigned_abs(), mark, product, self.qty_scale);
        pos.liquidation_price =
            liquidation_price(pos.size, pos.entry_price, product, self.liquidation_buffer_bps);

        if pos.is_flat() {
            account.positions.remove(symbol);
        }

        let snapshot = self.snapshot_locked(&account, symbol, user_id);
        Ok(snapshot)
    }

    /// Signed net exposure for `symbol`: the sum of signed sizes across
    /// all non-house users.
    #[must_use]
    pub fn net_exposure(&self, symbol: &str) -> SignedQty {
        let mut net: SignedQty = 0;
        for entry in self.accounts.iter() {
            if self.house_accounts.contains(entry.key()) {
                continue;
            }
            let account = lock(entry.value());
            if let Some(pos) = account.positions.get(symbol) {
                net += pos.size;
            }
        }
        net
    }

    /// Mark-to-market sweep for one symbol at `mark`.
    ///
    /// Recomputes reserved margin for positions in the symbol and returns
    /// (a) a position snapshot per affected user and (b) liquidation
    /// intents for accounts whose equity fell below their total
    /// maintenance margin. The most-at-risk position (the one with the
    /// largest maintenance requirement) is flattened first.
    pub fn mark_to_market(
        &self,
        symbol: &str,
        mark: Price,
        mark_stale: bool,
    ) -> MarkToMarketOutcome {
        let mut updates = Vec::new();
        let mut liquidations = Vec::new();
        let Ok(product) = self.catalog.get(symbol) else {
            return MarkToMarketOutcome::default();
        };

        let users: Vec<UserId> = self.accounts.iter().map(|e| *e.key()).collect();
        for user_id in users {
            let Some(handle) = self.accounts.get(&user_id).map(|e| e.value().clone()) else {
                continue;
            };
            let mut account = lock(&handle);
            let Some(pos) = account.positions.get_mut(symbol) else {
                continue;
            };
            pos.margin_reserved =
                initial_margin(pos.size.unsigned_abs(), mark, product, self.qty_scale);

            let mut snapshot = self.snapshot_locked(&account, symbol, user_id);
            snapshot.mark_price = mark;
            snapshot.mark_stale = mark_stale;
            snapshot.unrealized_pnl = account
                .positions
                .get(symbol)
                .map(|p| p.unrealized_pnl(mark, self.qty_scale))
                .unwrap_or(0);
            updates.push(snapshot);

            if let Some(intent) = self.liquidation_check(&account) {
                warn!(
                    "account {}: equity below maintenance, liquidating {} {}",
                    user_id, intent.quantity, intent.symbol
                );
                liquidations.push(intent);
            }
        }

        MarkToMarketOutcome {
            position_updates: updates,
            liquidations,
        }
    }

    /// Equity vs maintenance check for one locked account. Returns the
    /// intent for the most-at-risk position when equity < Σ maintenance.
    fn liquidation_check(&self, account: &Account) -> Option<LiquidationIntent> {
        let mark_of = |s: &str| self.oracle.mark(s).map(|m| m.price);
        let equity = account.equity(self.qty_scale, mark_of);

        let mut maintenance_total: Money = 0;
        let mut worst: Option<(Money, &Position)> = None;
        for pos in account.positions.values() {
            let Some(mark) = mark_of(&pos.symbol) else {
                continue;
            };
            let Ok(product) = self.catalog.get(&pos.symbol) else {
                continue;
            };
            let requirement = pos.maintenance_margin(mark, product, self.qty_scale);
            maintenance_total += requirement;
            let replace = match &worst {
                None => true,
                Some((current, held)) => {
                    requirement > *current
                        || (requirement == *current && pos.symbol < held.symbol)
                }
            };
            if replace {
                worst = Some((requirement, pos));
            }
        }

        if maintenance_total == 0 || equity >= maintenance_total {
            return None;
        }
        worst.map(|(_, pos)| LiquidationIntent {
            user_id: account.user_id,
            symbol: pos.symbol.clone(),
            side: if pos.size > 0 { Side::Sell } else { Side::Buy },
            quantity: pos.size.unsigned_abs(),
        })
    }

    /// Mark an account as awaiting loss socialization after a failed
    /// liquidation.
    pub fn mark_socialized_loss(&self, user_id: UserId) {
        if let Some(handle) = self.accounts.get(&user_id).map(|e| e.value().clone()) {
            let mut account = lock(&handle);
            account.socialized_loss_pending = true;
        }
    }

    /// Position snapshot for (user, symbol). A flat/absent position is
    /// reported as flat rather than an error.
    ///
    /// # Errors
    /// `PositionError::UnknownAccount`.
    pub fn get_position(
        &self,
        user_id: UserId,
        symbol: &str,
    ) -> Result<PositionSnapshot, PositionError> {
        let handle = self.account_handle(user_id)?;
        let account = lock(&handle);
        Ok(self.snapshot_locked(&account, symbol, user_id))
    }

    /// Full account snapshot.
    ///
    /// # Errors
    /// `PositionError::UnknownAccount`.
    pub fn get_account(&self, user_id: UserId) -> Result<AccountSnapshot, PositionError> {
        let handle = self.account_handle(user_id)?;
        let account = lock(&handle);
        let mark_of = |s: &str| self.oracle.mark(s).map(|m| m.price);
        let mut symbols: Vec<String> = account.positions.keys().cloned().collect();
        symbols.sort();
        let positions = symbols
            .iter()
            .map(|s| self.snapshot_locked(&account, s, user_id))
            .collect();
        Ok(AccountSnapshot {
            user_id,
            balance: account.balance,
            equity: account.equity(self.qty_scale, mark_of),
            margin_reserved: account.margin_reserved_total(),
            available_margin: account.available_margin(self.qty_scale, mark_of),
            socialized_loss_pending: account.socialized_loss_pending,
            positions,
        })
    }

    /// Clone every account, sorted by user id. Snapshot input.
    #[must_use]
    pub fn accounts_snapshot(&self) -> Vec<Account> {
        let mut accounts: Vec<Account> = self
            .accounts
            .iter()
            .map(|e| lock(e.value()).clone())
            .collect();
        accounts.sort_by_key(|a| a.user_id);
        accounts
    }

    /// Reinstall an account from a snapshot. The manager must not already
    /// hold state for the user.
    pub fn restore_account(&self, account: Account) {
        self.accounts
            .insert(account.user_id, Arc::new(Mutex::new(account)));
    }

    /// Users currently holding a position in `symbol`.
    #[must_use]
    pub fn users_in_symbol(&self, symbol: &str) -> Vec<UserId> {
        let mut users = Vec::new();
        for entry in self.accounts.iter() {
            let account = lock(entry.value());
            if account.positions.contains_key(symbol) {
                users.push(*entry.key());
            }
        }
        users.sort_unstable();
        users
    }

    /// Invariant sweep: every flat position must carry zero entry and
    /// margin, and no account may hold a position with no product.
    ///
    /// # Errors
    /// A description of the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        for entry in self.accounts.iter() {
            let account = lock(entry.value());
            for pos in account.positions.values() {
                if pos.size == 0 && (pos.entry_price != 0 || pos.margin_reserved != 0) {
                    return Err(format!(
                        "flat position with nonzero entry/margin for {}/{}",
                        account.user_id, pos.symbol
                    ));
                }
                if self.catalog.get(&pos.symbol).is_err() {
                    return Err(format!(
                        "position in unknown symbol {} for {}",
                        pos.symbol, account.user_id
                    ));
                }
            }
        }
        Ok(())
    }

    fn snapshot_locked(
        &self,
        account: &Account,
        symbol: &str,
        user_id: UserId,
    ) -> PositionSnapshot {
        let mark = self.oracle.mark(symbol);
        let mark_price = mark.map(|m| m.price).unwrap_or(0);
        let mark_stale = mark.map(|m| m.is_stale()).unwrap_or(true);
        match account.positions.get(symbol) {
            Some(pos) => PositionSnapshot {
                user_id,
                symbol: symbol.to_string(),
                size: pos.size,
                entry_price: pos.entry_price,
                realized_pnl: pos.realized_pnl,
                unrealized_pnl: if mark_price > 0 {
                    pos.unrealized_pnl(mark_price, self.qty_scale)
                } else {
                    0
                },
                margin_reserved: pos.margin_reserved,
                liquidation_price: pos.liquidation_price,
                mark_price,
                mark_stale,
            },
            None => PositionSnapshot {
                user_id,
                symbol: symbol.to_string(),
                size: 0,
                entry_price: 0,
                realized_pnl: 0,
                unrealized_pnl: 0,
                margin_reserved: 0,
                liquidation_price: 0,
                mark_price,
                mark_stale,
            },
        }
    }

}

/// Outcome of a mark-to-market sweep.
#[derive(Debug, Default)]
pub struct MarkToMarketOutcome {
    /// Per-user position updates for the swept symbol.
    pub position_updates: Vec<PositionSnapshot>,
    /// Liquidations the engine must execute.
    pub liquidations: Vec<LiquidationIntent>,
}

fn lock(handle: &Arc<Mutex<Account>>) -> MutexGuard<'_, Account> {
    handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
