//! The matching engine: multiplexes per-symbol books, validates and
//! journals submissions, routes fills into positions, and publishes the
//! event sequence for every operation.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, trace};

use super::error::EngineError;
use crate::book::{
    DepthSnapshot, MatchResult, ModifyResult, OpenOrder, Order, OrderBook, OrderBookError,
};
use crate::catalog::{Product, ProductCatalog};
use crate::clock::ClockService;
use crate::journal::{Journal, JournalError, JournalEvent, TerminalReason};
use crate::oracle::PriceOracle;
use crate::position::{PositionManager, PositionSnapshot};
use crate::stream::{StreamEvent, StreamHub};
use crate::types::{
    OrderId, OrderKind, OrderOrigin, OrderStatus, Price, Qty, Side, TimestampMs, UserId,
};

/// A submission as received from the boundary adapter.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    /// Submitting user.
    pub user_id: UserId,
    /// Target symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: Side,
    /// Execution policy.
    pub kind: OrderKind,
    /// Quantity, fixed-point units.
    pub quantity: Qty,
    /// Limit price; ignored for market orders.
    pub limit_price: Option<Price>,
    /// Requested leverage; defaults to the product cap.
    pub leverage: Option<u32>,
    /// Client correlation id, echoed in order-status events.
    pub client_order_id: Option<String>,
}

/// What a submission did, for the exchange root.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    /// Engine-assigned order id.
    pub order_id: OrderId,
    /// The match result.
    pub result: MatchResult,
}

/// Owns the set of books, one per active symbol.
pub struct MatchingEngine {
    catalog: Arc<ProductCatalog>,
    clock: Arc<ClockService>,
    oracle: Arc<PriceOracle>,
    positions: Arc<PositionManager>,
    hub: Arc<StreamHub>,
    journal: Arc<dyn Journal>,
    books: DashMap<String, Arc<OrderBook>>,
    depth_levels: usize,
}

impl MatchingEngine {
    /// Build the engine and one book per active catalog symbol.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<ProductCatalog>,
        clock: Arc<ClockService>,
        oracle: Arc<PriceOracle>,
        positions: Arc<PositionManager>,
        hub: Arc<StreamHub>,
        journal: Arc<dyn Journal>,
        self_trade_prevention: bool,
        depth_levels: usize,
    ) -> Self {
        let books = DashMap::new();
        for symbol in catalog.active_symbols() {
            books.insert(
                symbol.clone(),
                Arc::new(OrderBook::new(&symbol, self_trade_prevention, Arc::clone(&clock))),
            );
            info!("engine: book registered for {symbol}");
        }
        Self {
            catalog,
            clock,
            oracle,
            positions,
            hub,
            journal,
            books,
            depth_levels,
        }
    }

    /// The book for `symbol`.
    ///
    /// # Errors
    /// `EngineError::SymbolUnknown`.
    pub fn book(&self, symbol: &str) -> Result<Arc<OrderBook>, EngineError> {
        self.books
            .get(symbol)
            .map(|e| e.value().clone())
            .ok_or_else(|| EngineError::SymbolUnknown(symbol.to_string()))
    }

    /// Validate and execute one submission.
    ///
    /// Validation order: symbol known → active → trading hours → mark not
    /// stale → price on tick → quantity bounds → leverage cap → tentative
    /// margin reservation under the account lock, which is held through
    /// the book `add` so no concurrent order races past it. The
    /// `order_accepted` journal append precedes any mutation; a full ring
    /// rejects the submission with `JournalFull` before state changes.
    ///
    /// Liquidation-origin orders bypass hours, staleness and the margin
    /// check, but not the book.
    ///
    /// # Errors
    /// Validation, risk, state, or backpressure errors.
    pub fn submit(
        &self,
        request: &SubmitRequest,
        origin: OrderOrigin,
    ) -> Result<SubmitOutcome, EngineError> {
        let product = self
            .catalog
            .get(&request.symbol)
            .map_err(|_| EngineError::SymbolUnknown(request.symbol.clone()))?
            .clone();
        if !product.active {
            return Err(EngineError::SymbolInactive(request.symbol.clone()));
        }
        let book = self.book(&request.symbol)?;
        let now = self.clock.now_ms();

        if origin == OrderOrigin::Customer {
            if !product.trading_hours.contains(now) {
                return Err(EngineError::OutsideHours(request.symbol.clone()));
            }
            if self.oracle.is_stale(&request.symbol, now) {
                return Err(EngineError::MarkStale(request.symbol.clone()));
            }
        }

        let limit_price = match request.kind {
            OrderKind::Market => None,
            _ => {
                let price = request.limit_price.unwrap_or(0);
                if price == 0 || !product.price_on_tick(price) {
                    return Err(EngineError::TickViolation {
                        price,
                        tick_size: product.tick_size,
                    });
                }
                Some(price)
            }
        };
        if origin == OrderOrigin::Customer && !product.qty_in_bounds(request.quantity) {
            return Err(EngineError::QtyBounds {
                quantity: request.quantity,
                min: product.min_order_qty,
                max: product.max_order_qty,
            });
        }
        let leverage = match request.leverage {
            Some(l) if l == 0 || l > product.leverage_cap => {
                return Err(EngineError::LeverageCap {
                    requested: l,
                    cap: product.leverage_cap,
                });
            }
            Some(l) => l,
            None => product.leverage_cap,
        };

        let order_id = self.clock.order_ids.next_id();
        let order = Order {
            id: order_id,
            user_id: request.user_id,
            side: request.side,
            kind: request.kind,
            quantity: request.quantity,
            limit_price,
            timestamp_ms: now,
        };
        trace!(
            "engine: submit {:?} order {} for user {} on {}",
            origin, order_id, request.user_id, request.symbol
        );

        let accepted_event = JournalEvent::OrderAccepted {
            symbol: request.symbol.clone(),
            order: order.clone(),
            origin,
            client_order_id: request.client_order_id.clone(),
        };

        let added = if origin == OrderOrigin::Customer {
            let handle = self
                .positions
                .account_handle(request.user_id)
                .map_err(|_| EngineError::UnknownAccount(request.user_id))?;
            let account = handle
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            let margin_price = limit_price
                .or_else(|| self.oracle.mark(&request.symbol).map(|m| m.price))
                .unwrap_or(0);
            self.positions
                .check_margin(&account, &request.symbol, request.quantity, margin_price, leverage)
                .map_err(|err| match err {
                    crate::position::PositionError::MarginInsufficient {
                        required,
                        available,
                    } => EngineError::MarginInsufficient {
                        required,
                        available,
                    },
                    other => EngineError::InvariantViolated(other.to_string()),
                })?;

            self.append_required(now, &accepted_event)?;
            // The account stays locked across the add so the reservation
            // cannot be raced.
            book.add_order(order)
        } else {
            self.append_required(now, &accepted_event)?;
            book.add_order(order)
        };

        let result = match added {
            Ok(result) => result,
            Err(OrderBookError::WouldCross { price, .. }) => {
                self.journal_terminal(
                    now,
                    &request.symbol,
                    order_id,
                    OrderStatus::Rejected,
                    TerminalReason::Rejected,
                );
                self.publish_status(
                    order_id,
                    request.user_id,
                    &request.symbol,
                    OrderStatus::Rejected,
                    request.quantity,
                    Some(TerminalReason::Rejected),
                    request.client_order_id.as_deref(),
                );
                return Err(EngineError::WouldCross { price });
            }
            Err(OrderBookError::InsufficientLiquidity { requested, .. }) => {
                self.journal_terminal(
                    now,
                    &request.symbol,
                    order_id,
                    OrderStatus::Rejected,
                    TerminalReason::Unfilled,
                );
                self.publish_status(
                    order_id,
                    request.user_id,
                    &request.symbol,
                    OrderStatus::Rejected,
                    request.quantity,
                    Some(TerminalReason::Unfilled),
                    request.client_order_id.as_deref(),
                );
                return Err(EngineError::Unfilled {
                    requested,
                    remaining: requested,
                });
            }
            Err(other) => return Err(map_book_error(other)),
        };

        if result.status == OrderStatus::Rejected {
            // Market order that only triggered self-trade cancellations:
            // report the maker cancels, then reject the taker unfilled.
            self.process_result(
                &book,
                &product,
                &result,
                request.user_id,
                request.client_order_id.as_deref(),
                request.kind,
                now,
            );
            self.journal_terminal(
                now,
                &request.symbol,
                order_id,
                OrderStatus::Rejected,
                TerminalReason::Unfilled,
            );
            self.publish_status(
                order_id,
                request.user_id,
                &request.symbol,
                OrderStatus::Rejected,
                result.remaining_quantity,
                Some(TerminalReason::Unfilled),
                request.client_order_id.as_deref(),
            );
            return Err(EngineError::Unfilled {
                requested: result.original_quantity,
                remaining: result.remaining_quantity,
            });
        }

        // Acceptance ack precedes trades in the per-submission sequence.
        self.publish_status(
            order_id,
            request.user_id,
            &request.symbol,
            OrderStatus::Open,
            request.quantity,
            None,
            request.client_order_id.as_deref(),
        );

        self.process_result(
            &book,
            &product,
            &result,
            request.user_id,
            request.client_order_id.as_deref(),
            request.kind,
            now,
        );

        Ok(SubmitOutcome { order_id, result })
    }

    /// Cancel a resting order owned by `user_id`.
    ///
    /// # Errors
    /// `EngineError::NotFound` if unknown, terminal, or foreign-owned.
    pub fn cancel(
        &self,
        user_id: UserId,
        symbol: &str,
        order_id: OrderId,
    ) -> Result<(), EngineError> {
        let book = self.book(symbol)?;
        let open = book
            .get_order(order_id)
            .ok_or(EngineError::NotFound(order_id))?;
        if open.user_id != user_id {
            return Err(EngineError::NotFound(order_id));
        }
        let now = self.clock.now_ms();
        let cancelled = book
            .cancel_order(order_id)
            .map_err(|_| EngineError::NotFound(order_id))?;

        self.journal_terminal(
            now,
            symbol,
            order_id,
            OrderStatus::Cancelled,
            TerminalReason::UserCancel,
        );
        self.publish_status(
            order_id,
            user_id,
            symbol,
            OrderStatus::Cancelled,
            cancelled.remaining,
            Some(TerminalReason::UserCancel),
            None,
        );
        self.publish_depth(&book);
        Ok(())
    }

    /// Cancel every resting order `user_id` has on `symbol`.
    pub fn cancel_all(&self, user_id: UserId, symbol: &str) -> Result<usize, EngineError> {
        let book = self.book(symbol)?;
        let now = self.clock.now_ms();
        let cancelled = book.cancel_all_for_user(user_id);
        for order in &cancelled {
            self.journal_terminal(
                now,
                symbol,
                order.id,
                OrderStatus::Cancelled,
                TerminalReason::UserCancel,
            );
            self.publish_status(
                order.id,
                user_id,
                symbol,
                OrderStatus::Cancelled,
                order.remaining,
                Some(TerminalReason::UserCancel),
                None,
            );
        }
        if !cancelled.is_empty() {
            self.publish_depth(&book);
        }
        Ok(cancelled.len())
    }

    /// Modify a resting order owned by `user_id`. A strict quantity
    /// decrease keeps queue priority; a price change or increase is
    /// cancel+re-add and may match immediately.
    ///
    /// # Errors
    /// `NotFound`, `TickViolation`, `QtyBounds`, `WouldCross`,
    /// `InvalidModify`.
    pub fn modify(
        &self,
        user_id: UserId,
        symbol: &str,
        order_id: OrderId,
        new_price: Option<Price>,
        new_qty: Option<Qty>,
    ) -> Result<(), EngineError> {
        let product = self
            .catalog
            .get(symbol)
            .map_err(|_| EngineError::SymbolUnknown(symbol.to_string()))?
            .clone();
        let book = self.book(symbol)?;
        let open = book
            .get_order(order_id)
            .ok_or(EngineError::NotFound(order_id))?;
        if open.user_id != user_id {
            return Err(EngineError::NotFound(order_id));
        }
        if let Some(price) = new_price
            && (price == 0 || !product.price_on_tick(price))
        {
            return Err(EngineError::TickViolation {
                price,
                tick_size: product.tick_size,
            });
        }
        if let Some(qty) = new_qty
            && qty > 0
            && !product.qty_in_bounds(qty)
        {
            return Err(EngineError::QtyBounds {
                quantity: qty,
                min: product.min_order_qty,
                max: product.max_order_qty,
            });
        }

        let now = self.clock.now_ms();
        let outcome = book
            .modify_order(order_id, new_price, new_qty)
            .map_err(map_book_error)?;

        if let Err(err) = self.journal.append(
            now,
            &JournalEvent::OrderModified {
                symbol: symbol.to_string(),
                order_id,
                new_price,
                new_qty,
            },
        ) {
            error!("journal append failed for modify of {order_id}: {err}");
        }

        match outcome {
            ModifyResult::Reduced { order } => {
                self.publish_status(
                    order_id,
                    user_id,
                    symbol,
                    OrderStatus::Open,
                    order.remaining,
                    None,
                    None,
                );
                self.publish_depth(&book);
            }
            ModifyResult::Replaced(result) => {
                self.process_result(&book, &product, &result, user_id, None, OrderKind::Limit, now);
            }
        }
        Ok(())
    }

    /// Best bid and ask for `symbol`.
    ///
    /// # Errors
    /// `EngineError::SymbolUnknown`.
    pub fn bbo(&self, symbol: &str) -> Result<(Option<Price>, Option<Price>), EngineError> {
        Ok(self.book(symbol)?.bbo())
    }

    /// Top-`n` depth for `symbol`.
    ///
    /// # Errors
    /// `EngineError::SymbolUnknown`.
    pub fn depth(&self, symbol: &str, n: usize) -> Result<DepthSnapshot, EngineError> {
        Ok(self.book(symbol)?.depth(n))
    }

    /// Every resting order for `user_id`, across all books.
    #[must_use]
    pub fn orders_open(&self, user_id: UserId) -> Vec<(String, OpenOrder)> {
        let mut out = Vec::new();
        let mut symbols: Vec<String> = self.books.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        for symbol in symbols {
            if let Some(book) = self.books.get(&symbol) {
                for order in book.value().orders_for_user(user_id) {
                    out.push((symbol.clone(), order));
                }
            }
        }
        out
    }

    /// Fatal-class invariant sweep across every book and the position
    /// manager.
    ///
    /// # Errors
    /// `EngineError::InvariantViolated` with the first violation found.
    pub fn check_invariants(&self) -> Result<(), EngineError> {
        for entry in self.books.iter() {
            entry
                .value()
                .check_invariants()
                .map_err(EngineError::InvariantViolated)?;
        }
        self.positions
            .check_invariants()
            .map_err(EngineError::InvariantViolated)
    }

    /// Re-execute an accepted order during journal replay: no validation,
    /// no journaling, no event publication. Matching is deterministic, so
    /// the recorded order stream reproduces identical books and positions.
    pub(crate) fn replay_accepted(&self, symbol: &str, order: Order) -> Result<(), EngineError> {
        let book = self.book(symbol)?;
        self.clock.order_ids.resume_after(order.id);
        match book.add_order(order) {
            Ok(result) => {
                for trade in &result.trades {
                    self.clock.trade_ids.resume_after(trade.trade_id);
                    self.apply_trade_fills(symbol, trade);
                }
                Ok(())
            }
            // Rejections replay as rejections; state is unchanged either way.
            Err(OrderBookError::WouldCross { .. })
            | Err(OrderBookError::InsufficientLiquidity { .. }) => Ok(()),
            Err(other) => Err(map_book_error(other)),
        }
    }

    /// Re-apply a user cancel during replay.
    pub(crate) fn replay_cancel(&self, symbol: &str, order_id: OrderId) {
        if let Ok(book) = self.book(symbol) {
            let _ = book.cancel_order(order_id);
        }
    }

    /// Re-apply a modify during replay.
    pub(crate) fn replay_modify(
        &self,
        symbol: &str,
        order_id: OrderId,
        new_price: Option<Price>,
        new_qty: Option<Qty>,
    ) {
        if let Ok(book) = self.book(symbol)
            && let Ok(ModifyResult::Replaced(result)) =
                book.modify_order(order_id, new_price, new_qty)
        {
            for trade in &result.trades {
                self.clock.trade_ids.resume_after(trade.trade_id);
                self.apply_trade_fills(symbol, trade);
            }
        }
    }

    /// Journal, apply and publish everything one match result implies:
    /// self-trade cancels, trades with maker and taker fills, position
    /// updates, the depth change, and terminal transitions, in the
    /// per-submission order the stream contract requires.
    fn process_result(
        &self,
        book: &Arc<OrderBook>,
        product: &Product,
        result: &MatchResult,
        taker_user: UserId,
        client_order_id: Option<&str>,
        kind: OrderKind,
        now: TimestampMs,
    ) {
        for cancelled in &result.stp_cancelled {
            self.journal_terminal(
                now,
                &product.symbol,
                cancelled.order_id,
                OrderStatus::Cancelled,
                TerminalReason::SelfTrade,
            );
            self.publish_status(
                cancelled.order_id,
                cancelled.user_id,
                &product.symbol,
                OrderStatus::Cancelled,
                cancelled.remaining,
                Some(TerminalReason::SelfTrade),
                None,
            );
        }

        let mut position_updates: BTreeMap<UserId, PositionSnapshot> = BTreeMap::new();
        let mut maker_users: BTreeMap<OrderId, UserId> = BTreeMap::new();
        for trade in &result.trades {
            if let Err(err) = self
                .journal
                .append(now, &JournalEvent::OrderTrade { trade: trade.clone() })
            {
                error!("journal append failed for trade {}: {err}", trade.trade_id);
            }
            self.hub.publish(StreamEvent::Trade {
                trade: trade.clone(),
            });
            maker_users.insert(trade.maker_order_id, trade.maker_user_id);

            for (user, side) in [
                (trade.maker_user_id, trade.taker_side.opposite()),
                (trade.taker_user_id, trade.taker_side),
            ] {
                match self.positions.apply_fill(
                    user,
                    &trade.symbol,
                    side,
                    trade.quantity,
                    trade.price,
                ) {
                    Ok(snapshot) => {
                        let balance = self
                            .positions
                            .get_account(user)
                            .map(|a| a.balance)
                            .unwrap_or(0);
                        if let Err(err) = self.journal.append(
                            now,
                            &JournalEvent::PositionChanged {
                                user_id: user,
                                symbol: trade.symbol.clone(),
                                size: snapshot.size,
                                entry_price: snapshot.entry_price,
                                realized_pnl: snapshot.realized_pnl,
                                balance,
                            },
                        ) {
                            error!("journal append failed for position of {user}: {err}");
                        }
                        position_updates.insert(user, snapshot);
                    }
                    Err(err) => {
                        error!(
                            "fill application failed for user {user} on {}: {err}",
                            trade.symbol
                        );
                    }
                }
            }
        }

        for snapshot in position_updates.into_values() {
            self.hub.publish(StreamEvent::Position { position: snapshot });
        }

        self.publish_depth(book);

        for maker_id in &result.filled_maker_ids {
            self.journal_terminal(
                now,
                &product.symbol,
                *maker_id,
                OrderStatus::Filled,
                TerminalReason::Filled,
            );
            if let Some(user) = maker_users.get(maker_id) {
                self.publish_status(
                    *maker_id,
                    *user,
                    &product.symbol,
                    OrderStatus::Filled,
                    0,
                    Some(TerminalReason::Filled),
                    None,
                );
            }
        }

        if result.status.is_terminal() && result.status != OrderStatus::Rejected {
            let reason = match (result.status, kind) {
                (OrderStatus::Filled, _) => TerminalReason::Filled,
                (_, OrderKind::Ioc) => TerminalReason::IocRemainder,
                _ => TerminalReason::Unfilled,
            };
            self.journal_terminal(now, &product.symbol, result.order_id, result.status, reason);
            self.publish_status(
                result.order_id,
                taker_user,
                &product.symbol,
                result.status,
                result.remaining_quantity,
                Some(reason),
                client_order_id,
            );
        }
    }

    fn apply_trade_fills(&self, symbol: &str, trade: &crate::book::Trade) {
        for (user, side) in [
            (trade.maker_user_id, trade.taker_side.opposite()),
            (trade.taker_user_id, trade.taker_side),
        ] {
            if let Err(err) = self
                .positions
                .apply_fill(user, symbol, side, trade.quantity, trade.price)
            {
                error!("replay fill application failed for {user} on {symbol}: {err}");
            }
        }
    }

    /// Write-ahead append whose failure must abort the submission.
    fn append_required(
        &self,
        now: TimestampMs,
        event: &JournalEvent,
    ) -> Result<(), EngineError> {
        self.journal.append(now, event).map_err(|err| match err {
            JournalError::RingFull { .. } => EngineError::JournalFull,
            other => EngineError::InvariantViolated(other.to_string()),
        })?;
        Ok(())
    }

    fn journal_terminal(
        &self,
        now: TimestampMs,
        symbol: &str,
        order_id: OrderId,
        status: OrderStatus,
        reason: TerminalReason,
    ) {
        if let Err(err) = self.journal.append(
            now,
            &JournalEvent::OrderTerminal {
                symbol: symbol.to_string(),
                order_id,
                status,
                reason,
            },
        ) {
            error!("journal append failed for terminal of {order_id}: {err}");
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn publish_status(
        &self,
        order_id: OrderId,
        user_id: UserId,
        symbol: &str,
        status: OrderStatus,
        remaining: Qty,
        reason: Option<TerminalReason>,
        client_order_id: Option<&str>,
    ) {
        self.hub.publish(StreamEvent::OrderStatus {
            order_id,
            user_id,
            symbol: symbol.to_string(),
            status,
            remaining,
            reason,
            client_order_id: client_order_id.map(str::to_owned),
        });
    }

    fn publish_depth(&self, book: &Arc<OrderBook>) {
        self.hub.publish(StreamEvent::Depth {
            depth: book.depth(self.depth_levels),
        });
    }
}

fn map_book_error(err: OrderBookError) -> EngineError {
    match err {
        OrderBookError::OrderNotFound(id) => EngineError::NotFound(id),
        OrderBookError::WouldCross { price, .. } => EngineError::WouldCross { price },
        OrderBookError::InsufficientLiquidity { requested, .. } => EngineError::Unfilled {
            requested,
            remaining: requested,
        },
        OrderBookError::InvalidModify { message } | OrderBookError::InvalidOperation { message } => {
            EngineError::InvalidModify(message)
        }
    }
}
