//! The exchange root: constructor-injected wiring of every component and
//! the external interfaces the boundary adapters consume.
//!
//! All components are owned here and handed out as `Arc` handles, so
//! tests (and embedders) can instantiate fully isolated exchanges with
//! no process-global state anywhere in the core.

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::book::{DepthSnapshot, OpenOrder};
use crate::catalog::{Product, ProductCatalog};
use crate::clock::ClockService;
use crate::config::ExchangeConfig;
use crate::engine::{EngineError, MatchingEngine, SubmitRequest};
use crate::hedge::{HedgeAck, HedgeEngine, HedgeIntent, HedgeReject};
use crate::journal::{
    ExchangeSnapshot, Journal, JournalEvent, JournaledEvent, MarkEntry, SnapshotPackage,
    TerminalReason,
};
use crate::oracle::{MarkRecord, PriceOracle, QuoteTick, ReferenceRateUpdate};
use crate::position::{
    AccountSnapshot, LiquidationIntent, PositionManager, PositionSnapshot,
};
use crate::stream::{StreamEvent, StreamHub, Subscriber, SubscriptionFilter};
use crate::types::{
    Money, OrderId, OrderKind, OrderOrigin, Price, Qty, UserId,
};

/// Number of aggregated levels in published depth events.
const DEPTH_EVENT_LEVELS: usize = 10;

/// The assembled exchange core.
pub struct Exchange {
    config: ExchangeConfig,
    clock: Arc<ClockService>,
    catalog: Arc<ProductCatalog>,
    oracle: Arc<PriceOracle>,
    positions: Arc<PositionManager>,
    hub: Arc<StreamHub>,
    engine: MatchingEngine,
    hedge: HedgeEngine,
    journal: Arc<dyn Journal>,
    hedge_intents: Mutex<Option<mpsc::Receiver<HedgeIntent>>>,
}

impl Exchange {
    /// Assemble an exchange over a product catalog and a journal adapter.
    #[must_use]
    pub fn new(
        config: ExchangeConfig,
        products: Vec<Product>,
        journal: Arc<dyn Journal>,
        clock: Arc<ClockService>,
    ) -> Self {
        let catalog = Arc::new(ProductCatalog::new(products));
        let oracle = Arc::new(PriceOracle::new(
            Arc::clone(&catalog),
            Arc::clone(&clock),
            config.staleness_threshold_ms,
        ));
        let positions = Arc::new(PositionManager::new(
            Arc::clone(&catalog),
            Arc::clone(&oracle),
            config.qty_scale(),
            config.liquidation_buffer_bps,
            &config.house_accounts,
        ));
        let hub = Arc::new(StreamHub::new(
            Arc::clone(&clock),
            config.stream_queue_depth,
            config.stream_block_budget,
        ));
        let engine = MatchingEngine::new(
            Arc::clone(&catalog),
            Arc::clone(&clock),
            Arc::clone(&oracle),
            Arc::clone(&positions),
            Arc::clone(&hub),
            Arc::clone(&journal),
            config.self_trade_prevention,
            DEPTH_EVENT_LEVELS,
        );
        let (hedge, hedge_intents) = HedgeEngine::new(
            Arc::clone(&catalog),
            Arc::clone(&clock),
            config.hedge_queue_depth,
            config.hedge_max_attempts,
        );
        info!("exchange assembled: {} products", catalog.len());
        Self {
            config,
            clock,
            catalog,
            oracle,
            positions,
            hub,
            engine,
            hedge,
            journal,
            hedge_intents: Mutex::new(Some(hedge_intents)),
        }
    }

    /// Rebuild an exchange from a journal by replaying every recorded
    /// event into a fresh core.
    #[must_use]
    pub fn recover(
        config: ExchangeConfig,
        products: Vec<Product>,
        journal: Arc<dyn Journal>,
        clock: Arc<ClockService>,
    ) -> Self {
        let events = journal.read_all();
        let exchange = Self::new(config, products, journal, clock);
        exchange.replay(&events);
        exchange
    }

    // ------------------------------------------------------------------
    // Submission interface
    // ------------------------------------------------------------------

    /// Submit a new order. Returns the engine-assigned order id.
    ///
    /// # Errors
    /// Validation, risk, state or backpressure errors, surfaced with
    /// explicit codes.
    pub fn submit(&self, request: SubmitRequest) -> Result<OrderId, EngineError> {
        let symbol = request.symbol.clone();
        let outcome = self.engine.submit(&request, OrderOrigin::Customer)?;
        if !outcome.result.trades.is_empty() {
            self.after_fills(&symbol);
        }
        Ok(outcome.order_id)
    }

    /// Cancel a resting order.
    ///
    /// # Errors
    /// `EngineError::NotFound` and symbol-level validation errors.
    pub fn cancel(
        &self,
        user_id: UserId,
        symbol: &str,
        order_id: OrderId,
    ) -> Result<(), EngineError> {
        self.engine.cancel(user_id, symbol, order_id)
    }

    /// Modify a resting order.
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
        self.engine
            .modify(user_id, symbol, order_id, new_price, new_qty)?;
        self.after_fills(symbol);
        Ok(())
    }

    /// Cancel every resting order the user has on `symbol`. Returns how
    /// many were cancelled.
    ///
    /// # Errors
    /// `EngineError::SymbolUnknown`.
    pub fn cancel_all(&self, user_id: UserId, symbol: &str) -> Result<usize, EngineError> {
        self.engine.cancel_all(user_id, symbol)
    }

    /// Credit collateral to an account, creating it on first deposit.
    /// Journalled so recovery reproduces balances.
    ///
    /// # Errors
    /// `EngineError::JournalFull` when the ring cannot take the event.
    pub fn deposit(&self, user_id: UserId, amount: Money) -> Result<Money, EngineError> {
        self.journal
            .append(
                self.clock.now_ms(),
                &JournalEvent::BalanceDeposited { user_id, amount },
            )
            .map_err(|_| EngineError::JournalFull)?;
        Ok(self.positions.deposit(user_id, amount))
    }

    // ------------------------------------------------------------------
    // Query interface
    // ------------------------------------------------------------------

    /// Best bid and ask.
    ///
    /// # Errors
    /// `EngineError::SymbolUnknown`.
    pub fn get_bbo(&self, symbol: &str) -> Result<(Option<Price>, Option<Price>), EngineError> {
        self.engine.bbo(symbol)
    }

    /// Top-`n` aggregated depth.
    ///
    /// # Errors
    /// `EngineError::SymbolUnknown`.
    pub fn get_depth(&self, symbol: &str, n: usize) -> Result<DepthSnapshot, EngineError> {
        self.engine.depth(symbol, n)
    }

    /// Latest mark for `symbol`, if one has been published.
    ///
    /// # Errors
    /// `EngineError::SymbolUnknown`.
    pub fn get_mark(&self, symbol: &str) -> Result<Option<MarkRecord>, EngineError> {
        self.catalog
            .get(symbol)
            .map_err(|_| EngineError::SymbolUnknown(symbol.to_string()))?;
        Ok(self.oracle.mark(symbol))
    }

    /// Position snapshot for (user, symbol).
    ///
    /// # Errors
    /// `EngineError::UnknownAccount`.
    pub fn get_position(
        &self,
        user_id: UserId,
        symbol: &str,
    ) -> Result<PositionSnapshot, EngineError> {
        self.positions
            .get_position(user_id, symbol)
            .map_err(|_| EngineError::UnknownAccount(user_id))
    }

    /// Account snapshot.
    ///
    /// # Errors
    /// `EngineError::UnknownAccount`.
    pub fn get_account(&self, user_id: UserId) -> Result<AccountSnapshot, EngineError> {
        self.positions
            .get_account(user_id)
            .map_err(|_| EngineError::UnknownAccount(user_id))
    }

    /// Every resting order for `user_id` across all symbols.
    #[must_use]
    pub fn get_orders_open(&self, user_id: UserId) -> Vec<(String, OpenOrder)> {
        self.engine.orders_open(user_id)
    }

    // ------------------------------------------------------------------
    // Mark-price feed
    // ------------------------------------------------------------------

    /// Apply one external quote tick: update marks, publish quote events,
    /// mark positions to market, and execute any triggered liquidations.
    pub fn on_quote_tick(&self, tick: QuoteTick) {
        let updates = self.oracle.on_quote_tick(tick);
        for update in updates {
            if let Err(err) = self.journal.append(
                self.clock.now_ms(),
                &JournalEvent::MarkUpdated {
                    symbol: update.symbol.clone(),
                    price: update.record.price,
                    ts_ms: update.record.ts_ms,
                },
            ) {
                warn!("journal append failed for mark of {}: {err}", update.symbol);
            }
            self.publish_mark(&update.symbol, update.record);
            self.mark_and_liquidate(&update.symbol, update.record);
        }
    }

    /// Apply a reference-rate record.
    pub fn on_reference_rate(&self, update: ReferenceRateUpdate) {
        self.oracle.on_reference_rate(update);
    }

    /// The oracle feed dropped. Marks are retained, tagged stale, and the
    /// staleness republished to subscribers.
    pub fn on_oracle_disconnect(&self) {
        for update in self.oracle.on_disconnect() {
            self.publish_mark(&update.symbol, update.record);
        }
        self.hub.publish(StreamEvent::OperatorAlert {
            code: "oracle-disconnected".to_string(),
            message: "oracle feed disconnected; marks tagged stale".to_string(),
            symbol: None,
        });
    }

    /// The oracle feed is back: republish last-known marks before fresh
    /// ticks arrive.
    pub fn on_oracle_reconnect(&self) {
        for update in self.oracle.on_reconnect() {
            self.publish_mark(&update.symbol, update.record);
        }
    }

    /// Periodic housekeeping: staleness sweep (with position re-marks so
    /// subscribers see the stale tag) and hedge throttle expiry.
    pub fn poll(&self) {
        let now = self.clock.now_ms();
        for update in self.oracle.poll(now) {
            self.publish_mark(&update.symbol, update.record);
            // Positions still mark against the last-known price; events
            // carry the stale tag.
            self.mark_and_liquidate(&update.symbol, update.record);
        }
        self.hedge.poll();
    }

    // ------------------------------------------------------------------
    // Broker / hedge adapter
    // ------------------------------------------------------------------

    /// Take the receive side of the hedge-intent queue. Yields `None`
    /// after the first call.
    pub fn hedge_intent_receiver(&self) -> Option<mpsc::Receiver<HedgeIntent>> {
        self.hedge_intents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    /// Broker adapter acknowledged a hedge fill.
    pub fn on_hedge_ack(&self, ack: HedgeAck) {
        if let Some(outcome) = self.hedge.on_ack(&ack) {
            if let Err(err) = self.journal.append(
                outcome.ts_ms,
                &JournalEvent::HedgeAcked {
                    symbol: outcome.symbol.clone(),
                    hedged: outcome.hedged,
                    ts_ms: outcome.ts_ms,
                },
            ) {
                error!("journal append failed for hedge ack on {}: {err}", outcome.symbol);
            }
        }
    }

    /// Broker adapter rejected a hedge intent.
    pub fn on_hedge_reject(&self, reject: HedgeReject) {
        if let Some(alert) = self.hedge.on_reject(&reject) {
            self.hub.publish(StreamEvent::OperatorAlert {
                code: "hedge-adapter-down".to_string(),
                message: alert.message,
                symbol: Some(alert.symbol),
            });
        }
    }

    // ------------------------------------------------------------------
    // Event stream
    // ------------------------------------------------------------------

    /// Register a stream subscriber.
    pub fn subscribe(&self, filter: SubscriptionFilter) -> Arc<Subscriber> {
        self.hub.subscribe(filter)
    }

    /// Remove a stream subscriber.
    pub fn unsubscribe(&self, subscriber_id: u64) {
        self.hub.unsubscribe(subscriber_id);
    }

    // ------------------------------------------------------------------
    // Snapshot / replay
    // ------------------------------------------------------------------

    /// Capture full core state, keyed by the journal sequence.
    ///
    /// # Errors
    /// Serialization failures from the snapshot package.
    pub fn snapshot(&self) -> Result<SnapshotPackage, crate::journal::JournalError> {
        let mut books = Vec::new();
        for symbol in self.catalog.active_symbols() {
            if let Ok(book) = self.engine.book(&symbol) {
                books.push(book.snapshot());
            }
        }
        let marks = self
            .catalog
            .active_symbols()
            .into_iter()
            .filter_map(|symbol| {
                self.oracle.mark(&symbol).map(|record| MarkEntry {
                    symbol,
                    price: record.price,
                    ts_ms: record.ts_ms,
                })
            })
            .collect();
        SnapshotPackage::new(ExchangeSnapshot {
            seq: self.journal.last_sequence().unwrap_or(0),
            ts_ms: self.clock.now_ms(),
            last_order_id: self.clock.order_ids.last_id(),
            last_trade_id: self.clock.trade_ids.last_id(),
            books,
            accounts: self.positions.accounts_snapshot(),
            hedge: self.hedge.baselines(),
            marks,
        })
    }

    /// Restore core state from a validated snapshot, then replay any
    /// journal events recorded after it.
    ///
    /// # Errors
    /// Checksum or version failures from the package.
    pub fn restore(
        &self,
        package: SnapshotPackage,
    ) -> Result<(), crate::journal::JournalError> {
        let snapshot = package.into_snapshot()?;
        for book_snapshot in &snapshot.books {
            if let Ok(book) = self.engine.book(&book_snapshot.symbol) {
                book.restore(book_snapshot);
            }
        }
        for account in snapshot.accounts {
            self.positions.restore_account(account);
        }
        for baseline in &snapshot.hedge {
            self.hedge
                .restore(&baseline.symbol, baseline.hedged, baseline.last_hedge_ms);
        }
        for mark in &snapshot.marks {
            self.oracle.restore_mark(&mark.symbol, mark.price, mark.ts_ms);
        }
        self.clock.order_ids.resume_after(snapshot.last_order_id);
        self.clock.trade_ids.resume_after(snapshot.last_trade_id);
        info!("restored snapshot at journal seq {}", snapshot.seq);
        Ok(())
    }

    /// Replay journalled events into this (fresh) core. Matching is
    /// deterministic: re-executing accepted orders, cancels and modifies
    /// reproduces identical books and positions; deposits and hedge acks
    /// apply directly; trade and position events are derived state and
    /// are skipped.
    pub fn replay(&self, events: &[JournaledEvent]) {
        for entry in events {
            match &entry.event {
                JournalEvent::OrderAccepted { symbol, order, .. } => {
                    if let Err(err) = self.engine.replay_accepted(symbol, order.clone()) {
                        error!("replay: order {} failed: {err}", order.id);
                    }
                }
                JournalEvent::OrderTerminal {
                    symbol,
                    order_id,
                    reason: TerminalReason::UserCancel,
                    ..
                } => {
                    self.engine.replay_cancel(symbol, *order_id);
                }
                JournalEvent::OrderModified {
                    symbol,
                    order_id,
                    new_price,
                    new_qty,
                } => {
                    self.engine
                        .replay_modify(symbol, *order_id, *new_price, *new_qty);
                }
                JournalEvent::BalanceDeposited { user_id, amount } => {
                    self.positions.deposit(*user_id, *amount);
                }
                JournalEvent::HedgeAcked {
                    symbol,
                    hedged,
                    ts_ms,
                } => {
                    self.hedge.restore(symbol, *hedged, *ts_ms);
                }
                JournalEvent::MarkUpdated {
                    symbol,
                    price,
                    ts_ms,
                } => {
                    self.oracle.restore_mark(symbol, *price, *ts_ms);
                }
                // Derived during replay by re-execution.
                JournalEvent::OrderTrade { .. }
                | JournalEvent::OrderTerminal { .. }
                | JournalEvent::PositionChanged { .. } => {}
            }
        }
        for symbol in self.catalog.hedgeable_symbols() {
            let net = self.positions.net_exposure(&symbol);
            if net != 0 {
                self.hedge.on_net_exposure(&symbol, net);
            }
        }
        info!("replay complete: {} events", events.len());
    }

    /// Fatal-class invariant sweep, for tests and supervision.
    ///
    /// # Errors
    /// `EngineError::InvariantViolated`.
    pub fn check_invariants(&self) -> Result<(), EngineError> {
        self.engine.check_invariants()
    }

    /// The shared clock service (manual in tests).
    #[must_use]
    pub fn clock(&self) -> &Arc<ClockService> {
        &self.clock
    }

    /// The exchange configuration.
    #[must_use]
    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn publish_mark(&self, symbol: &str, record: MarkRecord) {
        self.hub.publish(StreamEvent::Quote {
            symbol: symbol.to_string(),
            price: record.price,
            source: record.source,
            source_ts: record.ts_ms,
        });
    }

    /// After any fills on `symbol`: recompute net exposure for the hedge
    /// engine.
    fn after_fills(&self, symbol: &str) {
        let Ok(product) = self.catalog.get(symbol) else {
            return;
        };
        if product.hedgeable {
            let net = self.positions.net_exposure(symbol);
            self.hedge.on_net_exposure(symbol, net);
        }
    }

    /// Mark positions in `symbol` to market and execute any triggered
    /// liquidations. Liquidation orders bypass the margin check but not
    /// the book; a liquidation the book cannot fill raises an operator
    /// alert and flags the account for loss socialization.
    fn mark_and_liquidate(&self, symbol: &str, record: MarkRecord) {
        let outcome =
            self.positions
                .mark_to_market(symbol, record.price, record.is_stale());
        for snapshot in outcome.position_updates {
            self.hub.publish(StreamEvent::Position { position: snapshot });
        }
        for intent in outcome.liquidations {
            self.execute_liquidation(&intent);
        }
    }

    fn execute_liquidation(&self, intent: &LiquidationIntent) {
        let request = SubmitRequest {
            user_id: intent.user_id,
            symbol: intent.symbol.clone(),
            side: intent.side,
            kind: OrderKind::Market,
            quantity: intent.quantity,
            limit_price: None,
            leverage: None,
            client_order_id: None,
        };
        match self.engine.submit(&request, OrderOrigin::Liquidation) {
            Ok(outcome) => {
                warn!(
                    "liquidated user {} on {}: {} of {} filled",
                    intent.user_id,
                    intent.symbol,
                    outcome.result.executed_quantity(),
                    intent.quantity
                );
                self.after_fills(&intent.symbol);
                if outcome.result.remaining_quantity > 0 {
                    self.raise_socialized_loss(intent);
                }
            }
            Err(EngineError::Unfilled { .. }) => {
                self.raise_socialized_loss(intent);
            }
            Err(err) => {
                error!(
                    "liquidation submit failed for user {} on {}: {err}",
                    intent.user_id, intent.symbol
                );
            }
        }
    }

    fn raise_socialized_loss(&self, intent: &LiquidationIntent) {
        self.positions.mark_socialized_loss(intent.user_id);
        self.hub.publish(StreamEvent::OperatorAlert {
            code: "socialized-loss-pending".to_string(),
            message: format!(
                "liquidation of user {} on {} found no liquidity",
                intent.user_id, intent.symbol
            ),
            symbol: Some(intent.symbol.clone()),
        });
    }
}
