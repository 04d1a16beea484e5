//! Shared fixtures: an isolated exchange with a manual clock, an
//! in-memory journal, and a two-product catalog.

use std::sync::Arc;

use perpx_rs::prelude::*;

/// Fixed-point quantity scale used across the integration tests
/// (`tick_quantity_scale = 8`).
pub const SCALE: u64 = 100_000_000;

/// Start-of-test manual clock time.
pub const T0: u64 = 1_000_000;

/// House liquidity account, excluded from net exposure.
pub const HOUSE: UserId = 1_000;

pub fn product(symbol: &str, external: &str) -> Product {
    Product {
        symbol: symbol.to_string(),
        display_name: symbol.to_string(),
        quote_currency: "MNT".to_string(),
        external_symbol: external.to_string(),
        contract_size: SCALE / 100, // lot = 0.01 contract
        tick_size: 1,
        qty_step: 1,
        min_order_qty: 1,
        max_order_qty: u64::MAX,
        leverage_cap: 10,
        maintenance_margin_bps: 50,
        initial_margin_factor_bps: 10_000,
        trading_hours: TradingHours::ALWAYS,
        active: true,
        hedgeable: true,
        conversion: UnitConversion::Native,
        hedge_deadband: 10 * SCALE,
        hedge_throttle_ms: 5_000,
    }
}

pub struct Fixture {
    pub exchange: Exchange,
    pub clock: Arc<ClockService>,
    pub journal: Arc<MemoryJournal>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(ExchangeConfig::default())
    }

    pub fn with_config(config: ExchangeConfig) -> Self {
        let clock = Arc::new(ClockService::manual(T0));
        let journal = Arc::new(MemoryJournal::new());
        let exchange = Exchange::new(
            config,
            vec![product("XAU-MNT", "XAUUSD"), product("BTC-MNT", "BTCUSD")],
            Arc::clone(&journal) as Arc<dyn Journal>,
            Arc::clone(&clock),
        );
        Self {
            exchange,
            clock,
            journal,
        }
    }

    /// Publish a two-sided quote so the mark lands exactly at `price`.
    pub fn set_mark(&self, external: &str, price: Price) {
        self.exchange.on_quote_tick(QuoteTick {
            external_symbol: external.to_string(),
            bid: Some(price),
            ask: Some(price),
            ts_ms: self.clock.now_ms(),
        });
    }

    /// Deposit and return the user, for terse test setup.
    pub fn fund(&self, user: UserId, amount: Money) -> UserId {
        self.exchange.deposit(user, amount).unwrap();
        user
    }

    pub fn limit(
        &self,
        user: UserId,
        symbol: &str,
        side: Side,
        qty: Qty,
        price: Price,
    ) -> Result<OrderId, EngineError> {
        self.exchange.submit(SubmitRequest {
            user_id: user,
            symbol: symbol.to_string(),
            side,
            kind: OrderKind::Limit,
            quantity: qty,
            limit_price: Some(price),
            leverage: None,
            client_order_id: None,
        })
    }

    pub fn market(
        &self,
        user: UserId,
        symbol: &str,
        side: Side,
        qty: Qty,
    ) -> Result<OrderId, EngineError> {
        self.exchange.submit(SubmitRequest {
            user_id: user,
            symbol: symbol.to_string(),
            side,
            kind: OrderKind::Market,
            quantity: qty,
            limit_price: None,
            leverage: None,
            client_order_id: None,
        })
    }
}

/// `n` whole contracts in fixed-point units.
pub fn contracts(n: u64) -> Qty {
    n * SCALE
}

/// Drain every queued event from a subscriber.
pub fn drain(subscriber: &Subscriber) -> Vec<Envelope> {
    std::iter::from_fn(|| subscriber.try_recv()).collect()
}
