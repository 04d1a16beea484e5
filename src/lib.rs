//! # Cash-Settled Perpetual Futures Exchange Core
//!
//! A perpetual futures exchange core in Rust: it accepts order flow for a
//! fixed catalog of symbols, matches it against price-time priority limit
//! order books, tracks per-user positions with leverage and margin, marks
//! positions continuously against an external reference price, and
//! auto-hedges the exchange's aggregate net exposure against an external
//! liquidity provider. All funds and P&L are denominated in a single
//! quote currency.
//!
//! ## Subsystems
//!
//! - **Matching engine** ([`engine`], [`book`]): per-symbol limit order
//!   books with four order types (limit, market, IOC, post-only),
//!   FIFO price levels, and maker-cancel self-trade prevention.
//! - **Position manager** ([`position`]): weighted-average entry
//!   accounting, realized/unrealized P&L, integer margin computation, and
//!   the liquidation trigger. Per-account serialization via one mutex per
//!   account.
//! - **Mark-price oracle** ([`oracle`]): fuses an external quote feed
//!   with a reference rate into a per-symbol mark, with staleness tagging
//!   that suppresses new order flow.
//! - **Hedge engine** ([`hedge`]): converts net book exposure into
//!   outbound hedge intents with per-product deadband and throttle.
//! - **Stream hub** ([`stream`]): fan-out of quote, depth, trade,
//!   position, order-status and operator-alert events to many subscribers
//!   with per-subscriber bounded queues and latest-wins coalescing,
//!   never blocking the match path.
//! - **Journal hook** ([`journal`]): the write-ahead contract the
//!   external persistence adapter satisfies, plus deterministic replay
//!   and checksummed full-state snapshots.
//!
//! ## Design
//!
//! - **Fixed-point everywhere.** Prices are tick-scaled integers in quote
//!   minor units; quantities are scaled by `10^tick_quantity_scale`. All
//!   margin and P&L arithmetic is integer; floats exist only at the
//!   adapter boundary.
//! - **No globals.** Every component is constructor-injected and owned
//!   by the root [`exchange::Exchange`] object, so tests instantiate
//!   fully isolated cores.
//! - **Single-writer books.** A book is mutated by one logical thread of
//!   execution per symbol; published state (BBO, depth, marks) is read
//!   through lock-free snapshots.
//!
//! ## Quick start
//!
//! ```
//! use std::sync::Arc;
//! use perpx_rs::prelude::*;
//!
//! let clock = Arc::new(ClockService::manual(1_000_000));
//! let journal: Arc<dyn Journal> = Arc::new(MemoryJournal::new());
//! let product = Product {
//!     symbol: "XAU-MNT".to_string(),
//!     display_name: "Gold / Tugrik".to_string(),
//!     quote_currency: "MNT".to_string(),
//!     external_symbol: "XAUUSD".to_string(),
//!     contract_size: 100_000_000,
//!     tick_size: 1,
//!     qty_step: 1,
//!     min_order_qty: 1,
//!     max_order_qty: u64::MAX,
//!     leverage_cap: 10,
//!     maintenance_margin_bps: 50,
//!     initial_margin_factor_bps: 10_000,
//!     trading_hours: TradingHours::ALWAYS,
//!     active: true,
//!     hedgeable: true,
//!     conversion: UnitConversion::Native,
//!     hedge_deadband: 10,
//!     hedge_throttle_ms: 5_000,
//! };
//! let exchange = Exchange::new(ExchangeConfig::default(), vec![product], journal, clock);
//!
//! exchange.deposit(1, 1_000_000).unwrap();
//! exchange.on_quote_tick(QuoteTick {
//!     external_symbol: "XAUUSD".to_string(),
//!     bid: Some(10_000),
//!     ask: Some(10_000),
//!     ts_ms: 1_000_000,
//! });
//! let order_id = exchange
//!     .submit(SubmitRequest {
//!         user_id: 1,
//!         symbol: "XAU-MNT".to_string(),
//!         side: Side::Buy,
//!         kind: OrderKind::Limit,
//!         quantity: 100_000_000,
//!         limit_price: Some(10_000),
//!         leverage: None,
//!         client_order_id: None,
//!     })
//!     .unwrap();
//! assert!(order_id > 0);
//! ```

pub mod book;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod engine;
pub mod exchange;
pub mod hedge;
pub mod journal;
pub mod oracle;
pub mod position;
pub mod prelude;
pub mod stream;
pub mod types;

pub use book::{OrderBook, OrderBookError};
pub use catalog::{Product, ProductCatalog};
pub use clock::ClockService;
pub use config::ExchangeConfig;
pub use engine::{EngineError, MatchingEngine, SubmitRequest};
pub use exchange::Exchange;
pub use hedge::HedgeEngine;
pub use journal::{Journal, MemoryJournal, RingJournal};
pub use oracle::PriceOracle;
pub use position::PositionManager;
pub use stream::StreamHub;
