//! Convenience re-exports for embedders and tests.
//!
//! ```
//! use perpx_rs::prelude::*;
//! ```

pub use crate::book::{
    BookSnapshot, DepthLevel, DepthSnapshot, MatchResult, OpenOrder, Order, OrderBook,
    OrderBookError, Trade,
};
pub use crate::catalog::{
    CatalogError, Product, ProductCatalog, RateSnapshot, RateTag, TradingHours, UnitConversion,
};
pub use crate::clock::{Clock, ClockService, IdAllocator};
pub use crate::config::ExchangeConfig;
pub use crate::engine::{EngineError, MatchingEngine, SubmitOutcome, SubmitRequest};
pub use crate::exchange::Exchange;
pub use crate::hedge::{HedgeAck, HedgeBaseline, HedgeEngine, HedgeIntent, HedgeReject};
pub use crate::journal::{
    ExchangeSnapshot, Journal, JournalError, JournalEvent, JournaledEvent, MemoryJournal,
    RingJournal, SnapshotPackage, TerminalReason,
};
pub use crate::oracle::{
    MarkRecord, MarkSource, PriceOracle, QuoteTick, ReferenceRateUpdate,
};
pub use crate::position::{
    Account, AccountSnapshot, Position, PositionError, PositionManager, PositionSnapshot,
};
pub use crate::stream::{
    Channel, ChannelMask, Envelope, StreamEvent, StreamHub, Subscriber, SubscriptionFilter,
};
pub use crate::types::{
    Money, OrderId, OrderKind, OrderOrigin, OrderStatus, Price, Qty, Side, SignedQty, TimestampMs,
    TradeId, UserId,
};
