//! Hedge intent and broker-adapter exchange types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Price, Qty, Side, SignedQty, TimestampMs};

/// An outbound hedge instruction for the external broker adapter.
/// At most one intent is in flight per symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HedgeIntent {
    /// Correlation id echoed in the ack/reject.
    pub intent_id: Uuid,
    /// Hedged symbol.
    pub symbol: String,
    /// External-venue side: `Sell` offloads net long customer exposure.
    pub side: Side,
    /// Size rounded down onto the external lot grid.
    pub size: Qty,
    /// When the intent was emitted.
    pub ts_ms: TimestampMs,
}

/// Broker adapter acknowledgement of a filled hedge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HedgeAck {
    /// The intent this ack answers.
    pub intent_id: Uuid,
    /// Price the hedge filled at, external units.
    pub filled_price: Price,
    /// Quantity actually filled (may be below the intent size).
    pub filled_size: Qty,
}

/// Broker adapter rejection of a hedge intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HedgeReject {
    /// The intent this reject answers.
    pub intent_id: Uuid,
    /// Adapter-supplied reason.
    pub reason: String,
}

/// Per-symbol hedge baseline, captured in snapshots and reloaded from the
/// journal on restart so the engine never double-hedges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HedgeBaseline {
    /// Symbol.
    pub symbol: String,
    /// Current net exposure.
    pub net: SignedQty,
    /// Last acknowledged hedged position.
    pub hedged: SignedQty,
    /// When the last hedge was acknowledged.
    pub last_hedge_ms: TimestampMs,
}

/// Raised when the broker adapter exhausted its retry budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HedgeAlert {
    /// Symbol the abandoned intent targeted.
    pub symbol: String,
    /// Alert description for the operator stream.
    pub message: String,
}
