//! Stream event records and channel tags.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::book::{DepthSnapshot, Trade};
use crate::journal::TerminalReason;
use crate::oracle::MarkSource;
use crate::position::PositionSnapshot;
use crate::types::{OrderId, OrderStatus, Price, Qty, TimestampMs, UserId};

/// The six stream channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Mark-price updates.
    Quote,
    /// Top-N book updates.
    Depth,
    /// Executed matches.
    Trade,
    /// Per-user position updates.
    Position,
    /// Order lifecycle updates.
    OrderStatus,
    /// Operational alerts.
    OperatorAlert,
}

impl Channel {
    /// Stable index for per-channel sequence counters.
    #[must_use]
    pub(crate) fn index(self) -> usize {
        match self {
            Channel::Quote => 0,
            Channel::Depth => 1,
            Channel::Trade => 2,
            Channel::Position => 3,
            Channel::OrderStatus => 4,
            Channel::OperatorAlert => 5,
        }
    }

    /// The mask bit for this channel.
    #[must_use]
    pub fn mask(self) -> ChannelMask {
        match self {
            Channel::Quote => ChannelMask::QUOTE,
            Channel::Depth => ChannelMask::DEPTH,
            Channel::Trade => ChannelMask::TRADE,
            Channel::Position => ChannelMask::POSITION,
            Channel::OrderStatus => ChannelMask::ORDER_STATUS,
            Channel::OperatorAlert => ChannelMask::OPERATOR_ALERT,
        }
    }
}

bitflags! {
    /// Channel subscription mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ChannelMask: u32 {
        /// Mark-price updates.
        const QUOTE = 1 << 0;
        /// Top-N book updates.
        const DEPTH = 1 << 1;
        /// Executed matches.
        const TRADE = 1 << 2;
        /// Per-user position updates.
        const POSITION = 1 << 3;
        /// Order lifecycle updates.
        const ORDER_STATUS = 1 << 4;
        /// Operational alerts.
        const OPERATOR_ALERT = 1 << 5;
        /// Every channel.
        const ALL = Self::QUOTE.bits()
            | Self::DEPTH.bits()
            | Self::TRADE.bits()
            | Self::POSITION.bits()
            | Self::ORDER_STATUS.bits()
            | Self::OPERATOR_ALERT.bits();
    }
}

/// One event as published on the hub. JSON-encoded at the adapter
/// boundary via [`Envelope::to_json`]; the envelope carries the record
/// timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "kebab-case")]
pub enum StreamEvent {
    /// A mark-price change.
    Quote {
        /// Symbol.
        symbol: String,
        /// Mark in quote minor units.
        price: Price,
        /// Provenance of the mark.
        source: MarkSource,
        /// Input timestamp behind the mark.
        source_ts: TimestampMs,
    },
    /// A top-N depth change.
    Depth {
        /// The aggregated view.
        depth: DepthSnapshot,
    },
    /// A match.
    Trade {
        /// The trade record.
        trade: Trade,
    },
    /// A per-user position change.
    Position {
        /// The position after the change.
        position: PositionSnapshot,
    },
    /// An order lifecycle transition.
    OrderStatus {
        /// The order.
        order_id: OrderId,
        /// Owner.
        user_id: UserId,
        /// Symbol.
        symbol: String,
        /// New status.
        status: OrderStatus,
        /// Remaining quantity at the transition.
        remaining: Qty,
        /// Terminal reason, for terminal statuses.
        reason: Option<TerminalReason>,
        /// Client-supplied correlation id, echoed back.
        client_order_id: Option<String>,
    },
    /// An operational alert.
    OperatorAlert {
        /// Short machine-readable code.
        code: String,
        /// Human-readable description.
        message: String,
        /// Symbol scope, if any.
        symbol: Option<String>,
    },
}

impl StreamEvent {
    /// The channel this event belongs to.
    #[must_use]
    pub fn channel(&self) -> Channel {
        match self {
            StreamEvent::Quote { .. } => Channel::Quote,
            StreamEvent::Depth { .. } => Channel::Depth,
            StreamEvent::Trade { .. } => Channel::Trade,
            StreamEvent::Position { .. } => Channel::Position,
            StreamEvent::OrderStatus { .. } => Channel::OrderStatus,
            StreamEvent::OperatorAlert { .. } => Channel::OperatorAlert,
        }
    }

    /// The symbol the event concerns, where applicable.
    #[must_use]
    pub fn symbol(&self) -> Option<&str> {
        match self {
            StreamEvent::Quote { symbol, .. } => Some(symbol),
            StreamEvent::Depth { depth } => Some(&depth.symbol),
            StreamEvent::Trade { trade } => Some(&trade.symbol),
            StreamEvent::Position { position } => Some(&position.symbol),
            StreamEvent::OrderStatus { symbol, .. } => Some(symbol),
            StreamEvent::OperatorAlert { symbol, .. } => symbol.as_deref(),
        }
    }

    /// The user the event is scoped to. Trade events fan out to both
    /// parties through the symbol scope instead.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            StreamEvent::Position { position } => Some(position.user_id),
            StreamEvent::OrderStatus { user_id, .. } => Some(*user_id),
            _ => None,
        }
    }

    /// Whether overflow may replace an older event with the same key:
    /// only the latest `quote`/`depth` per symbol must be retained.
    #[must_use]
    pub(crate) fn coalescable(&self) -> bool {
        matches!(self, StreamEvent::Quote { .. } | StreamEvent::Depth { .. })
    }
}

/// A published record: per-channel monotonic sequence plus the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-channel monotonic sequence number.
    pub seq: u64,
    /// Publish time.
    pub ts: TimestampMs,
    /// The event.
    #[serde(flatten)]
    pub event: StreamEvent,
}

impl Envelope {
    /// JSON encoding for the adapter boundary.
    ///
    /// # Errors
    /// Serialization failure (should not occur for well-formed events).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
