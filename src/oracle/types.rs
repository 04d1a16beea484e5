//! Feed records and published mark types.

use serde::{Deserialize, Serialize};

use crate::types::{Price, TimestampMs};

/// One push record from the external quote feed. Either side may be
/// missing when the venue publishes a one-sided market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteTick {
    /// Key of the underlying on the external feed.
    pub external_symbol: String,
    /// Bid in external quote units, if present.
    pub bid: Option<Price>,
    /// Ask in external quote units, if present.
    pub ask: Option<Price>,
    /// Feed timestamp.
    pub ts_ms: TimestampMs,
}

/// Periodic external→quote-currency reference rate record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRateUpdate {
    /// Rate scaled by [`crate::catalog::RATE_SCALE`].
    pub rate_micros: u64,
    /// Feed timestamp.
    pub ts_ms: TimestampMs,
}

/// Provenance of a published mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkSource {
    /// Freshly fused from the external feed.
    Oracle,
    /// Republished last-known value after a reconnect.
    Fallback,
    /// Aged past the staleness threshold, or derived through a stale
    /// reference rate. Suppresses new order acceptance.
    Stale,
}

/// The published mark for one symbol. `Copy` so readers take whole-record
/// snapshots with no tearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkRecord {
    /// Last fused mid, in quote-currency minor units.
    pub price: Price,
    /// When the inputs behind this mark were produced.
    pub ts_ms: TimestampMs,
    /// Provenance tag.
    pub source: MarkSource,
}

impl MarkRecord {
    /// Whether this mark blocks new order acceptance.
    #[must_use]
    #[inline]
    pub fn is_stale(&self) -> bool {
        self.source == MarkSource::Stale
    }
}

/// A mark change to be fanned out and marked-to-market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkUpdate {
    /// Catalog symbol the mark belongs to.
    pub symbol: String,
    /// The new record.
    pub record: MarkRecord,
}
