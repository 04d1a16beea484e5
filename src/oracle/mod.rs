//! Mark-price oracle: external quote feed + reference rate → per-symbol
//! mark, with staleness tagging and reconnect republishing.

mod oracle;
mod types;

pub use oracle::PriceOracle;
pub use types::{MarkRecord, MarkSource, MarkUpdate, QuoteTick, ReferenceRateUpdate};

/// Transport-level oracle failures. These never fail user submissions
/// directly; they surface as staleness and operator alerts.
#[derive(Debug)]
#[non_exhaustive]
pub enum OracleError {
    /// The external feed connection was lost. Marks are retained and
    /// tagged stale until reconnection.
    Disconnected,
}

impl std::fmt::Display for OracleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleError::Disconnected => write!(f, "oracle feed disconnected"),
        }
    }
}

impl std::error::Error for OracleError {}
