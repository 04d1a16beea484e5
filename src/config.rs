//! Startup configuration for the exchange core.

use serde::{Deserialize, Serialize};

/// Enumerated startup options. Everything here is fixed for the lifetime
/// of the [`crate::exchange::Exchange`] instance; per-product parameters
/// (tick size, margin rates, hedge deadband) live on
/// [`crate::catalog::Product`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Fixed-point exponent for quantities: a quantity of `10^k` represents
    /// one whole contract. Typical 8.
    pub tick_quantity_scale: u32,

    /// Per-subscriber stream queue depth. Typical 1024.
    pub stream_queue_depth: usize,

    /// How many undeliverable non-droppable events a subscriber may
    /// accumulate beyond its queue before the hub disconnects it.
    pub stream_block_budget: usize,

    /// Capacity of the in-memory journal ring. A full ring rejects
    /// submissions with `JournalFull`.
    pub journal_ring_depth: usize,

    /// Mark-price and reference-rate staleness threshold in milliseconds.
    /// Default 5000.
    pub staleness_threshold_ms: u64,

    /// Whether maker-cancel self-trade prevention is active on every book.
    pub self_trade_prevention: bool,

    /// Basis points added to the maintenance rate when computing the
    /// liquidation price, as a cushion against gap risk.
    pub liquidation_buffer_bps: u32,

    /// Maximum hedge submission attempts per intent before an
    /// operator alert is raised and the intent is abandoned.
    pub hedge_max_attempts: u32,

    /// Capacity of the outbound hedge-intent queue to the broker adapter.
    pub hedge_queue_depth: usize,

    /// House liquidity accounts. Their positions are excluded from net
    /// exposure: hedging covers customer exposure, and the house side of
    /// a customer fill is what gets offloaded externally.
    pub house_accounts: Vec<crate::types::UserId>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            tick_quantity_scale: 8,
            stream_queue_depth: 1024,
            stream_block_budget: 256,
            journal_ring_depth: 65_536,
            staleness_threshold_ms: 5_000,
            self_trade_prevention: true,
            liquidation_buffer_bps: 0,
            hedge_max_attempts: 3,
            hedge_queue_depth: 64,
            house_accounts: Vec::new(),
        }
    }
}

impl ExchangeConfig {
    /// The quantity scale as a multiplier: `10^tick_quantity_scale`.
    #[must_use]
    #[inline]
    pub fn qty_scale(&self) -> u64 {
        10u64.pow(self.tick_quantity_scale)
    }
}
