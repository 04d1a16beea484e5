//! Mark-price oracle: fuses the external quote feed and reference rate
//! into a per-symbol mark.

use crossbeam::atomic::AtomicCell;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use super::types::{MarkRecord, MarkSource, MarkUpdate, QuoteTick, ReferenceRateUpdate};
use crate::catalog::{ProductCatalog, RateSnapshot, RateTag};
use crate::clock::ClockService;
use crate::types::{Price, TimestampMs};

#[derive(Debug, Clone, Copy, Default)]
struct QuoteState {
    bid: Option<Price>,
    ask: Option<Price>,
    ts_ms: TimestampMs,
}

#[derive(Debug, Clone, Copy, Default)]
struct RateState {
    rate_micros: u64,
    ts_ms: TimestampMs,
}

/// The price oracle. Writers (the feed worker) update records; readers
/// take whole-record copies, never partially written state.
#[derive(Debug)]
pub struct PriceOracle {
    catalog: Arc<ProductCatalog>,
    clock: Arc<ClockService>,
    marks: DashMap<String, MarkRecord>,
    quotes: DashMap<String, QuoteState>,
    rate: AtomicCell<RateState>,
    staleness_threshold_ms: u64,
    connected: AtomicBool,
}

impl PriceOracle {
    /// Create an oracle over `catalog` with the given staleness threshold.
    #[must_use]
    pub fn new(
        catalog: Arc<ProductCatalog>,
        clock: Arc<ClockService>,
        staleness_threshold_ms: u64,
    ) -> Self {
        Self {
            catalog,
            clock,
            marks: DashMap::new(),
            quotes: DashMap::new(),
            rate: AtomicCell::new(RateState::default()),
            staleness_threshold_ms,
            connected: AtomicBool::new(true),
        }
    }

    /// Latest mark for `symbol`, if one has ever been published.
    #[must_use]
    pub fn mark(&self, symbol: &str) -> Option<MarkRecord> {
        self.marks.get(symbol).map(|r| *r.value())
    }

    /// Whether the mark for `symbol` currently suppresses order flow:
    /// missing, tagged stale, or aged past the threshold as of `now_ms`.
    #[must_use]
    pub fn is_stale(&self, symbol: &str, now_ms: TimestampMs) -> bool {
        match self.mark(symbol) {
            None => true,
            Some(record) => {
                record.is_stale()
                    || now_ms.saturating_sub(record.ts_ms) >= self.staleness_threshold_ms
            }
        }
    }

    /// Point-in-time view of the reference rate as of `now_ms`.
    #[must_use]
    pub fn rate_snapshot(&self, now_ms: TimestampMs) -> RateSnapshot {
        let state = self.rate.load();
        RateSnapshot {
            rate_micros: state.rate_micros,
            ts_ms: state.ts_ms,
            stale: state.rate_micros == 0
                || now_ms.saturating_sub(state.ts_ms) >= self.staleness_threshold_ms,
        }
    }

    /// Apply a reference-rate record. Older-than-current records are
    /// ignored to keep publication monotonic.
    pub fn on_reference_rate(&self, update: ReferenceRateUpdate) {
        let current = self.rate.load();
        if update.ts_ms < current.ts_ms {
            return;
        }
        self.rate.store(RateState {
            rate_micros: update.rate_micros,
            ts_ms: update.ts_ms,
        });
        debug!(
            "reference rate {} (micro) at {}",
            update.rate_micros, update.ts_ms
        );
    }

    /// Apply one quote tick. Returns the mark updates it produced, one per
    /// catalog symbol mapped to the tick's external underlying.
    ///
    /// The mid is `(bid + ask) / 2`; with one side missing the present
    /// side is fused with the last-known opposite, or used alone. Ticks
    /// older than the current record for a symbol are dropped.
    pub fn on_quote_tick(&self, tick: QuoteTick) -> Vec<MarkUpdate> {
        let mut state = self
            .quotes
            .get(&tick.external_symbol)
            .map(|e| *e.value())
            .unwrap_or_default();
        if tick.ts_ms < state.ts_ms {
            return Vec::new();
        }
        if tick.bid.is_some() {
            state.bid = tick.bid;
        }
        if tick.ask.is_some() {
            state.ask = tick.ask;
        }
        state.ts_ms = tick.ts_ms;
        self.quotes.insert(tick.external_symbol.clone(), state);

        let Some(external_mid) = mid(state.bid, state.ask) else {
            return Vec::new();
        };

        let rate = self.rate_snapshot(self.clock.now_ms());
        let mut updates = Vec::new();
        for product in self.catalog.by_external_symbol(&tick.external_symbol) {
            let (price, rate_tag) = self.catalog.convert_price(product, external_mid, &rate);
            if price == 0 {
                continue;
            }
            let source = match rate_tag {
                RateTag::Fresh => MarkSource::Oracle,
                RateTag::Stale => MarkSource::Stale,
            };
            let record = MarkRecord {
                price,
                ts_ms: tick.ts_ms,
                source,
            };
            let superseded = self
                .marks
                .get(&product.symbol)
                .is_some_and(|current| tick.ts_ms < current.ts_ms);
            if superseded {
                continue;
            }
            self.marks.insert(product.symbol.clone(), record);
            updates.push(MarkUpdate {
                symbol: product.symbol.clone(),
                record,
            });
        }
        updates
    }

    /// Sweep for staleness as of `now_ms`. Records that aged past the
    /// threshold are re-tagged [`MarkSource::Stale`] (price retained) and
    /// returned so observers learn of the transition.
    pub fn poll(&self, now_ms: TimestampMs) -> Vec<MarkUpdate> {
        let mut updates = Vec::new();
        for mut entry in self.marks.iter_mut() {
            let symbol = entry.key().clone();
            let record = entry.value_mut();
            if record.source != MarkSource::Stale
                && now_ms.saturating_sub(record.ts_ms) >= self.staleness_threshold_ms
            {
                warn!(
                    "mark for {} stale: last update {} ms ago",
                    symbol,
                    now_ms.saturating_sub(record.ts_ms)
                );
                record.source = MarkSource::Stale;
                updates.push(MarkUpdate {
                    symbol,
                    record: *record,
                });
            }
        }
        updates
    }

    /// Feed loss: every mark is retained but tagged stale immediately.
    pub fn on_disconnect(&self) -> Vec<MarkUpdate> {
        self.connected.store(false, Ordering::Release);
        warn!("oracle feed disconnected; marks tagged stale");
        let mut updates = Vec::new();
        for mut entry in self.marks.iter_mut() {
            let symbol = entry.key().clone();
            let record = entry.value_mut();
            if record.source != MarkSource::Stale {
                record.source = MarkSource::Stale;
                updates.push(MarkUpdate {
                    symbol,
                    record: *record,
                });
            }
        }
        updates
    }

    /// Feed restored: republish every last-known mark tagged
    /// [`MarkSource::Fallback`] before fresh ticks arrive. Fallback marks
    /// still suppress nothing; staleness is governed by their age.
    pub fn on_reconnect(&self) -> Vec<MarkUpdate> {
        self.connected.store(true, Ordering::Release);
        info!("oracle feed reconnected; republishing last-known marks");
        let mut updates = Vec::new();
        for mut entry in self.marks.iter_mut() {
            let symbol = entry.key().clone();
            let record = entry.value_mut();
            record.source = MarkSource::Fallback;
            updates.push(MarkUpdate {
                symbol,
                record: *record,
            });
        }
        updates
    }

    /// Whether the feed is currently considered connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Reinstall a mark from the journal during replay.
    pub fn restore_mark(&self, symbol: &str, price: Price, ts_ms: TimestampMs) {
        self.marks.insert(
            symbol.to_string(),
            MarkRecord {
                price,
                ts_ms,
                source: MarkSource::Fallback,
            },
        );
    }
}

fn mid(bid: Option<Price>, ask: Option<Price>) -> Option<Price> {
    match (bid, ask) {
        (Some(b), Some(a)) => Some((b + a) / 2),
        (Some(b), None) => Some(b),
        (None, Some(a)) => Some(a),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Product, TradingHours, UnitConversion};

    fn catalog() -> Arc<ProductCatalog> {
        Arc::new(ProductCatalog::new(vec![Product {
            symbol: "XAU-MNT".to_string(),
            display_name: "Gold".to_string(),
            quote_currency: "MNT".to_string(),
            external_symbol: "XAUUSD".to_string(),
            contract_size: 1,
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
            conversion: UnitConversion::ViaReferenceRate,
            hedge_deadband: 10,
            hedge_throttle_ms: 5_000,
        }]))
    }

    fn oracle() -> (PriceOracle, Arc<ClockService>) {
        let clock = Arc::new(ClockService::manual(10_000));
        let oracle = PriceOracle::new(catalog(), Arc::clone(&clock), 5_000);
        oracle.on_reference_rate(ReferenceRateUpdate {
            rate_micros: 2 * crate::catalog::RATE_SCALE as u64, // rate 2.0
            ts_ms: 10_000,
        });
        (oracle, clock)
    }

    #[test]
    fn fuses_mid_and_converts_through_rate() {
        let (oracle, _clock) = oracle();
        let updates = oracle.on_quote_tick(QuoteTick {
            external_symbol: "XAUUSD".to_string(),
            bid: Some(4_990),
            ask: Some(5_010),
            ts_ms: 10_000,
        });
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].symbol, "XAU-MNT");
        // mid 5000, rate 2.0 => 10_000 MNT
        assert_eq!(updates[0].record.price, 10_000);
        assert_eq!(updates[0].record.source, MarkSource::Oracle);
        assert!(!oracle.is_stale("XAU-MNT", 10_000));
    }

    #[test]
    fn one_sided_tick_uses_last_known_other_side() {
        let (oracle, _clock) = oracle();
        oracle.on_quote_tick(QuoteTick {
            external_symbol: "XAUUSD".to_string(),
            bid: Some(4_990),
            ask: Some(5_010),
            ts_ms: 10_000,
        });
        let updates = oracle.on_quote_tick(QuoteTick {
            external_symbol: "XAUUSD".to_string(),
            bid: Some(5_010),
            ask: None,
            ts_ms: 10_100,
        });
        // mid of (5010, 5010) = 5010, converted: 10_020
        assert_eq!(updates[0].record.price, 10_020);
    }

    #[test]
    fn out_of_order_ticks_are_dropped() {
        let (oracle, _clock) = oracle();
        oracle.on_quote_tick(QuoteTick {
            external_symbol: "XAUUSD".to_string(),
            bid: Some(5_000),
            ask: Some(5_000),
            ts_ms: 10_000,
        });
        let updates = oracle.on_quote_tick(QuoteTick {
            external_symbol: "XAUUSD".to_string(),
            bid: Some(1_000),
            ask: Some(1_000),
            ts_ms: 9_000,
        });
        assert!(updates.is_empty());
        assert_eq!(oracle.mark("XAU-MNT").unwrap().price, 10_000);
    }

    #[test]
    fn staleness_after_threshold_gap() {
        let (oracle, clock) = oracle();
        oracle.on_quote_tick(QuoteTick {
            external_symbol: "XAUUSD".to_string(),
            bid: Some(5_000),
            ask: Some(5_000),
            ts_ms: 10_000,
        });
        assert!(!oracle.is_stale("XAU-MNT", 14_999));

        clock.clock.advance(6_000);
        let updates = oracle.poll(16_000);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].record.source, MarkSource::Stale);
        // Price retained.
        assert_eq!(updates[0].record.price, 10_000);
        assert!(oracle.is_stale("XAU-MNT", 16_000));
    }

    #[test]
    fn disconnect_tags_stale_and_reconnect_republishes_fallback() {
        let (oracle, _clock) = oracle();
        oracle.on_quote_tick(QuoteTick {
            external_symbol: "XAUUSD".to_string(),
            bid: Some(5_000),
            ask: Some(5_000),
            ts_ms: 10_000,
        });

        let stale = oracle.on_disconnect();
        assert_eq!(stale.len(), 1);
        assert!(oracle.is_stale("XAU-MNT", 10_000));
        assert!(!oracle.is_connected());

        let republished = oracle.on_reconnect();
        assert_eq!(republished.len(), 1);
        assert_eq!(republished[0].record.source, MarkSource::Fallback);
        assert_eq!(republished[0].record.price, 10_000);
    }

    #[test]
    fn unknown_symbol_is_stale() {
        let (oracle, _clock) = oracle();
        assert!(oracle.is_stale("DOGE-MNT", 0));
    }
}
