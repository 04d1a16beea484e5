//! The hedge engine: converts aggregate net book exposure into outbound
//! hedge intents with deadband and throttle.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{HedgeAck, HedgeAlert, HedgeBaseline, HedgeIntent, HedgeReject};
use crate::catalog::ProductCatalog;
use crate::clock::ClockService;
use crate::types::{Side, SignedQty, TimestampMs};

#[derive(Debug, Clone)]
struct InFlight {
    intent: HedgeIntent,
    /// Signed exposure delta the intent covers.
    delta: SignedQty,
    attempts: u32,
}

#[derive(Debug, Default)]
struct HedgeState {
    net: SignedQty,
    hedged: SignedQty,
    last_hedge_ms: TimestampMs,
    in_flight: Option<InFlight>,
}

/// The outcome of an adapter ack: the new baseline, for journaling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HedgeAckOutcome {
    /// Hedged symbol.
    pub symbol: String,
    /// New hedged baseline.
    pub hedged: SignedQty,
    /// When the ack was applied.
    pub ts_ms: TimestampMs,
}

/// Tracks net exposure per hedgeable symbol and pushes intents onto a
/// bounded queue consumed by the external broker adapter. The match path
/// never blocks on hedging: a full queue just defers the intent to the
/// next evaluation.
#[derive(Debug)]
pub struct HedgeEngine {
    catalog: Arc<ProductCatalog>,
    clock: Arc<ClockService>,
    state: DashMap<String, HedgeState>,
    intent_tx: mpsc::Sender<HedgeIntent>,
    max_attempts: u32,
}

impl HedgeEngine {
    /// Create the engine and the receiving end of the intent queue.
    #[must_use]
    pub fn new(
        catalog: Arc<ProductCatalog>,
        clock: Arc<ClockService>,
        queue_depth: usize,
        max_attempts: u32,
    ) -> (Self, mpsc::Receiver<HedgeIntent>) {
        let (intent_tx, intent_rx) = mpsc::channel(queue_depth.max(1));
        (
            Self {
                catalog,
                clock,
                state: DashMap::new(),
                intent_tx,
                max_attempts,
            },
            intent_rx,
        )
    }

    /// Record a new net exposure for `symbol` and evaluate the hedge
    /// condition.
    pub fn on_net_exposure(&self, symbol: &str, net: SignedQty) {
        {
            let mut state = self.state.entry(symbol.to_string()).or_default();
            state.net = net;
        }
        self.evaluate(symbol);
    }

    /// Periodic tick: re-evaluates every tracked symbol (throttle windows
    /// expire without exposure changes).
    pub fn poll(&self) {
        let symbols: Vec<String> = self.state.iter().map(|e| e.key().clone()).collect();
        for symbol in symbols {
            self.evaluate(&symbol);
        }
    }

    /// Emit an intent when `|net − hedged| ≥ deadband` and the throttle
    /// window has elapsed, with at most one intent in flight per symbol.
    fn evaluate(&self, symbol: &str) {
        let Ok(product) = self.catalog.get(symbol) else {
            return;
        };
        if !product.hedgeable {
            return;
        }
        let now = self.clock.now_ms();

        let Some(mut state) = self.state.get_mut(symbol) else {
            return;
        };
        if state.in_flight.is_some() {
            return;
        }
        let delta = state.net - state.hedged;
        if delta.unsigned_abs() < product.hedge_deadband {
            return;
        }
        if now.saturating_sub(state.last_hedge_ms) < product.hedge_throttle_ms
            && state.last_hedge_ms != 0
        {
            return;
        }
        let size = product.round_to_lot(delta.unsigned_abs());
        if size == 0 {
            return;
        }

        let intent = HedgeIntent {
            intent_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            // Net long customer exposure is offloaded by selling externally.
            side: if delta > 0 { Side::Sell } else { Side::Buy },
            size,
            ts_ms: now,
        };
        let covered = SignedQty::try_from(size).unwrap_or(SignedQty::MAX) * delta.signum();

        match self.intent_tx.try_send(intent.clone()) {
            Ok(()) => {
                info!(
                    "hedge intent {} for {}: {} {} (net {}, hedged {})",
                    intent.intent_id, symbol, intent.side, size, state.net, state.hedged
                );
                state.in_flight = Some(InFlight {
                    intent,
                    delta: covered,
                    attempts: 1,
                });
            }
            Err(_) => {
                warn!("hedge intent queue full; deferring {symbol}");
            }
        }
    }

    /// Apply a broker ack: advance the hedged baseline by the filled
    /// portion and open the throttle window. Returns the new baseline for
    /// journaling, or `None` for an unknown intent id.
    pub fn on_ack(&self, ack: &HedgeAck) -> Option<HedgeAckOutcome> {
        let symbol = self.symbol_of_intent(ack.intent_id)?;
        let now = self.clock.now_ms();
        let mut state = self.state.get_mut(&symbol)?;
        let in_flight = state.in_flight.take()?;

        let filled = ack.filled_size.min(in_flight.intent.size);
        let signed_fill =
            SignedQty::try_from(filled).unwrap_or(SignedQty::MAX) * in_flight.delta.signum();
        state.hedged += signed_fill;
        state.last_hedge_ms = now;
        debug!(
            "hedge ack {} for {}: filled {} @ {}, hedged now {}",
            ack.intent_id, symbol, ack.filled_size, ack.filled_price, state.hedged
        );
        Some(HedgeAckOutcome {
            symbol: symbol.clone(),
            hedged: state.hedged,
            ts_ms: now,
        })
    }

    /// Apply a broker rejection: retry up to the attempt budget, keeping
    /// the baseline untouched; past the budget, abandon the intent and
    /// return an operator alert.
    pub fn on_reject(&self, reject: &HedgeReject) -> Option<HedgeAlert> {
        let symbol = self.symbol_of_intent(reject.intent_id)?;
        let mut state = self.state.get_mut(&symbol)?;
        let mut in_flight = state.in_flight.take()?;

        if in_flight.attempts >= self.max_attempts {
            warn!(
                "hedge intent {} for {} abandoned after {} attempts: {}",
                reject.intent_id, symbol, in_flight.attempts, reject.reason
            );
            return Some(HedgeAlert {
                symbol: symbol.clone(),
                message: format!(
                    "hedge adapter down: {} rejected after {} attempts ({})",
                    reject.intent_id, in_flight.attempts, reject.reason
                ),
            });
        }

        in_flight.attempts += 1;
        warn!(
            "hedge intent {} for {} rejected ({}), retry {}/{}",
            reject.intent_id, symbol, reject.reason, in_flight.attempts, self.max_attempts
        );
        match self.intent_tx.try_send(in_flight.intent.clone()) {
            Ok(()) => {
                state.in_flight = Some(in_flight);
                None
            }
            Err(_) => Some(HedgeAlert {
                symbol: symbol.clone(),
                message: "hedge adapter down: intent queue full on retry".to_string(),
            }),
        }
    }

    /// Current baseline per tracked symbol, sorted by symbol.
    #[must_use]
    pub fn baselines(&self) -> Vec<HedgeBaseline> {
        let mut out: Vec<HedgeBaseline> = self
            .state
            .iter()
            .map(|e| HedgeBaseline {
                symbol: e.key().clone(),
                net: e.value().net,
                hedged: e.value().hedged,
                last_hedge_ms: e.value().last_hedge_ms,
            })
            .collect();
        out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        out
    }

    /// Reinstall a hedged baseline from the journal during replay so the
    /// engine never double-hedges recovered exposure.
    pub fn restore(&self, symbol: &str, hedged: SignedQty, last_hedge_ms: TimestampMs) {
        let mut state = self.state.entry(symbol.to_string()).or_default();
        state.hedged = hedged;
        state.last_hedge_ms = last_hedge_ms;
    }

    fn symbol_of_intent(&self, intent_id: Uuid) -> Option<String> {
        self.state.iter().find_map(|e| {
            e.value()
                .in_flight
                .as_ref()
                .filter(|f| f.intent.intent_id == intent_id)
                .map(|_| e.key().clone())
        })
    }
}
