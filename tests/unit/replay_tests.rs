//! Journal replay: a recovered core must be identical to the original.

use perpx_rs::prelude::*;

use super::common::{Fixture, T0, contracts, product};
use std::sync::Arc;

/// Drive a session, then replay its journal into a fresh core and compare
/// serialized books and accounts.
#[test]
fn replay_reproduces_books_and_positions() {
    let f = Fixture::new();
    f.set_mark("XAUUSD", 10_000);
    f.fund(1, 10_000_000);
    f.fund(2, 10_000_000);
    f.fund(3, 10_000_000);

    f.limit(1, "XAU-MNT", Side::Sell, contracts(3), 10_000).unwrap();
    f.limit(2, "XAU-MNT", Side::Buy, contracts(1), 9_900).unwrap();
    f.market(3, "XAU-MNT", Side::Buy, contracts(2)).unwrap();
    let to_cancel = f.limit(2, "XAU-MNT", Side::Buy, contracts(1), 9_950).unwrap();
    f.exchange.cancel(2, "XAU-MNT", to_cancel).unwrap();
    let to_modify = f.limit(3, "XAU-MNT", Side::Sell, contracts(2), 10_100).unwrap();
    f.exchange
        .modify(3, "XAU-MNT", to_modify, Some(10_050), None)
        .unwrap();

    let recovered = Exchange::recover(
        ExchangeConfig::default(),
        vec![product("XAU-MNT", "XAUUSD"), product("BTC-MNT", "BTCUSD")],
        Arc::clone(&f.journal) as Arc<dyn Journal>,
        Arc::new(ClockService::manual(T0)),
    );

    let original = f.exchange.snapshot().unwrap().into_snapshot().unwrap();
    let replayed = recovered.snapshot().unwrap().into_snapshot().unwrap();
    assert_eq!(
        serde_json::to_value(&original.books).unwrap(),
        serde_json::to_value(&replayed.books).unwrap()
    );
    assert_eq!(
        serde_json::to_value(&original.accounts).unwrap(),
        serde_json::to_value(&replayed.accounts).unwrap()
    );
    recovered.check_invariants().unwrap();

    // New ids never collide with recorded ones.
    recovered.deposit(4, 10_000_000).unwrap();
    recovered.on_quote_tick(QuoteTick {
        external_symbol: "XAUUSD".to_string(),
        bid: Some(10_000),
        ask: Some(10_000),
        ts_ms: T0 + 1,
    });
    let next = recovered
        .submit(SubmitRequest {
            user_id: 4,
            symbol: "XAU-MNT".to_string(),
            side: Side::Buy,
            kind: OrderKind::Limit,
            quantity: contracts(1),
            limit_price: Some(9_000),
            leverage: None,
            client_order_id: None,
        })
        .unwrap();
    assert!(next > to_modify);
}

/// Hedge baselines reload from the journal so restart never double-hedges.
#[test]
fn replay_restores_hedge_baseline() {
    let mut config = ExchangeConfig::default();
    config.house_accounts = vec![super::common::HOUSE];
    let f = Fixture::with_config(config.clone());
    f.set_mark("XAUUSD", 100);
    f.fund(super::common::HOUSE, 1_000_000_000);
    f.fund(1, 100_000_000);

    let mut intents = f.exchange.hedge_intent_receiver().unwrap();
    f.limit(super::common::HOUSE, "XAU-MNT", Side::Sell, contracts(30), 100)
        .unwrap();
    f.market(1, "XAU-MNT", Side::Buy, contracts(12)).unwrap();
    let intent = intents.try_recv().unwrap();
    f.exchange.on_hedge_ack(HedgeAck {
        intent_id: intent.intent_id,
        filled_price: 100,
        filled_size: intent.size,
    });

    let recovered = Exchange::recover(
        config,
        vec![product("XAU-MNT", "XAUUSD"), product("BTC-MNT", "BTCUSD")],
        Arc::clone(&f.journal) as Arc<dyn Journal>,
        Arc::new(ClockService::manual(T0)),
    );
    let mut recovered_intents = recovered.hedge_intent_receiver().unwrap();

    // Net exposure +12 equals the restored baseline: nothing to hedge.
    recovered.poll();
    assert!(recovered_intents.try_recv().is_err());

    let baselines: Vec<HedgeBaseline> = recovered
        .snapshot()
        .unwrap()
        .into_snapshot()
        .unwrap()
        .hedge;
    let xau = baselines.iter().find(|b| b.symbol == "XAU-MNT").unwrap();
    assert_eq!(xau.hedged, contracts(12) as i64);
}

/// Snapshot + restore round-trips core state without replaying orders.
#[test]
fn snapshot_restore_roundtrip() {
    let f = Fixture::new();
    f.set_mark("XAUUSD", 10_000);
    f.fund(1, 10_000_000);
    f.fund(2, 10_000_000);
    f.limit(1, "XAU-MNT", Side::Sell, contracts(2), 10_000).unwrap();
    f.market(2, "XAU-MNT", Side::Buy, contracts(1)).unwrap();

    let package = f.exchange.snapshot().unwrap();
    let json = package.to_json().unwrap();

    let restored = Exchange::new(
        ExchangeConfig::default(),
        vec![product("XAU-MNT", "XAUUSD"), product("BTC-MNT", "BTCUSD")],
        Arc::new(MemoryJournal::new()) as Arc<dyn Journal>,
        Arc::new(ClockService::manual(T0)),
    );
    restored
        .restore(SnapshotPackage::from_json(&json).unwrap())
        .unwrap();

    assert_eq!(
        restored.get_bbo("XAU-MNT").unwrap(),
        f.exchange.get_bbo("XAU-MNT").unwrap()
    );
    let original_account = f.exchange.get_account(2).unwrap();
    let restored_account = restored.get_account(2).unwrap();
    assert_eq!(original_account, restored_account);
    restored.check_invariants().unwrap();
}
