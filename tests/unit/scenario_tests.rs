//! End-to-end scenarios with literal inputs.

use perpx_rs::prelude::*;

use super::common::{Fixture, contracts, drain};

/// Price-time priority: two resting bids at the same price fill in
/// arrival order; the second keeps its remainder.
#[test]
fn scenario_a_price_time_priority() {
    let f = Fixture::new();
    f.set_mark("XAUUSD", 100);
    f.fund(1, 10_000_000);
    f.fund(2, 10_000_000);
    f.fund(3, 10_000_000);

    f.limit(1, "XAU-MNT", Side::Buy, contracts(2), 100).unwrap();
    f.limit(2, "XAU-MNT", Side::Buy, contracts(3), 100).unwrap();

    let subscriber = f.exchange.subscribe(SubscriptionFilter {
        channels: ChannelMask::TRADE,
        symbol: Some("XAU-MNT".to_string()),
        user_id: None,
    });

    f.market(3, "XAU-MNT", Side::Sell, contracts(4)).unwrap();

    let trades: Vec<Trade> = drain(&subscriber)
        .into_iter()
        .map(|envelope| match envelope.event {
            StreamEvent::Trade { trade } => trade,
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(trades.len(), 2);
    assert_eq!(trades[0].maker_user_id, 1);
    assert_eq!(trades[0].taker_user_id, 3);
    assert_eq!(trades[0].quantity, contracts(2));
    assert_eq!(trades[0].price, 100);
    assert_eq!(trades[1].maker_user_id, 2);
    assert_eq!(trades[1].quantity, contracts(2));
    assert_eq!(trades[1].price, 100);

    // User 2 rests with remaining 1 at 100.
    let open = f.exchange.get_orders_open(2);
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].1.remaining, contracts(1));
    assert_eq!(open[0].1.price, 100);
    f.exchange.check_invariants().unwrap();
}

/// Weighted-average entry: buy 1 @ 10,000 then 2 @ 11,500 gives entry
/// 11,000 on size +3.
#[test]
fn scenario_b_weighted_average_entry() {
    let f = Fixture::new();
    f.set_mark("XAUUSD", 10_000);
    f.fund(1, 10_000_000);
    f.fund(2, 10_000_000);

    f.limit(2, "XAU-MNT", Side::Sell, contracts(1), 10_000).unwrap();
    f.market(1, "XAU-MNT", Side::Buy, contracts(1)).unwrap();
    f.limit(2, "XAU-MNT", Side::Sell, contracts(2), 11_500).unwrap();
    f.limit(1, "XAU-MNT", Side::Buy, contracts(2), 11_500).unwrap();

    let position = f.exchange.get_position(1, "XAU-MNT").unwrap();
    assert_eq!(position.size, contracts(3) as i64);
    assert_eq!(position.entry_price, 11_000);
}

/// Reversal realizes P&L: long 2 @ 10,000, sell market 3 @ 12,000 →
/// realized 4,000, new position short 1 @ 12,000.
#[test]
fn scenario_c_reversal_realizes_pnl() {
    let f = Fixture::new();
    f.set_mark("XAUUSD", 10_000);
    f.fund(1, 10_000_000);
    f.fund(2, 100_000_000);

    f.limit(2, "XAU-MNT", Side::Sell, contracts(2), 10_000).unwrap();
    f.market(1, "XAU-MNT", Side::Buy, contracts(2)).unwrap();

    // Resting bid at 12,000 absorbs the reversal sell.
    f.limit(2, "XAU-MNT", Side::Buy, contracts(3), 12_000).unwrap();
    f.market(1, "XAU-MNT", Side::Sell, contracts(3)).unwrap();

    let position = f.exchange.get_position(1, "XAU-MNT").unwrap();
    assert_eq!(position.realized_pnl, 4_000);
    assert_eq!(position.size, -(contracts(1) as i64));
    assert_eq!(position.entry_price, 12_000);
}

/// Self-trade prevention: the resting maker is cancelled, the market
/// order is rejected `Unfilled`, and no trade is recorded.
#[test]
fn scenario_d_self_trade_prevention() {
    let f = Fixture::new();
    f.set_mark("XAUUSD", 100);
    f.fund(1, 10_000_000);

    let resting = f.limit(1, "XAU-MNT", Side::Buy, contracts(1), 100).unwrap();

    let subscriber = f.exchange.subscribe(SubscriptionFilter::all());
    drain(&subscriber);

    let err = f.market(1, "XAU-MNT", Side::Sell, contracts(1)).unwrap_err();
    assert!(matches!(err, EngineError::Unfilled { .. }));

    // The resting buy is gone, cancelled by STP with one notification.
    assert!(f.exchange.get_orders_open(1).is_empty());
    let events = drain(&subscriber);
    let stp_cancels: Vec<_> = events
        .iter()
        .filter(|e| {
            matches!(
                &e.event,
                StreamEvent::OrderStatus {
                    order_id,
                    status: OrderStatus::Cancelled,
                    reason: Some(TerminalReason::SelfTrade),
                    ..
                } if *order_id == resting
            )
        })
        .collect();
    assert_eq!(stp_cancels.len(), 1);
    assert!(
        events
            .iter()
            .all(|e| !matches!(e.event, StreamEvent::Trade { .. }))
    );
    f.exchange.check_invariants().unwrap();
}

/// Mark staleness blocks entry: after a 6 s oracle gap, submissions are
/// rejected `MarkStale` while existing positions still mark against the
/// last-known price, tagged stale in position events.
#[test]
fn scenario_e_mark_staleness_blocks_entry() {
    let f = Fixture::new();
    f.set_mark("XAUUSD", 10_000);
    f.fund(1, 10_000_000);
    f.fund(2, 10_000_000);

    f.limit(2, "XAU-MNT", Side::Sell, contracts(1), 10_000).unwrap();
    f.market(1, "XAU-MNT", Side::Buy, contracts(1)).unwrap();

    let subscriber = f.exchange.subscribe(SubscriptionFilter {
        channels: ChannelMask::POSITION,
        symbol: None,
        user_id: None,
    });

    // Oracle silent for 6 s.
    f.clock.clock.advance(6_000);
    f.exchange.poll();

    let err = f
        .limit(1, "XAU-MNT", Side::Buy, contracts(1), 10_000)
        .unwrap_err();
    assert!(matches!(err, EngineError::MarkStale(_)));

    let events = drain(&subscriber);
    assert!(!events.is_empty());
    for envelope in events {
        match envelope.event {
            StreamEvent::Position { position } => {
                assert!(position.mark_stale);
                assert_eq!(position.mark_price, 10_000);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}

/// Hedge deadband and baseline: customer exposure of +8 contracts stays
/// inside the deadband of 10; at +12 a sell-external intent for the full
/// 12 is emitted, and after the ack the baseline is 12.
#[test]
fn scenario_f_hedge_deadband() {
    let mut config = ExchangeConfig::default();
    config.house_accounts = vec![super::common::HOUSE];
    let f = Fixture::with_config(config);
    f.set_mark("XAUUSD", 100);
    f.fund(super::common::HOUSE, 1_000_000_000);
    f.fund(1, 100_000_000);

    let mut intents = f.exchange.hedge_intent_receiver().unwrap();

    // House quotes size; the customer lifts 8: inside the deadband.
    f.limit(super::common::HOUSE, "XAU-MNT", Side::Sell, contracts(20), 100)
        .unwrap();
    f.market(1, "XAU-MNT", Side::Buy, contracts(8)).unwrap();
    assert!(intents.try_recv().is_err());

    // Another 4 brings net customer exposure to +12: hedge fires.
    f.market(1, "XAU-MNT", Side::Buy, contracts(4)).unwrap();
    let intent = intents.try_recv().unwrap();
    assert_eq!(intent.symbol, "XAU-MNT");
    assert_eq!(intent.side, Side::Sell);
    assert_eq!(intent.size, contracts(12));

    f.exchange.on_hedge_ack(HedgeAck {
        intent_id: intent.intent_id,
        filled_price: 100,
        filled_size: intent.size,
    });
    let journalled = f.journal.read_all();
    let baseline = journalled
        .iter()
        .rev()
        .find_map(|entry| match &entry.event {
            JournalEvent::HedgeAcked { hedged, .. } => Some(*hedged),
            _ => None,
        })
        .unwrap();
    assert_eq!(baseline, contracts(12) as i64);
}

/// Market order priced off multiple levels executes at maker prices
/// level by level (no synthetic pricing), with the remainder cancelled.
#[test]
fn market_walks_levels_at_maker_prices() {
    let f = Fixture::new();
    f.set_mark("XAUUSD", 100);
    f.fund(1, 100_000_000);
    f.fund(2, 100_000_000);

    f.limit(2, "XAU-MNT", Side::Sell, contracts(1), 100).unwrap();
    f.limit(2, "XAU-MNT", Side::Sell, contracts(1), 105).unwrap();

    let subscriber = f.exchange.subscribe(SubscriptionFilter {
        channels: ChannelMask::TRADE,
        symbol: None,
        user_id: None,
    });

    f.market(1, "XAU-MNT", Side::Buy, contracts(3)).unwrap();

    let prices: Vec<Price> = drain(&subscriber)
        .into_iter()
        .map(|e| match e.event {
            StreamEvent::Trade { trade } => trade.price,
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(prices, vec![100, 105]);
    // Remainder cancelled, nothing rested.
    assert!(f.exchange.get_orders_open(1).is_empty());
}
