//! Exchange-level behavior: validation codes, margin boundaries,
//! liquidation, event ordering, and queries.

use perpx_rs::prelude::*;

use super::common::{Fixture, T0, contracts, drain, product};
use std::sync::Arc;

#[test]
fn validation_codes_surface_to_the_adapter() {
    let f = Fixture::new();
    f.set_mark("XAUUSD", 10_000);
    f.fund(1, 10_000_000);

    // Unknown symbol.
    assert!(matches!(
        f.limit(1, "DOGE-MNT", Side::Buy, contracts(1), 10_000),
        Err(EngineError::SymbolUnknown(_))
    ));

    // Unknown account.
    assert!(matches!(
        f.limit(99, "XAU-MNT", Side::Buy, contracts(1), 10_000),
        Err(EngineError::UnknownAccount(99))
    ));

    // Quantity below the product minimum.
    let err = f.exchange.submit(SubmitRequest {
        user_id: 1,
        symbol: "XAU-MNT".to_string(),
        side: Side::Buy,
        kind: OrderKind::Limit,
        quantity: 0,
        limit_price: Some(10_000),
        leverage: None,
        client_order_id: None,
    });
    assert!(matches!(err, Err(EngineError::QtyBounds { .. })));

    // Leverage above the product cap.
    let err = f.exchange.submit(SubmitRequest {
        user_id: 1,
        symbol: "XAU-MNT".to_string(),
        side: Side::Buy,
        kind: OrderKind::Limit,
        quantity: contracts(1),
        limit_price: Some(10_000),
        leverage: Some(50),
        client_order_id: None,
    });
    assert!(matches!(
        err,
        Err(EngineError::LeverageCap {
            requested: 50,
            cap: 10
        })
    ));
}

#[test]
fn tick_violation_uses_catalog_tick_size() {
    // A coarser tick than the shared fixture proves the check reads the
    // catalog, not a book-local constant.
    let clock = Arc::new(ClockService::manual(T0));
    let journal: Arc<dyn Journal> = Arc::new(MemoryJournal::new());
    let mut coarse = product("XAU-MNT", "XAUUSD");
    coarse.tick_size = 100;
    let exchange = Exchange::new(ExchangeConfig::default(), vec![coarse], journal, clock);
    exchange.deposit(1, 10_000_000).unwrap();
    exchange.on_quote_tick(QuoteTick {
        external_symbol: "XAUUSD".to_string(),
        bid: Some(10_000),
        ask: Some(10_000),
        ts_ms: T0,
    });

    let err = exchange.submit(SubmitRequest {
        user_id: 1,
        symbol: "XAU-MNT".to_string(),
        side: Side::Buy,
        kind: OrderKind::Limit,
        quantity: contracts(1),
        limit_price: Some(10_050),
        leverage: None,
        client_order_id: None,
    });
    assert!(matches!(
        err,
        Err(EngineError::TickViolation {
            price: 10_050,
            tick_size: 100
        })
    ));
}

#[test]
fn margin_boundary_accept_and_reject() {
    let f = Fixture::new();
    f.set_mark("XAUUSD", 10_000);
    f.fund(1, 1_000);
    f.fund(2, 10_000_000);

    // Exactly 1_000 margin at 10x: accepted; available margin is 0 after.
    f.limit(1, "XAU-MNT", Side::Buy, contracts(1), 10_000).unwrap();
    let account = f.exchange.get_account(1).unwrap();
    assert!(account.available_margin >= 0);

    // One tick more cannot fit.
    let err = f
        .limit(1, "XAU-MNT", Side::Buy, contracts(1), 10_010)
        .unwrap_err();
    assert!(matches!(err, EngineError::MarginInsufficient { .. }));
}

#[test]
fn cancel_is_idempotent_at_the_observable_level() {
    let f = Fixture::new();
    f.set_mark("XAUUSD", 10_000);
    f.fund(1, 10_000_000);

    let order_id = f.limit(1, "XAU-MNT", Side::Buy, contracts(1), 9_000).unwrap();
    f.exchange.cancel(1, "XAU-MNT", order_id).unwrap();

    let before = f.exchange.get_depth("XAU-MNT", 10).unwrap();
    assert!(matches!(
        f.exchange.cancel(1, "XAU-MNT", order_id),
        Err(EngineError::NotFound(_))
    ));
    assert_eq!(f.exchange.get_depth("XAU-MNT", 10).unwrap().bids, before.bids);
}

#[test]
fn foreign_orders_are_invisible_to_cancel_and_modify() {
    let f = Fixture::new();
    f.set_mark("XAUUSD", 10_000);
    f.fund(1, 10_000_000);
    f.fund(2, 10_000_000);

    let order_id = f.limit(1, "XAU-MNT", Side::Buy, contracts(1), 9_000).unwrap();
    assert!(matches!(
        f.exchange.cancel(2, "XAU-MNT", order_id),
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        f.exchange.modify(2, "XAU-MNT", order_id, Some(9_100), None),
        Err(EngineError::NotFound(_))
    ));
    // Still resting for its owner.
    assert_eq!(f.exchange.get_orders_open(1).len(), 1);
}

#[test]
fn event_order_within_a_submission() {
    let f = Fixture::new();
    f.set_mark("XAUUSD", 100);
    f.fund(1, 10_000_000);
    f.fund(2, 10_000_000);

    f.limit(1, "XAU-MNT", Side::Sell, contracts(1), 100).unwrap();

    let subscriber = f.exchange.subscribe(SubscriptionFilter::all());
    drain(&subscriber);

    f.market(2, "XAU-MNT", Side::Buy, contracts(1)).unwrap();

    let channels: Vec<Channel> = drain(&subscriber)
        .iter()
        .map(|e| e.event.channel())
        .collect();
    // order-accepted, trade, position (maker then taker), depth, then
    // terminal statuses.
    assert_eq!(channels[0], Channel::OrderStatus);
    assert_eq!(channels[1], Channel::Trade);
    assert_eq!(channels[2], Channel::Position);
    assert_eq!(channels[3], Channel::Position);
    assert_eq!(channels[4], Channel::Depth);
    assert!(channels[5..].iter().all(|c| *c == Channel::OrderStatus));
}

#[test]
fn liquidation_flattens_through_the_book() {
    let f = Fixture::new();
    f.set_mark("XAUUSD", 10_000);
    f.fund(1, 1_000);
    f.fund(2, 100_000_000);

    // User 1 opens max-size long at 10x.
    f.limit(2, "XAU-MNT", Side::Sell, contracts(1), 10_000).unwrap();
    f.market(1, "XAU-MNT", Side::Buy, contracts(1)).unwrap();

    // User 2 provides the bid the liquidation will hit.
    f.limit(2, "XAU-MNT", Side::Buy, contracts(1), 9_000).unwrap();

    let subscriber = f.exchange.subscribe(SubscriptionFilter::all());
    drain(&subscriber);

    // Mark crashes below the liquidation price (9_050).
    f.set_mark("XAUUSD", 9_000);

    let position = f.exchange.get_position(1, "XAU-MNT").unwrap();
    assert_eq!(position.size, 0);
    let account = f.exchange.get_account(1).unwrap();
    // Realized loss settled: 1_000 − 1_000 = 0.
    assert_eq!(account.balance, 0);
    assert!(!account.socialized_loss_pending);

    let events = drain(&subscriber);
    assert!(
        events
            .iter()
            .any(|e| matches!(&e.event, StreamEvent::Trade { trade } if trade.price == 9_000))
    );
    f.exchange.check_invariants().unwrap();
}

#[test]
fn failed_liquidation_raises_socialized_loss_alert() {
    let f = Fixture::new();
    f.set_mark("XAUUSD", 10_000);
    f.fund(1, 1_000);
    f.fund(2, 100_000_000);

    f.limit(2, "XAU-MNT", Side::Sell, contracts(1), 10_000).unwrap();
    f.market(1, "XAU-MNT", Side::Buy, contracts(1)).unwrap();

    let subscriber = f.exchange.subscribe(SubscriptionFilter {
        channels: ChannelMask::OPERATOR_ALERT,
        symbol: None,
        user_id: None,
    });

    // No bids anywhere: the liquidation market sell finds no liquidity.
    f.set_mark("XAUUSD", 9_000);

    let alerts = drain(&subscriber);
    assert_eq!(alerts.len(), 1);
    match &alerts[0].event {
        StreamEvent::OperatorAlert { code, .. } => {
            assert_eq!(code, "socialized-loss-pending");
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(f.exchange.get_account(1).unwrap().socialized_loss_pending);
}

#[test]
fn journal_full_rejects_before_any_mutation() {
    let clock = Arc::new(ClockService::manual(T0));
    let ring = Arc::new(RingJournal::new(3));
    let exchange = Exchange::new(
        ExchangeConfig::default(),
        vec![product("XAU-MNT", "XAUUSD")],
        Arc::clone(&ring) as Arc<dyn Journal>,
        Arc::clone(&clock),
    );
    exchange.deposit(1, 10_000_000).unwrap(); // seq 1
    exchange.on_quote_tick(QuoteTick {
        external_symbol: "XAUUSD".to_string(),
        bid: Some(10_000),
        ask: Some(10_000),
        ts_ms: T0,
    }); // seq 2 (mark update)

    let first = exchange.submit(SubmitRequest {
        user_id: 1,
        symbol: "XAU-MNT".to_string(),
        side: Side::Buy,
        kind: OrderKind::Limit,
        quantity: contracts(1),
        limit_price: Some(9_000),
        leverage: None,
        client_order_id: None,
    });
    assert!(first.is_ok()); // seq 3 fills the ring

    let second = exchange.submit(SubmitRequest {
        user_id: 1,
        symbol: "XAU-MNT".to_string(),
        side: Side::Buy,
        kind: OrderKind::Limit,
        quantity: contracts(1),
        limit_price: Some(9_100),
        leverage: None,
        client_order_id: None,
    });
    assert!(matches!(second, Err(EngineError::JournalFull)));
    assert!(second.unwrap_err().is_retryable());
    // The rejected order never reached the book.
    assert_eq!(exchange.get_orders_open(1).len(), 1);

    // Draining the ring lets submissions through again.
    ring.drain(10);
    let third = exchange.submit(SubmitRequest {
        user_id: 1,
        symbol: "XAU-MNT".to_string(),
        side: Side::Buy,
        kind: OrderKind::Limit,
        quantity: contracts(1),
        limit_price: Some(9_100),
        leverage: None,
        client_order_id: None,
    });
    assert!(third.is_ok());
}

#[test]
fn deposit_and_queries() {
    let f = Fixture::new();
    f.set_mark("XAUUSD", 10_000);
    let balance = f.exchange.deposit(1, 5_000).unwrap();
    assert_eq!(balance, 5_000);
    let balance = f.exchange.deposit(1, 2_500).unwrap();
    assert_eq!(balance, 7_500);

    assert_eq!(f.exchange.get_bbo("XAU-MNT").unwrap(), (None, None));
    assert!(matches!(
        f.exchange.get_bbo("DOGE-MNT"),
        Err(EngineError::SymbolUnknown(_))
    ));
    let mark = f.exchange.get_mark("XAU-MNT").unwrap().unwrap();
    assert_eq!(mark.price, 10_000);
    assert_eq!(mark.source, MarkSource::Oracle);

    f.fund(2, 10_000_000);
    f.limit(2, "XAU-MNT", Side::Buy, contracts(1), 9_900).unwrap();
    f.limit(2, "BTC-MNT", Side::Buy, contracts(1), 9_800).unwrap();
    let open = f.exchange.get_orders_open(2);
    assert_eq!(open.len(), 2);
    assert_eq!(open[0].0, "BTC-MNT");
    assert_eq!(open[1].0, "XAU-MNT");
}

#[test]
fn cancel_all_empties_a_symbol() {
    let f = Fixture::new();
    f.set_mark("XAUUSD", 10_000);
    f.fund(1, 10_000_000);
    f.limit(1, "XAU-MNT", Side::Buy, contracts(1), 9_000).unwrap();
    f.limit(1, "XAU-MNT", Side::Buy, contracts(1), 9_100).unwrap();

    assert_eq!(f.exchange.cancel_all(1, "XAU-MNT").unwrap(), 2);
    assert!(f.exchange.get_orders_open(1).is_empty());
}

#[test]
fn trade_sums_equal_net_positions() {
    let f = Fixture::new();
    f.set_mark("XAUUSD", 100);
    f.fund(1, 10_000_000);
    f.fund(2, 10_000_000);
    f.fund(3, 10_000_000);

    let subscriber = f.exchange.subscribe(SubscriptionFilter {
        channels: ChannelMask::TRADE,
        symbol: None,
        user_id: None,
    });

    f.limit(1, "XAU-MNT", Side::Sell, contracts(5), 100).unwrap();
    f.market(2, "XAU-MNT", Side::Buy, contracts(2)).unwrap();
    f.limit(3, "XAU-MNT", Side::Buy, contracts(4), 100).unwrap();
    f.market(2, "XAU-MNT", Side::Sell, contracts(1)).unwrap();

    let mut sums: std::collections::BTreeMap<UserId, i64> = std::collections::BTreeMap::new();
    for envelope in drain(&subscriber) {
        let StreamEvent::Trade { trade } = envelope.event else {
            panic!("unexpected event");
        };
        let qty = trade.quantity as i64;
        *sums.entry(trade.taker_user_id).or_default() += qty * trade.taker_side.sign();
        *sums.entry(trade.maker_user_id).or_default() += qty * trade.taker_side.opposite().sign();
    }
    for (user, sum) in sums {
        let position = f.exchange.get_position(user, "XAU-MNT").unwrap();
        assert_eq!(position.size, sum, "user {user}");
    }
}
