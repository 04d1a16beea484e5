//! Randomized reachable-state invariants over the order book.

use proptest::prelude::*;
use std::sync::Arc;

use perpx_rs::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Limit { user: u8, buy: bool, qty: u16, price: u8 },
    Market { user: u8, buy: bool, qty: u16 },
    Ioc { user: u8, buy: bool, qty: u16, price: u8 },
    PostOnly { user: u8, buy: bool, qty: u16, price: u8 },
    Cancel { index: u8 },
    Reduce { index: u8, qty: u16 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<u8>(), any::<bool>(), 1..500u16, 1..40u8)
            .prop_map(|(user, buy, qty, price)| Op::Limit { user, buy, qty, price }),
        (any::<u8>(), any::<bool>(), 1..500u16)
            .prop_map(|(user, buy, qty)| Op::Market { user, buy, qty }),
        (any::<u8>(), any::<bool>(), 1..500u16, 1..40u8)
            .prop_map(|(user, buy, qty, price)| Op::Ioc { user, buy, qty, price }),
        (any::<u8>(), any::<bool>(), 1..500u16, 1..40u8)
            .prop_map(|(user, buy, qty, price)| Op::PostOnly { user, buy, qty, price }),
        (any::<u8>(),).prop_map(|(index,)| Op::Cancel { index }),
        (any::<u8>(), 1..500u16).prop_map(|(index, qty)| Op::Reduce { index, qty }),
    ]
}

fn side(buy: bool) -> Side {
    if buy { Side::Buy } else { Side::Sell }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// After every operation: no crossed book at rest, locator
    /// consistency, no zero-remaining orders; post-only never trades at
    /// submission; market orders never rest.
    #[test]
    fn book_invariants_hold_for_random_order_flow(ops in proptest::collection::vec(op_strategy(), 1..120)) {
        let clock = Arc::new(ClockService::manual(1_000));
        let book = OrderBook::new("XAU-MNT", true, Arc::clone(&clock));
        let mut next_id: OrderId = 1;
        let mut submitted: Vec<OrderId> = Vec::new();

        for op in ops {
            match op {
                Op::Limit { user, buy, qty, price } => {
                    let id = next_id;
                    next_id += 1;
                    submitted.push(id);
                    let _ = book.add_order(Order {
                        id,
                        user_id: user as UserId,
                        side: side(buy),
                        kind: OrderKind::Limit,
                        quantity: qty as Qty,
                        limit_price: Some(price as Price * 100),
                        timestamp_ms: clock.now_ms(),
                    });
                }
                Op::Market { user, buy, qty } => {
                    let id = next_id;
                    next_id += 1;
                    if let Ok(result) = book.add_order(Order {
                        id,
                        user_id: user as UserId,
                        side: side(buy),
                        kind: OrderKind::Market,
                        quantity: qty as Qty,
                        limit_price: None,
                        timestamp_ms: clock.now_ms(),
                    }) {
                        prop_assert!(!result.rested, "market order rested");
                    }
                }
                Op::Ioc { user, buy, qty, price } => {
                    let id = next_id;
                    next_id += 1;
                    if let Ok(result) = book.add_order(Order {
                        id,
                        user_id: user as UserId,
                        side: side(buy),
                        kind: OrderKind::Ioc,
                        quantity: qty as Qty,
                        limit_price: Some(price as Price * 100),
                        timestamp_ms: clock.now_ms(),
                    }) {
                        prop_assert!(!result.rested, "IOC remainder rested");
                    }
                }
                Op::PostOnly { user, buy, qty, price } => {
                    let id = next_id;
                    next_id += 1;
                    submitted.push(id);
                    if let Ok(result) = book.add_order(Order {
                        id,
                        user_id: user as UserId,
                        side: side(buy),
                        kind: OrderKind::PostOnly,
                        quantity: qty as Qty,
                        limit_price: Some(price as Price * 100),
                        timestamp_ms: clock.now_ms(),
                    }) {
                        prop_assert!(result.trades.is_empty(), "post-only traded at submission");
                    }
                }
                Op::Cancel { index } => {
                    if let Some(id) = submitted.get(index as usize % submitted.len().max(1)) {
                        let _ = book.cancel_order(*id);
                    }
                }
                Op::Reduce { index, qty } => {
                    if let Some(id) = submitted.get(index as usize % submitted.len().max(1)) {
                        let _ = book.modify_order(*id, None, Some(qty as Qty));
                    }
                }
            }

            if let Err(violation) = book.check_invariants() {
                prop_assert!(false, "invariant violated: {violation}");
            }
            if let (Some(bid), Some(ask)) = book.bbo() {
                prop_assert!(bid < ask, "crossed book at rest: {bid} >= {ask}");
            }
        }
    }

    /// Self-trade law: no trade ever pairs a user with themselves.
    #[test]
    fn no_self_trades_under_stp(ops in proptest::collection::vec(op_strategy(), 1..80)) {
        let clock = Arc::new(ClockService::manual(1_000));
        let book = OrderBook::new("XAU-MNT", true, Arc::clone(&clock));
        let mut next_id: OrderId = 1;

        for op in ops {
            let (user, buy, qty, price, kind) = match op {
                Op::Limit { user, buy, qty, price } => {
                    (user, buy, qty, Some(price as Price * 100), OrderKind::Limit)
                }
                Op::Market { user, buy, qty } => (user, buy, qty, None, OrderKind::Market),
                Op::Ioc { user, buy, qty, price } => {
                    (user, buy, qty, Some(price as Price * 100), OrderKind::Ioc)
                }
                _ => continue,
            };
            // Two users only, to force frequent self-trade situations.
            let user = (user % 2) as UserId;
            let id = next_id;
            next_id += 1;
            if let Ok(result) = book.add_order(Order {
                id,
                user_id: user,
                side: side(buy),
                kind,
                quantity: qty as Qty,
                limit_price: price,
                timestamp_ms: clock.now_ms(),
            }) {
                for trade in &result.trades {
                    prop_assert_ne!(trade.maker_user_id, trade.taker_user_id);
                }
            }
        }
    }
}
