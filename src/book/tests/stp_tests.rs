//! Self-trade prevention: maker-cancel semantics.

use super::test_helpers::*;
use crate::types::{OrderStatus, Side};

#[test]
fn same_user_maker_is_cancelled_not_matched() {
    let book = book("XAU-MNT");
    book.add_order(limit(1, 7, Side::Buy, 1, 100)).unwrap();

    // Same user sells market into their own resting buy: the maker is
    // cancelled and the market order, now facing an empty side, ends
    // rejected with no trade recorded.
    let result = book.add_order(market(2, 7, Side::Sell, 1)).unwrap();
    assert_eq!(result.status, OrderStatus::Rejected);
    assert!(result.trades.is_empty());
    assert_eq!(result.stp_cancelled.len(), 1);
    assert_eq!(result.stp_cancelled[0].order_id, 1);
    assert_eq!(book.resting_order_count(), 0);
    book.check_invariants().unwrap();
}

#[test]
fn maker_cancel_notification_emitted_once() {
    let book = book("XAU-MNT");
    book.add_order(limit(1, 7, Side::Buy, 1, 100)).unwrap();
    book.add_order(limit(2, 8, Side::Buy, 1, 100)).unwrap();

    let result = book.add_order(market(3, 7, Side::Sell, 1)).unwrap();
    assert_eq!(result.stp_cancelled.len(), 1);
    assert_eq!(result.stp_cancelled[0].order_id, 1);
    assert_eq!(result.stp_cancelled[0].user_id, 7);
    // Taker continued to the next maker.
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].maker_order_id, 2);
    book.check_invariants().unwrap();
}

#[test]
fn no_trade_ever_has_same_maker_and_taker_user() {
    let book = book("XAU-MNT");
    book.add_order(limit(1, 7, Side::Sell, 5, 100)).unwrap();
    book.add_order(limit(2, 8, Side::Sell, 5, 100)).unwrap();
    book.add_order(limit(3, 7, Side::Sell, 5, 101)).unwrap();

    let result = book.add_order(limit(4, 7, Side::Buy, 15, 101)).unwrap();
    for trade in &result.trades {
        assert_ne!(trade.maker_user_id, trade.taker_user_id);
    }
    // Both same-user makers were cancelled, one fill against user 8.
    assert_eq!(result.stp_cancelled.len(), 2);
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].maker_user_id, 8);
    book.check_invariants().unwrap();
}

#[test]
fn stp_disabled_allows_self_match() {
    let book = book_no_stp("XAU-MNT");
    book.add_order(limit(1, 7, Side::Buy, 1, 100)).unwrap();

    let result = book.add_order(market(2, 7, Side::Sell, 1)).unwrap();
    assert_eq!(result.status, OrderStatus::Filled);
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].maker_user_id, 7);
    assert_eq!(result.trades[0].taker_user_id, 7);
}

#[test]
fn stp_cancel_with_partial_fill_keeps_trades() {
    let book = book("XAU-MNT");
    book.add_order(limit(1, 8, Side::Buy, 2, 100)).unwrap();
    book.add_order(limit(2, 7, Side::Buy, 3, 100)).unwrap();

    // User 7 sells 4: fills 2 against user 8, own maker cancelled, and
    // the market remainder of 2 is cancelled unfilled.
    let result = book.add_order(market(3, 7, Side::Sell, 4)).unwrap();
    assert_eq!(result.executed_quantity(), 2);
    assert_eq!(result.stp_cancelled.len(), 1);
    assert_eq!(result.status, OrderStatus::Cancelled);
    assert_eq!(book.resting_order_count(), 0);
    book.check_invariants().unwrap();
}
