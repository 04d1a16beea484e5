//! Order book operations: add, cancel, and modify.

use std::sync::Arc;

use tracing::trace;

use super::book::OrderBook;
use super::error::OrderBookError;
use super::level::{PriceLevel, RestingOrder};
use super::trade::MatchResult;
use crate::types::{OrderId, OrderKind, OrderStatus, Price, Qty, Side, TimestampMs, UserId};

/// An order as accepted by the matching engine, ready for the book.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Order {
    /// Engine-assigned monotonic identifier.
    pub id: OrderId,
    /// Owner.
    pub user_id: UserId,
    /// Buy or sell.
    pub side: Side,
    /// Execution policy.
    pub kind: OrderKind,
    /// Submitted quantity, fixed-point units.
    pub quantity: Qty,
    /// Limit price; `None` only for market orders.
    pub limit_price: Option<Price>,
    /// Engine-stamped submission time.
    pub timestamp_ms: TimestampMs,
}

/// Outcome of a modify.
#[derive(Debug, Clone)]
pub enum ModifyResult {
    /// Remaining quantity was strictly decreased in place; queue priority
    /// preserved.
    Reduced {
        /// The order after the decrease.
        order: super::book::OpenOrder,
    },
    /// The order was cancelled and re-added at the queue tail (price
    /// change or quantity increase loses time priority). The re-add may
    /// have matched.
    Replaced(MatchResult),
}

impl OrderBook {
    /// Insert or match a new order per its [`OrderKind`] semantics.
    ///
    /// - *Limit*: matches the crossing portion, rests the remainder.
    /// - *Market*: sweeps at maker prices; a fully unfilled market order
    ///   is an error, a partially filled one has its remainder cancelled.
    /// - *IOC*: limit crossing behavior, remainder cancelled.
    /// - *Post-only*: rejected outright if any portion would cross.
    ///
    /// # Errors
    /// - [`OrderBookError::WouldCross`] for a crossing post-only order.
    /// - [`OrderBookError::InsufficientLiquidity`] for a market order with
    ///   no opposing liquidity.
    /// - [`OrderBookError::InvalidOperation`] for malformed price/kind
    ///   combinations.
    pub fn add_order(&self, order: Order) -> Result<MatchResult, OrderBookError> {
        match (order.kind, order.limit_price) {
            (OrderKind::Market, Some(_)) => {
                return Err(OrderBookError::InvalidOperation {
                    message: "market order carries a limit price".to_string(),
                });
            }
            (OrderKind::Market, None) => {}
            (_, None) => {
                return Err(OrderBookError::InvalidOperation {
                    message: format!("{} order requires a limit price", order.kind),
                });
            }
            _ => {}
        }
        if order.quantity == 0 {
            return Err(OrderBookError::InvalidOperation {
                message: "zero quantity".to_string(),
            });
        }

        trace!(
            "book {}: add order {} {} {} qty {} px {:?}",
            self.symbol, order.id, order.kind, order.side, order.quantity, order.limit_price
        );

        if order.kind == OrderKind::PostOnly {
            let price = order.limit_price.unwrap_or(0);
            if self.would_cross(price, order.side) {
                let opposite_price = match order.side {
                    Side::Buy => self.best_ask().unwrap_or(0),
                    Side::Sell => self.best_bid().unwrap_or(0),
                };
                return Err(OrderBookError::WouldCross {
                    price,
                    side: order.side,
                    opposite_price,
                });
            }
            self.rest_order(&order, order.quantity, true);
            return Ok(MatchResult {
                order_id: order.id,
                side: order.side,
                original_quantity: order.quantity,
                remaining_quantity: order.quantity,
                rested: true,
                status: OrderStatus::Open,
                trades: Vec::new(),
                filled_maker_ids: Vec::new(),
                stp_cancelled: Vec::new(),
            });
        }

        let mut remaining = order.quantity;
        let walk = self.match_incoming(
            order.id,
            order.user_id,
            order.side,
            &mut remaining,
            order.limit_price,
        );

        if order.kind == OrderKind::Market && walk.trades.is_empty() {
            // Self-trade cancellations still took effect; the market order
            // itself found nothing to execute against.
            if walk.stp_cancelled.is_empty() {
                return Err(OrderBookError::InsufficientLiquidity {
                    side: order.side,
                    requested: order.quantity,
                    available: 0,
                });
            }
            return Ok(MatchResult {
                order_id: order.id,
                side: order.side,
                original_quantity: order.quantity,
                remaining_quantity: remaining,
                rested: false,
                status: OrderStatus::Rejected,
                trades: Vec::new(),
                filled_maker_ids: Vec::new(),
                stp_cancelled: walk.stp_cancelled,
            });
        }

        let (rested, status) = match order.kind {
            OrderKind::Limit if remaining > 0 => {
                self.rest_order(&order, remaining, false);
                let status = if remaining == order.quantity {
                    OrderStatus::Open
                } else {
                    OrderStatus::PartiallyFilled
                };
                (true, status)
            }
            _ if remaining == 0 => (false, OrderStatus::Filled),
            // Market/IOC remainder: cancelled, never rested.
            _ => (false, OrderStatus::Cancelled),
        };

        Ok(MatchResult {
            order_id: order.id,
            side: order.side,
            original_quantity: order.quantity,
            remaining_quantity: remaining,
            rested,
            status,
            trades: walk.trades,
            filled_maker_ids: walk.filled_maker_ids,
            stp_cancelled: walk.stp_cancelled,
        })
    }

    /// Remove a resting order.
    ///
    /// Idempotent at the observable level: a second cancel of the same id
    /// returns [`OrderBookError::OrderNotFound`] and leaves state
    /// unchanged.
    ///
    /// # Errors
    /// [`OrderBookError::OrderNotFound`] if the id is unknown or terminal.
    pub fn cancel_order(&self, order_id: OrderId) -> Result<super::book::OpenOrder, OrderBookError> {
        let (price, side) = self
            .order_locations
            .remove(&order_id)
            .map(|(_, loc)| loc)
            .ok_or(OrderBookError::OrderNotFound(order_id))?;

        let level = self
            .level_at(price, side)
            .ok_or(OrderBookError::OrderNotFound(order_id))?;
        let removed = level
            .remove(order_id)
            .ok_or(OrderBookError::OrderNotFound(order_id))?;

        self.untrack_user_order(removed.user_id, order_id);
        self.remove_level_if_empty(price, side, &level);
        self.cache.invalidate();
        trace!("book {}: cancelled order {}", self.symbol, order_id);
        Ok(Self::open_order(&removed, price, side))
    }

    /// Cancel every resting order belonging to `user_id`, optionally
    /// returning them in cancellation order.
    pub fn cancel_all_for_user(&self, user_id: UserId) -> Vec<super::book::OpenOrder> {
        let ids: Vec<OrderId> = self
            .user_orders
            .get(&user_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        ids.into_iter()
            .filter_map(|id| self.cancel_order(id).ok())
            .collect()
    }

    /// Modify a resting order.
    ///
    /// A strict decrease of remaining quantity (no price change) is done
    /// in place and preserves queue priority. A price change or quantity
    /// increase is cancel+re-add: the order keeps its id but joins the
    /// back of the queue at the new price. A post-only resting order whose
    /// new price would cross is rejected with the original unchanged.
    ///
    /// # Errors
    /// [`OrderBookError::OrderNotFound`], [`OrderBookError::WouldCross`],
    /// or [`OrderBookError::InvalidModify`].
    pub fn modify_order(
        &self,
        order_id: OrderId,
        new_price: Option<Price>,
        new_qty: Option<Qty>,
    ) -> Result<ModifyResult, OrderBookError> {
        if new_price.is_none() && new_qty.is_none() {
            return Err(OrderBookError::InvalidModify {
                message: "neither price nor quantity given".to_string(),
            });
        }
        let (price, side) = *self
            .order_locations
            .get(&order_id)
            .ok_or(OrderBookError::OrderNotFound(order_id))?;
        let level = self
            .level_at(price, side)
            .ok_or(OrderBookError::OrderNotFound(order_id))?;
        let current = level
            .get(order_id)
            .ok_or(OrderBookError::OrderNotFound(order_id))?;

        if let Some(qty) = new_qty {
            if qty == 0 {
                return Err(OrderBookError::InvalidModify {
                    message: "zero quantity; use cancel".to_string(),
                });
            }
            if qty == current.remaining && new_price.is_none() {
                return Err(OrderBookError::InvalidModify {
                    message: "quantity unchanged".to_string(),
                });
            }
            // In-place decrease preserves time priority.
            if qty < current.remaining && new_price.is_none() {
                let reduced = level
                    .reduce_quantity(order_id, qty)
                    .ok_or(OrderBookError::OrderNotFound(order_id))?;
                self.cache.invalidate();
                trace!(
                    "book {}: reduced order {} to remaining {}",
                    self.symbol, order_id, qty
                );
                return Ok(ModifyResult::Reduced {
                    order: Self::open_order(&reduced, price, side),
                });
            }
        }

        let target_price = new_price.unwrap_or(price);
        if current.post_only && self.would_cross(target_price, side) {
            let opposite_price = match side {
                Side::Buy => self.best_ask().unwrap_or(0),
                Side::Sell => self.best_bid().unwrap_or(0),
            };
            return Err(OrderBookError::WouldCross {
                price: target_price,
                side,
                opposite_price,
            });
        }

        // Price change or quantity increase: lose time priority.
        let cancelled = self.cancel_order(order_id)?;
        let replacement = Order {
            id: order_id,
            user_id: cancelled.user_id,
            side,
            kind: if current.post_only {
                OrderKind::PostOnly
            } else {
                OrderKind::Limit
            },
            quantity: new_qty.unwrap_or(cancelled.remaining),
            limit_price: Some(target_price),
            timestamp_ms: self.clock.now_ms(),
        };
        let result = self.add_order(replacement)?;
        Ok(ModifyResult::Replaced(result))
    }

    pub(super) fn rest_order(&self, order: &Order, remaining: Qty, post_only: bool) {
        let price = order.limit_price.unwrap_or(0);
        let side_levels = match order.side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        let level = side_levels
            .get_or_insert(price, Arc::new(PriceLevel::new(price)))
            .value()
            .clone();
        level.push_back(RestingOrder {
            id: order.id,
            user_id: order.user_id,
            quantity: order.quantity,
            remaining,
            timestamp_ms: order.timestamp_ms,
            post_only,
        });
        self.order_locations.insert(order.id, (price, order.side));
        self.track_user_order(order.user_id, order.id);
        self.cache.invalidate();
    }

    fn remove_level_if_empty(&self, price: Price, side: Side, level: &Arc<PriceLevel>) {
        if level.order_count() == 0 {
            let side_levels = match side {
                Side::Buy => &self.bids,
                Side::Sell => &self.asks,
            };
            side_levels.remove(&price);
        }
    }
}
