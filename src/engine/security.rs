// ============================================================================
// Security
// Per-instrument request routing, matching state and stop-order activation
// ============================================================================

use super::auction::{find_opening_price, OpeningPrice};
use super::controls::ControlChain;
use super::matcher::{AuctionResult, MatchResult, MatchingOutcome, Matcher};
use crate::domain::{
    Increments, Isin, Ledgers, MatchingState, Order, OrderBook, OrderId, OrderKind, OrderUpdate,
    RejectReason, SecurityConfig, Side, Trade,
};
use crate::interfaces::{EnterOrderRq, EntryKind};
use crate::numeric::{Price, Quantity};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A stop order that went live while a request was handled
#[derive(Debug, Clone)]
pub struct Activation {
    pub order_id: OrderId,
    /// Request that entered or last updated the stop order
    pub request_id: u64,
    pub result: MatchResult,
}

/// Effects of an accepted enter or update request
#[derive(Debug, Clone)]
pub struct EnterOutcome {
    pub result: MatchResult,
    /// Stop orders activated by the request's trades, in activation order
    pub activations: Vec<Activation>,
}

/// Effects of a matching state change
#[derive(Debug, Clone)]
pub struct StateChange {
    pub previous: MatchingState,
    pub current: MatchingState,
    /// Call run when leaving an auction
    pub auction: Option<AuctionResult>,
    pub activations: Vec<Activation>,
}

/// One tradable instrument: its book, its matching state and its last trade price.
///
/// All mutations go through `&mut self`; the caller provides exclusivity and
/// the ledgers.
pub struct Security {
    isin: Isin,
    tick_size: Price,
    lot_size: Quantity,
    state: MatchingState,
    last_trade_price: Option<Price>,
    book: OrderBook,
    matcher: Matcher,
}

impl Security {
    pub fn new(config: &SecurityConfig, controls: Arc<ControlChain>) -> Self {
        Self {
            isin: Isin::new(&config.isin),
            tick_size: config.tick_size,
            lot_size: config.lot_size,
            state: config.initial_state,
            last_trade_price: config.last_trade_price,
            book: OrderBook::new(),
            matcher: Matcher::new(controls),
        }
    }

    // ========================================================================
    // Getters
    // ========================================================================

    pub fn isin(&self) -> &Isin {
        &self.isin
    }

    pub fn tick_size(&self) -> Price {
        self.tick_size
    }

    pub fn lot_size(&self) -> Quantity {
        self.lot_size
    }

    pub fn increments(&self) -> Increments {
        Increments {
            tick_size: self.tick_size,
            lot_size: self.lot_size,
        }
    }

    pub fn state(&self) -> MatchingState {
        self.state
    }

    pub fn last_trade_price(&self) -> Option<Price> {
        self.last_trade_price
    }

    pub fn order_book(&self) -> &OrderBook {
        &self.book
    }

    /// Active or dormant order
    pub fn find_order(&self, side: Side, id: OrderId) -> Option<&Order> {
        self.book
            .find_by_order_id(side, id)
            .or_else(|| self.book.find_stop_order(side, id))
    }

    /// Price the next auction call would open at
    pub fn opening_price(&self) -> Option<OpeningPrice> {
        find_opening_price(&self.book, self.last_trade_price, self.tick_size)
    }

    // ========================================================================
    // New Orders
    // ========================================================================

    pub fn add_order(
        &mut self,
        rq: &EnterOrderRq,
        ledgers: &mut Ledgers,
    ) -> Result<EnterOutcome, RejectReason> {
        if self.book.contains(rq.side, rq.order_id()) {
            return Err(RejectReason::DuplicateOrderId);
        }
        let order = self.build_order(rq);

        let result = match self.state {
            MatchingState::Auction => {
                if order.is_stop_limit() {
                    return Err(RejectReason::StopOrderInAuction);
                }
                if order.minimum_execution_quantity > 0 {
                    return Err(RejectReason::MinimumExecutionQuantityInAuction);
                }
                self.matcher
                    .enqueue_for_auction(order, &mut self.book, ledgers)
            },
            MatchingState::Continuous if order.is_stop_limit() => {
                self.matcher.enqueue_stop(order, &mut self.book, ledgers)
            },
            MatchingState::Continuous => {
                self.matcher
                    .execute(order, EntryKind::NewOrder, &mut self.book, ledgers)
            },
        };
        let result = Self::accepted(result)?;

        self.record_trades(&result.trades);
        let activations = self.activate_stop_orders(ledgers);
        Ok(EnterOutcome {
            result,
            activations,
        })
    }

    fn build_order(&self, rq: &EnterOrderRq) -> Order {
        let (id, isin) = (rq.order_id(), self.isin.clone());
        let (broker_id, shareholder_id) = (rq.broker_id(), rq.shareholder_id());
        let mut order = if rq.stop_price > 0 {
            Order::new_stop_limit(
                id,
                isin,
                rq.side,
                rq.quantity,
                rq.price,
                broker_id,
                shareholder_id,
                rq.entry_time,
                rq.stop_price,
            )
        } else if rq.peak_size > 0 {
            Order::new_iceberg(
                id,
                isin,
                rq.side,
                rq.quantity,
                rq.price,
                broker_id,
                shareholder_id,
                rq.entry_time,
                rq.peak_size,
            )
        } else {
            Order::new(
                id,
                isin,
                rq.side,
                rq.quantity,
                rq.price,
                broker_id,
                shareholder_id,
                rq.entry_time,
            )
        }
        .with_minimum_execution_quantity(rq.minimum_execution_quantity)
        .with_request_id(rq.request_id);
        order.expiry = rq.expiry;
        order
    }

    // ========================================================================
    // Updates
    // ========================================================================

    pub fn update_order(
        &mut self,
        rq: &EnterOrderRq,
        ledgers: &mut Ledgers,
    ) -> Result<EnterOutcome, RejectReason> {
        let (side, id) = (rq.side, rq.order_id());
        let update = rq.order_update();

        if let Some(dormant) = self.book.find_stop_order(side, id) {
            Self::check_update(dormant, rq)?;
            return self.update_stop_order(rq, &update, ledgers);
        }

        let order = self
            .book
            .find_by_order_id(side, id)
            .ok_or(RejectReason::OrderIdNotFound)?;
        Self::check_update(order, rq)?;

        if order.will_lose_priority(&update) {
            self.replace_order(rq, &update, ledgers)
        } else {
            self.update_in_place(rq, &update, ledgers)
        }
    }

    fn check_update(order: &Order, rq: &EnterOrderRq) -> Result<(), RejectReason> {
        // owners are fixed for the life of an order
        if order.broker_id != rq.broker_id() || order.shareholder_id != rq.shareholder_id() {
            return Err(RejectReason::InvalidOrderId);
        }
        match order.kind() {
            OrderKind::Iceberg { .. } if rq.peak_size == 0 => Err(RejectReason::InvalidPeakSize),
            OrderKind::Plain | OrderKind::StopLimit { .. } if rq.peak_size > 0 => {
                Err(RejectReason::PeakSizeForNonIceberg)
            },
            OrderKind::StopLimit { .. } if rq.stop_price == 0 => {
                Err(RejectReason::InvalidStopPrice)
            },
            OrderKind::Plain | OrderKind::Iceberg { .. } if rq.stop_price > 0 => {
                Err(RejectReason::StopPriceForActiveOrder)
            },
            _ if rq.minimum_execution_quantity != order.minimum_execution_quantity => {
                Err(RejectReason::CannotChangeMinimumExecutionQuantity)
            },
            _ => Ok(()),
        }
    }

    /// Smaller quantity, same price, same or smaller peak: keeps the queue position
    fn update_in_place(
        &mut self,
        rq: &EnterOrderRq,
        update: &OrderUpdate,
        ledgers: &mut Ledgers,
    ) -> Result<EnterOutcome, RejectReason> {
        let order = self
            .book
            .find_by_order_id_mut(rq.side, rq.order_id())
            .ok_or(RejectReason::OrderIdNotFound)?;

        self.matcher.withdraw(order, ledgers);
        order.begin_update();
        order.apply_update(update);
        order.request_id = rq.request_id;
        order.finish_update();
        self.matcher.hold(order, ledgers);

        tracing::debug!("Order {} updated in place", order.id);
        Ok(EnterOutcome {
            result: MatchResult {
                outcome: MatchingOutcome::Executed,
                remainder: Some(order.clone()),
                trades: Vec::new(),
            },
            activations: Vec::new(),
        })
    }

    /// Remove, rematch and requeue; the original comes back untouched on failure
    fn replace_order(
        &mut self,
        rq: &EnterOrderRq,
        update: &OrderUpdate,
        ledgers: &mut Ledgers,
    ) -> Result<EnterOutcome, RejectReason> {
        let (index, original) = self
            .book
            .remove_by_order_id(rq.side, rq.order_id())
            .ok_or(RejectReason::OrderIdNotFound)?;
        self.matcher.withdraw(&original, ledgers);

        let mut order = original.clone();
        order.mark_new();
        order.apply_update(update);
        order.record_entry_time(update.entry_time);
        order.request_id = rq.request_id;

        let result = match self.state {
            MatchingState::Continuous => {
                self.matcher
                    .execute(order, EntryKind::Update, &mut self.book, ledgers)
            },
            MatchingState::Auction => {
                self.matcher
                    .enqueue_for_auction(order, &mut self.book, ledgers)
            },
        };
        if let Some(reason) = result.outcome.reject_reason() {
            tracing::debug!("Update of order {} failed, reinstating it", original.id);
            self.matcher
                .reinstate(index, original, &mut self.book, ledgers);
            return Err(reason);
        }

        self.record_trades(&result.trades);
        let activations = self.activate_stop_orders(ledgers);
        Ok(EnterOutcome {
            result,
            activations,
        })
    }

    fn update_stop_order(
        &mut self,
        rq: &EnterOrderRq,
        update: &OrderUpdate,
        ledgers: &mut Ledgers,
    ) -> Result<EnterOutcome, RejectReason> {
        let (index, original) = self
            .book
            .remove_stop_order(rq.side, rq.order_id())
            .ok_or(RejectReason::OrderIdNotFound)?;
        self.matcher.withdraw(&original, ledgers);

        let loses_priority = original.will_lose_priority(update)
            || original.stop_price() != Some(update.stop_price);
        let mut order = original.clone();
        order.apply_update(update);
        order.request_id = rq.request_id;

        let result = if loses_priority {
            order.record_entry_time(update.entry_time);
            self.matcher.enqueue_stop(order, &mut self.book, ledgers)
        } else {
            let remainder = Some(order.clone());
            self.matcher
                .reinstate_stop(index, order, &mut self.book, ledgers);
            MatchResult {
                outcome: MatchingOutcome::Queued,
                remainder,
                trades: Vec::new(),
            }
        };
        if let Some(reason) = result.outcome.reject_reason() {
            self.matcher
                .reinstate_stop(index, original, &mut self.book, ledgers);
            return Err(reason);
        }

        let activations = self.activate_stop_orders(ledgers);
        Ok(EnterOutcome {
            result,
            activations,
        })
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Remove an active or dormant order and release what it held
    pub fn delete_order(
        &mut self,
        side: Side,
        id: OrderId,
        ledgers: &mut Ledgers,
    ) -> Result<Order, RejectReason> {
        let (_, order) = self
            .book
            .remove_by_order_id(side, id)
            .or_else(|| self.book.remove_stop_order(side, id))
            .ok_or(RejectReason::OrderIdNotFound)?;
        self.matcher.withdraw(&order, ledgers);
        tracing::debug!("Order {} removed from {}", id, self.isin);
        Ok(order)
    }

    /// Delete the order if its expiry is at or before `now`
    pub fn expire(
        &mut self,
        side: Side,
        id: OrderId,
        now: DateTime<Utc>,
        ledgers: &mut Ledgers,
    ) -> Option<Order> {
        let due = self
            .find_order(side, id)
            .and_then(|order| order.expiry)
            .is_some_and(|expiry| expiry <= now);
        if !due {
            return None;
        }
        let order = self.delete_order(side, id, ledgers).ok()?;
        tracing::info!("Order {} on {} expired", id, self.isin);
        Some(order)
    }

    // ========================================================================
    // Matching State
    // ========================================================================

    /// Switch regime. Leaving an auction (to either state) runs the call first.
    pub fn change_matching_state(
        &mut self,
        target: MatchingState,
        ledgers: &mut Ledgers,
    ) -> StateChange {
        let previous = self.state;
        let auction = if previous == MatchingState::Auction {
            let result = self.matcher.call_auction(
                &mut self.book,
                ledgers,
                self.last_trade_price,
                self.tick_size,
            );
            if let Some(opening) = result.opening_price {
                tracing::info!(
                    "Auction on {} opened at {} with {} trades",
                    self.isin,
                    opening.price,
                    result.trades.len()
                );
            }
            self.record_trades(&result.trades);
            Some(result)
        } else {
            None
        };

        self.state = target;
        tracing::info!(
            "Security {} matching state {:?} -> {:?}",
            self.isin,
            previous,
            target
        );

        let activations = self.activate_stop_orders(ledgers);
        StateChange {
            previous,
            current: target,
            auction,
            activations,
        }
    }

    // ========================================================================
    // Stop-Order Activation
    // ========================================================================

    /// Activate triggered stop orders one at a time until none is triggered.
    ///
    /// Each activation may trade and move the last trade price, which can
    /// trigger the next one. Runs only in continuous matching.
    fn activate_stop_orders(&mut self, ledgers: &mut Ledgers) -> Vec<Activation> {
        let mut activations = Vec::new();
        if self.state != MatchingState::Continuous {
            return activations;
        }

        while let Some(mut order) = self.book.take_triggered_stop(self.last_trade_price) {
            self.matcher.withdraw(&order, ledgers);
            order.activate();
            tracing::info!(
                "Stop order {} on {} activated at last trade price {:?}",
                order.id,
                self.isin,
                self.last_trade_price
            );

            let (order_id, request_id) = (order.id, order.request_id);
            let result = self
                .matcher
                .execute(order, EntryKind::Activation, &mut self.book, ledgers);
            if let Some(reason) = result.outcome.reject_reason() {
                tracing::warn!("Activated order {} rejected: {}", order_id, reason);
            }
            self.record_trades(&result.trades);
            activations.push(Activation {
                order_id,
                request_id,
                result,
            });
        }
        activations
    }

    fn record_trades(&mut self, trades: &[Trade]) {
        if let Some(last) = trades.last() {
            self.last_trade_price = Some(last.price);
        }
    }

    fn accepted(result: MatchResult) -> Result<MatchResult, RejectReason> {
        match result.outcome.reject_reason() {
            Some(reason) => Err(reason),
            None => Ok(result),
        }
    }
}
