// ============================================================================
// Matcher
// Continuous matching, call auctions and atomic trade rollback
// ============================================================================

use super::auction::{find_opening_price, OpeningPrice};
use super::controls::ControlChain;
use crate::domain::{Ledgers, Order, OrderBook, RejectReason, Side, Trade};
use crate::interfaces::{ControlError, ControlResult, EntryKind, MatchingControl};
use crate::numeric::{Price, Quantity};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Result code of one matching pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MatchingOutcome {
    /// Matched against the book; any remainder was queued
    Executed,
    /// Queued without matching (auction entry, dormant stop order)
    Queued,
    NotEnoughCredit,
    NotEnoughPosition,
    NotEnoughExecution,
}

impl MatchingOutcome {
    pub fn is_accepted(self) -> bool {
        matches!(self, MatchingOutcome::Executed | MatchingOutcome::Queued)
    }

    pub fn reject_reason(self) -> Option<RejectReason> {
        match self {
            MatchingOutcome::Executed | MatchingOutcome::Queued => None,
            MatchingOutcome::NotEnoughCredit => Some(RejectReason::NotEnoughCredit),
            MatchingOutcome::NotEnoughPosition => Some(RejectReason::NotEnoughPosition),
            MatchingOutcome::NotEnoughExecution => Some(RejectReason::NotEnoughExecution),
        }
    }
}

impl From<ControlError> for MatchingOutcome {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::NotEnoughCredit => MatchingOutcome::NotEnoughCredit,
            ControlError::NotEnoughPosition => MatchingOutcome::NotEnoughPosition,
            ControlError::NotEnoughExecution => MatchingOutcome::NotEnoughExecution,
        }
    }
}

/// What a matching pass did to one incoming order
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub outcome: MatchingOutcome,
    /// Copy of the part left in the book, if any
    pub remainder: Option<Order>,
    /// Confirmed trades, oldest first; empty when rejected
    pub trades: Vec<Trade>,
}

impl MatchResult {
    fn rejected(err: ControlError) -> Self {
        Self {
            outcome: err.into(),
            remainder: None,
            trades: Vec::new(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.outcome.is_accepted()
    }

    pub fn executed_quantity(&self) -> Quantity {
        self.trades.iter().map(|trade| trade.quantity).sum()
    }
}

/// What a call auction did to the book
#[derive(Debug, Clone)]
pub struct AuctionResult {
    pub opening_price: Option<OpeningPrice>,
    pub trades: Vec<Trade>,
    pub outcome: MatchingOutcome,
}

/// Runs matching passes for one security.
///
/// Every pass is all-or-nothing: a failing control rolls back the trades the
/// pass already confirmed, newest first, before the failure is returned.
pub struct Matcher {
    controls: Arc<ControlChain>,
}

impl Matcher {
    pub fn new(controls: Arc<ControlChain>) -> Self {
        Self { controls }
    }

    pub fn controls(&self) -> &ControlChain {
        &self.controls
    }

    // ========================================================================
    // Continuous Matching
    // ========================================================================

    /// Match a new order against the book and queue what is left.
    ///
    /// Trades happen at the resting order's price.
    pub fn execute(
        &self,
        mut order: Order,
        entry: EntryKind,
        book: &mut OrderBook,
        ledgers: &mut Ledgers,
    ) -> MatchResult {
        if let Err(err) = self.controls.check_before_matching(&order, book, ledgers) {
            return MatchResult::rejected(err);
        }

        let mut trades: Vec<Trade> = Vec::new();
        while order.quantity() > 0 {
            let Some(resting) = book.find_order_to_match_with(&order) else {
                break;
            };
            let quantity = order.quantity().min(resting.quantity());
            let trade = match order.side {
                Side::Buy => Trade::new(resting.price, quantity, &order, resting, Some(Side::Buy)),
                Side::Sell => {
                    Trade::new(resting.price, quantity, resting, &order, Some(Side::Sell))
                },
            };

            if let Err(err) = self.controls.check_before_trade(&trade, ledgers) {
                tracing::debug!("Order {} stopped matching: {}", order.id, err);
                self.rollback(&trades, book, ledgers);
                return MatchResult::rejected(err);
            }

            self.controls.on_trade_confirmed(&trade, ledgers);
            order.decrease_quantity(quantity);
            book.consume_best(order.side.opposite(), quantity);
            tracing::debug!(
                "Trade {} x {} @ {} (buy {} / sell {})",
                trade.id,
                trade.quantity,
                trade.price,
                trade.buy_order_id(),
                trade.sell_order_id()
            );
            trades.push(trade);
        }

        if let Err(err) = self.controls.check_after_matching(&order, &trades, entry) {
            tracing::debug!("Order {} failed after matching: {}", order.id, err);
            self.rollback(&trades, book, ledgers);
            return MatchResult::rejected(err);
        }

        if order.total_quantity() == 0 {
            return MatchResult {
                outcome: MatchingOutcome::Executed,
                remainder: None,
                trades,
            };
        }

        if let Err(err) = self.controls.check_before_queue(&order, ledgers) {
            self.rollback(&trades, book, ledgers);
            return MatchResult::rejected(err);
        }
        let remainder = self.queue(order, book, ledgers);

        MatchResult {
            outcome: MatchingOutcome::Executed,
            remainder,
            trades,
        }
    }

    // ========================================================================
    // Queueing Without Matching
    // ========================================================================

    /// Collect an order for the next auction call
    pub fn enqueue_for_auction(
        &self,
        order: Order,
        book: &mut OrderBook,
        ledgers: &mut Ledgers,
    ) -> MatchResult {
        if let Err(err) = self.admit(&order, book, ledgers) {
            return MatchResult::rejected(err);
        }
        let remainder = self.queue(order, book, ledgers);
        MatchResult {
            outcome: MatchingOutcome::Queued,
            remainder,
            trades: Vec::new(),
        }
    }

    /// Park a stop order in its dormant queue
    pub fn enqueue_stop(
        &self,
        order: Order,
        book: &mut OrderBook,
        ledgers: &mut Ledgers,
    ) -> MatchResult {
        if let Err(err) = self.admit(&order, book, ledgers) {
            return MatchResult::rejected(err);
        }
        self.hold(&order, ledgers);
        let (side, id) = (order.side, order.id);
        book.enqueue_stop(order);
        MatchResult {
            outcome: MatchingOutcome::Queued,
            remainder: book.find_stop_order(side, id).cloned(),
            trades: Vec::new(),
        }
    }

    /// Release what an order that left the book held
    pub fn withdraw(&self, order: &Order, ledgers: &mut Ledgers) {
        self.controls.on_dequeued(order, ledgers);
    }

    /// Take what an order staying in the book holds; inverse of [`Matcher::withdraw`]
    pub fn hold(&self, order: &Order, ledgers: &mut Ledgers) {
        self.controls.on_queued(order, ledgers);
    }

    /// Put a withdrawn order back where it was, holding what it held before
    pub fn reinstate(
        &self,
        index: usize,
        order: Order,
        book: &mut OrderBook,
        ledgers: &mut Ledgers,
    ) {
        self.hold(&order, ledgers);
        book.insert_at(index, order);
    }

    /// Same as [`Matcher::reinstate`] for a dormant stop order
    pub fn reinstate_stop(
        &self,
        index: usize,
        order: Order,
        book: &mut OrderBook,
        ledgers: &mut Ledgers,
    ) {
        self.hold(&order, ledgers);
        book.insert_stop_at(index, order);
    }

    fn admit(&self, order: &Order, book: &OrderBook, ledgers: &Ledgers) -> ControlResult {
        self.controls.check_before_matching(order, book, ledgers)?;
        self.controls.check_before_queue(order, ledgers)
    }

    fn queue(&self, order: Order, book: &mut OrderBook, ledgers: &mut Ledgers) -> Option<Order> {
        self.hold(&order, ledgers);
        let (side, id) = (order.side, order.id);
        book.enqueue(order);
        book.find_by_order_id(side, id).cloned()
    }

    // ========================================================================
    // Call Auction
    // ========================================================================

    /// Execute every crossing order at one opening price
    pub fn call_auction(
        &self,
        book: &mut OrderBook,
        ledgers: &mut Ledgers,
        last_trade_price: Option<Price>,
        tick_size: Price,
    ) -> AuctionResult {
        let Some(opening) = find_opening_price(book, last_trade_price, tick_size) else {
            return AuctionResult {
                opening_price: None,
                trades: Vec::new(),
                outcome: MatchingOutcome::Executed,
            };
        };
        let price = opening.price;

        let mut trades: Vec<Trade> = Vec::new();
        while let (Some(buy), Some(sell)) = (book.best(Side::Buy), book.best(Side::Sell)) {
            if buy.price < price || sell.price > price {
                break;
            }
            let quantity = buy.quantity().min(sell.quantity());
            let trade = Trade::new(price, quantity, buy, sell, None);

            if let Err(err) = self.controls.check_before_trade(&trade, ledgers) {
                tracing::warn!("Auction at {} rolled back: {}", price, err);
                self.rollback(&trades, book, ledgers);
                return AuctionResult {
                    opening_price: Some(opening),
                    trades: Vec::new(),
                    outcome: err.into(),
                };
            }

            self.controls.on_trade_confirmed(&trade, ledgers);
            book.consume_best(Side::Buy, quantity);
            book.consume_best(Side::Sell, quantity);
            trades.push(trade);
        }

        tracing::debug!(
            "Auction executed {} trades at {} ({} shares)",
            trades.len(),
            price,
            opening.tradable_quantity
        );
        AuctionResult {
            opening_price: Some(opening),
            trades,
            outcome: MatchingOutcome::Executed,
        }
    }

    // ========================================================================
    // Rollback
    // ========================================================================

    /// Undo confirmed trades newest first.
    ///
    /// Ledger effects are reversed and every order that was resting in the
    /// book when it traded is restored from its pre-trade snapshot.
    pub fn rollback(&self, trades: &[Trade], book: &mut OrderBook, ledgers: &mut Ledgers) {
        for trade in trades.iter().rev() {
            self.controls.on_trade_rolled_back(trade, ledgers);
            for side in [Side::Buy, Side::Sell] {
                if trade.aggressor != Some(side) {
                    book.restore(trade.order(side));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::tests::{iceberg, order};
    use crate::domain::{Broker, BrokerId, Isin, OrderId, OrderStatus, Shareholder, ShareholderId};

    const BUYER: BrokerId = BrokerId(1);
    const SELLER: BrokerId = BrokerId(2);

    fn matcher() -> Matcher {
        Matcher::new(Arc::new(ControlChain::default()))
    }

    fn ledgers(buyer_credit: u64) -> Ledgers {
        let mut ledgers = Ledgers::new();
        ledgers.add_broker(Broker::new(BUYER, buyer_credit));
        ledgers.add_broker(Broker::new(SELLER, 0));
        ledgers.add_shareholder(Shareholder::new(ShareholderId(1)));
        ledgers.add_shareholder(
            Shareholder::new(ShareholderId(2)).with_position(Isin::new("ABC"), 1_000),
        );
        ledgers
    }

    fn sell(id: u64, quantity: Quantity, price: Price) -> Order {
        let mut order = order(id, Side::Sell, quantity, price);
        order.broker_id = SELLER;
        order.shareholder_id = ShareholderId(2);
        order
    }

    fn sell_iceberg(id: u64, quantity: Quantity, price: Price, peak: Quantity) -> Order {
        let mut order = iceberg(id, Side::Sell, quantity, price, peak);
        order.broker_id = SELLER;
        order.shareholder_id = ShareholderId(2);
        order
    }

    fn queue(matcher: &Matcher, order: Order, book: &mut OrderBook, ledgers: &mut Ledgers) {
        let result = matcher.execute(order, EntryKind::NewOrder, book, ledgers);
        assert_eq!(result.outcome, MatchingOutcome::Executed);
        assert!(result.trades.is_empty());
    }

    fn book_state(book: &OrderBook, side: Side) -> Vec<(u64, Quantity, Quantity)> {
        book.queue(side)
            .iter()
            .map(|order| (order.id.0, order.quantity(), order.total_quantity()))
            .collect()
    }

    #[test]
    fn test_incoming_sell_takes_best_buy_at_its_price() {
        let matcher = matcher();
        let mut book = OrderBook::new();
        let mut ledgers = ledgers(100_000);
        queue(&matcher, order(1, Side::Buy, 10, 100), &mut book, &mut ledgers);
        queue(&matcher, order(2, Side::Buy, 10, 200), &mut book, &mut ledgers);
        assert_eq!(ledgers.credit(BUYER), 97_000);

        let result = matcher.execute(sell(3, 10, 100), EntryKind::NewOrder, &mut book, &mut ledgers);

        assert_eq!(result.outcome, MatchingOutcome::Executed);
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].price, 200);
        assert_eq!(result.trades[0].buy_order_id(), OrderId(2));
        assert_eq!(ledgers.credit(SELLER), 2_000);
        assert_eq!(ledgers.credit(BUYER), 97_000);
        assert_eq!(book_state(&book, Side::Buy), vec![(1, 10, 10)]);
        assert!(result.remainder.is_none());
    }

    #[test]
    fn test_iceberg_replenished_behind_level() {
        let matcher = matcher();
        let mut book = OrderBook::new();
        let mut ledgers = ledgers(100_000);
        queue(&matcher, sell_iceberg(1, 45, 1_000, 10), &mut book, &mut ledgers);
        queue(&matcher, sell(2, 5, 1_000), &mut book, &mut ledgers);

        let result = matcher.execute(
            order(3, Side::Buy, 10, 1_000),
            EntryKind::NewOrder,
            &mut book,
            &mut ledgers,
        );

        assert_eq!(result.executed_quantity(), 10);
        assert_eq!(book_state(&book, Side::Sell), vec![(2, 5, 5), (1, 10, 35)]);
        assert_eq!(ledgers.credit(BUYER), 90_000);
        assert_eq!(ledgers.position(ShareholderId(1), &Isin::new("ABC")), 10);
    }

    #[test]
    fn test_new_iceberg_matches_whole_quantity() {
        let matcher = matcher();
        let mut book = OrderBook::new();
        let mut ledgers = ledgers(100_000);
        queue(&matcher, sell(1, 30, 100), &mut book, &mut ledgers);

        let incoming = iceberg(2, Side::Buy, 50, 100, 10);
        let result = matcher.execute(incoming, EntryKind::NewOrder, &mut book, &mut ledgers);

        assert_eq!(result.executed_quantity(), 30);
        let remainder = result.remainder.unwrap();
        assert_eq!(remainder.total_quantity(), 20);
        assert_eq!(remainder.displayed_quantity(), Some(10));
        assert_eq!(ledgers.credit(BUYER), 100_000 - 3_000 - 2_000);
    }

    #[test]
    fn test_minimum_execution_failure_leaves_no_trace() {
        let matcher = matcher();
        let mut book = OrderBook::new();
        let mut ledgers = ledgers(100_000);
        queue(&matcher, sell(1, 25, 100), &mut book, &mut ledgers);
        queue(&matcher, sell(2, 15, 101), &mut book, &mut ledgers);
        let before = book_state(&book, Side::Sell);

        let incoming = order(3, Side::Buy, 100, 110).with_minimum_execution_quantity(50);
        let result = matcher.execute(incoming, EntryKind::NewOrder, &mut book, &mut ledgers);

        assert_eq!(result.outcome, MatchingOutcome::NotEnoughExecution);
        assert!(result.trades.is_empty());
        assert_eq!(book_state(&book, Side::Sell), before);
        assert!(book.queue(Side::Buy).is_empty());
        assert_eq!(ledgers.credit(BUYER), 100_000);
        assert_eq!(ledgers.credit(SELLER), 0);
        assert_eq!(ledgers.position(ShareholderId(2), &Isin::new("ABC")), 1_000);
        assert_eq!(ledgers.position(ShareholderId(1), &Isin::new("ABC")), 0);
    }

    #[test]
    fn test_credit_failure_mid_pass_rolls_back() {
        let matcher = matcher();
        let mut book = OrderBook::new();
        let mut ledgers = ledgers(1_500);
        queue(&matcher, sell(1, 10, 100), &mut book, &mut ledgers);
        queue(&matcher, sell(2, 10, 110), &mut book, &mut ledgers);

        let result = matcher.execute(
            order(3, Side::Buy, 20, 110),
            EntryKind::NewOrder,
            &mut book,
            &mut ledgers,
        );

        assert_eq!(result.outcome, MatchingOutcome::NotEnoughCredit);
        assert_eq!(book_state(&book, Side::Sell), vec![(1, 10, 10), (2, 10, 10)]);
        assert!(book
            .queue(Side::Sell)
            .iter()
            .all(|order| order.status() == OrderStatus::Queued));
        assert_eq!(ledgers.credit(BUYER), 1_500);
        assert_eq!(ledgers.credit(SELLER), 0);
    }

    #[test]
    fn test_remainder_needs_credit_for_reservation() {
        let matcher = matcher();
        let mut book = OrderBook::new();
        let mut ledgers = ledgers(1_500);
        queue(&matcher, sell(1, 10, 100), &mut book, &mut ledgers);

        let result = matcher.execute(
            order(2, Side::Buy, 20, 100),
            EntryKind::NewOrder,
            &mut book,
            &mut ledgers,
        );

        assert_eq!(result.outcome, MatchingOutcome::NotEnoughCredit);
        assert_eq!(book_state(&book, Side::Sell), vec![(1, 10, 10)]);
        assert_eq!(ledgers.credit(BUYER), 1_500);
    }

    #[test]
    fn test_rollback_restores_iceberg_traded_twice() {
        let matcher = matcher();
        let mut book = OrderBook::new();
        let mut ledgers = ledgers(100_000);
        queue(&matcher, sell_iceberg(1, 45, 100, 10), &mut book, &mut ledgers);
        queue(&matcher, sell(2, 5, 100), &mut book, &mut ledgers);
        let before = book_state(&book, Side::Sell);

        let incoming = order(3, Side::Buy, 30, 100);
        let result = matcher.execute(incoming, EntryKind::NewOrder, &mut book, &mut ledgers);
        assert_eq!(result.trades.len(), 4);
        assert!(result.remainder.is_none());
        assert_eq!(book_state(&book, Side::Sell), vec![(1, 5, 20)]);

        matcher.rollback(&result.trades, &mut book, &mut ledgers);

        assert_eq!(book_state(&book, Side::Sell), before);
        assert_eq!(ledgers.credit(BUYER), 100_000);
        assert_eq!(ledgers.credit(SELLER), 0);
    }

    #[test]
    fn test_position_checked_before_matching() {
        let matcher = matcher();
        let mut book = OrderBook::new();
        let mut ledgers = ledgers(100_000);
        queue(&matcher, sell(1, 600, 100), &mut book, &mut ledgers);

        let result = matcher.execute(sell(2, 401, 100), EntryKind::NewOrder, &mut book, &mut ledgers);
        assert_eq!(result.outcome, MatchingOutcome::NotEnoughPosition);
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_auction_queue_then_call() {
        let matcher = matcher();
        let mut book = OrderBook::new();
        let mut ledgers = ledgers(100_000);

        let queued = matcher.enqueue_for_auction(order(1, Side::Buy, 10, 110), &mut book, &mut ledgers);
        assert_eq!(queued.outcome, MatchingOutcome::Queued);
        matcher.enqueue_for_auction(sell(2, 6, 100), &mut book, &mut ledgers);
        matcher.enqueue_for_auction(sell(3, 6, 105), &mut book, &mut ledgers);
        assert_eq!(ledgers.credit(BUYER), 98_900);

        let result = matcher.call_auction(&mut book, &mut ledgers, Some(104), 1);

        let opening = result.opening_price.unwrap();
        assert_eq!(opening.price, 105);
        assert_eq!(opening.tradable_quantity, 10);
        assert_eq!(result.trades.len(), 2);
        assert!(result.trades.iter().all(|trade| trade.price == 105));
        // 10 reserved at 110, bought at 105
        assert_eq!(ledgers.credit(BUYER), 98_950);
        assert_eq!(ledgers.credit(SELLER), 1_050);
        assert_eq!(book_state(&book, Side::Sell), vec![(3, 2, 2)]);
        assert!(book.queue(Side::Buy).is_empty());
    }

    #[test]
    fn test_auction_without_cross_does_nothing() {
        let matcher = matcher();
        let mut book = OrderBook::new();
        let mut ledgers = ledgers(100_000);
        matcher.enqueue_for_auction(order(1, Side::Buy, 10, 90), &mut book, &mut ledgers);
        matcher.enqueue_for_auction(sell(2, 10, 100), &mut book, &mut ledgers);

        let result = matcher.call_auction(&mut book, &mut ledgers, None, 1);
        assert!(result.opening_price.is_none());
        assert!(result.trades.is_empty());
        assert_eq!(book.len(), 2);
    }

    #[test]
    fn test_stop_order_reserves_until_withdrawn() {
        let matcher = matcher();
        let mut book = OrderBook::new();
        let mut ledgers = ledgers(10_000);
        let stop = Order::new_stop_limit(
            OrderId(1),
            Isin::new("ABC"),
            Side::Buy,
            10,
            120,
            BUYER,
            ShareholderId(1),
            chrono::Utc::now(),
            115,
        );

        let result = matcher.enqueue_stop(stop, &mut book, &mut ledgers);
        assert_eq!(result.outcome, MatchingOutcome::Queued);
        assert_eq!(ledgers.credit(BUYER), 8_800);

        let (_, dormant) = book.remove_stop_order(Side::Buy, OrderId(1)).unwrap();
        matcher.withdraw(&dormant, &mut ledgers);
        assert_eq!(ledgers.credit(BUYER), 10_000);
    }
}
