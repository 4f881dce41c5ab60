// ============================================================================
// Matching Controls
// Position, credit and execution checks plus their ledger effects
// ============================================================================

use crate::domain::{Ledgers, Order, OrderBook, Side, Trade};
use crate::interfaces::{ControlError, ControlResult, EntryKind, MatchingControl};

// ============================================================================
// Position Control
// ============================================================================

/// Sell orders must be covered by the shareholder's position, counting every
/// sell order the shareholder already has in the book. Moves shares on trades.
pub struct PositionControl;

impl MatchingControl for PositionControl {
    fn name(&self) -> &str {
        "PositionControl"
    }

    fn check_before_matching(
        &self,
        order: &Order,
        book: &OrderBook,
        ledgers: &Ledgers,
    ) -> ControlResult {
        if order.side == Side::Buy {
            return Ok(());
        }
        let queued = book.total_sell_quantity_by_shareholder(order.shareholder_id);
        let required = queued + order.total_quantity();
        if ledgers.position(order.shareholder_id, &order.isin) >= required {
            Ok(())
        } else {
            Err(ControlError::NotEnoughPosition)
        }
    }

    fn on_trade_confirmed(&self, trade: &Trade, ledgers: &mut Ledgers) {
        ledgers
            .shareholder_mut(trade.sell_shareholder_id())
            .decrease_position(&trade.isin, trade.quantity);
        ledgers
            .shareholder_mut(trade.buy_shareholder_id())
            .increase_position(&trade.isin, trade.quantity);
    }

    fn on_trade_rolled_back(&self, trade: &Trade, ledgers: &mut Ledgers) {
        ledgers
            .shareholder_mut(trade.buy_shareholder_id())
            .decrease_position(&trade.isin, trade.quantity);
        ledgers
            .shareholder_mut(trade.sell_shareholder_id())
            .increase_position(&trade.isin, trade.quantity);
    }
}

// ============================================================================
// Credit Control
// ============================================================================

/// Owns every broker credit movement.
///
/// A buy order in the book holds `price * quantity` of its broker's credit.
/// A new buy order pays each trade when it is confirmed; a queued one already
/// paid and only gets back what it reserved above the trade price.
pub struct CreditControl;

impl MatchingControl for CreditControl {
    fn name(&self) -> &str {
        "CreditControl"
    }

    fn check_before_trade(&self, trade: &Trade, ledgers: &Ledgers) -> ControlResult {
        if !trade.buy_was_new() {
            return Ok(());
        }
        let enough = ledgers
            .broker(trade.buy_broker_id())
            .is_some_and(|broker| broker.has_enough_credit(trade.traded_value()));
        if enough {
            Ok(())
        } else {
            Err(ControlError::NotEnoughCredit)
        }
    }

    fn on_trade_confirmed(&self, trade: &Trade, ledgers: &mut Ledgers) {
        let buyer = ledgers.broker_mut(trade.buy_broker_id());
        if trade.buy_was_new() {
            buyer.decrease_credit(trade.traded_value());
        } else {
            buyer.increase_credit(trade.excess_reservation());
        }
        ledgers
            .broker_mut(trade.sell_broker_id())
            .increase_credit(trade.traded_value());
    }

    fn on_trade_rolled_back(&self, trade: &Trade, ledgers: &mut Ledgers) {
        ledgers
            .broker_mut(trade.sell_broker_id())
            .decrease_credit(trade.traded_value());
        let buyer = ledgers.broker_mut(trade.buy_broker_id());
        if trade.buy_was_new() {
            buyer.increase_credit(trade.traded_value());
        } else {
            buyer.decrease_credit(trade.excess_reservation());
        }
    }

    fn check_before_queue(&self, order: &Order, ledgers: &Ledgers) -> ControlResult {
        if order.side == Side::Sell {
            return Ok(());
        }
        let enough = ledgers
            .broker(order.broker_id)
            .is_some_and(|broker| broker.has_enough_credit(order.value()));
        if enough {
            Ok(())
        } else {
            Err(ControlError::NotEnoughCredit)
        }
    }

    fn on_queued(&self, order: &Order, ledgers: &mut Ledgers) {
        if order.side == Side::Buy {
            ledgers
                .broker_mut(order.broker_id)
                .decrease_credit(order.value());
        }
    }

    fn on_dequeued(&self, order: &Order, ledgers: &mut Ledgers) {
        if order.side == Side::Buy {
            ledgers
                .broker_mut(order.broker_id)
                .increase_credit(order.value());
        }
    }
}

// ============================================================================
// Execution Control
// ============================================================================

/// All-or-nothing floor: a freshly entered order must trade at least its
/// minimum execution quantity in the pass that admits it
pub struct ExecutionControl;

impl MatchingControl for ExecutionControl {
    fn name(&self) -> &str {
        "ExecutionControl"
    }

    fn check_after_matching(
        &self,
        order: &Order,
        trades: &[Trade],
        entry: EntryKind,
    ) -> ControlResult {
        if entry != EntryKind::NewOrder {
            return Ok(());
        }
        let executed: u64 = trades.iter().map(|trade| trade.quantity).sum();
        if executed >= order.minimum_execution_quantity {
            Ok(())
        } else {
            Err(ControlError::NotEnoughExecution)
        }
    }
}

// ============================================================================
// Control Chain
// ============================================================================

/// Ordered set of controls run as one.
///
/// Checks stop at the first failure. Rollback hooks run in reverse order so
/// that each control undoes its effects on the ledgers it left them in.
pub struct ControlChain {
    controls: Vec<Box<dyn MatchingControl>>,
}

impl ControlChain {
    pub fn new(controls: Vec<Box<dyn MatchingControl>>) -> Self {
        Self { controls }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Builder method: append a control
    pub fn with_control(mut self, control: Box<dyn MatchingControl>) -> Self {
        self.controls.push(control);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.controls.iter().map(|control| control.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }
}

impl Default for ControlChain {
    fn default() -> Self {
        Self::new(vec![
            Box::new(PositionControl),
            Box::new(CreditControl),
            Box::new(ExecutionControl),
        ])
    }
}

impl MatchingControl for ControlChain {
    fn name(&self) -> &str {
        "ControlChain"
    }

    fn check_before_matching(
        &self,
        order: &Order,
        book: &OrderBook,
        ledgers: &Ledgers,
    ) -> ControlResult {
        for control in &self.controls {
            control.check_before_matching(order, book, ledgers)?;
        }
        Ok(())
    }

    fn check_before_trade(&self, trade: &Trade, ledgers: &Ledgers) -> ControlResult {
        for control in &self.controls {
            control.check_before_trade(trade, ledgers)?;
        }
        Ok(())
    }

    fn on_trade_confirmed(&self, trade: &Trade, ledgers: &mut Ledgers) {
        for control in &self.controls {
            control.on_trade_confirmed(trade, ledgers);
        }
    }

    fn on_trade_rolled_back(&self, trade: &Trade, ledgers: &mut Ledgers) {
        for control in self.controls.iter().rev() {
            control.on_trade_rolled_back(trade, ledgers);
        }
    }

    fn check_after_matching(
        &self,
        order: &Order,
        trades: &[Trade],
        entry: EntryKind,
    ) -> ControlResult {
        for control in &self.controls {
            control.check_after_matching(order, trades, entry)?;
        }
        Ok(())
    }

    fn check_before_queue(&self, order: &Order, ledgers: &Ledgers) -> ControlResult {
        for control in &self.controls {
            control.check_before_queue(order, ledgers)?;
        }
        Ok(())
    }

    fn on_queued(&self, order: &Order, ledgers: &mut Ledgers) {
        for control in &self.controls {
            control.on_queued(order, ledgers);
        }
    }

    fn on_dequeued(&self, order: &Order, ledgers: &mut Ledgers) {
        for control in self.controls.iter().rev() {
            control.on_dequeued(order, ledgers);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::tests::order;
    use crate::domain::{Broker, BrokerId, Isin, Shareholder, ShareholderId};

    fn ledgers(credit: u64, position: u64) -> Ledgers {
        let mut ledgers = Ledgers::new();
        ledgers.add_broker(Broker::new(BrokerId(1), credit));
        ledgers.add_shareholder(
            Shareholder::new(ShareholderId(1)).with_position(Isin::new("ABC"), position),
        );
        ledgers
    }

    #[test]
    fn test_position_counts_queued_sells() {
        let ledgers = ledgers(0, 100);
        let mut book = OrderBook::new();
        book.enqueue(order(1, Side::Sell, 60, 100));

        assert_eq!(
            PositionControl.check_before_matching(&order(2, Side::Sell, 40, 100), &book, &ledgers),
            Ok(())
        );
        assert_eq!(
            PositionControl.check_before_matching(&order(3, Side::Sell, 41, 100), &book, &ledgers),
            Err(ControlError::NotEnoughPosition)
        );
        assert_eq!(
            PositionControl.check_before_matching(&order(4, Side::Buy, 500, 100), &book, &ledgers),
            Ok(())
        );
    }

    #[test]
    fn test_credit_checked_only_for_new_buy() {
        let ledgers = ledgers(1_000, 0);
        let mut sell = order(2, Side::Sell, 20, 100);
        sell.mark_queued();

        let affordable = Trade::new(100, 10, &order(1, Side::Buy, 20, 100), &sell, Some(Side::Buy));
        assert_eq!(CreditControl.check_before_trade(&affordable, &ledgers), Ok(()));

        let too_big = Trade::new(100, 11, &order(1, Side::Buy, 20, 100), &sell, Some(Side::Buy));
        assert_eq!(
            CreditControl.check_before_trade(&too_big, &ledgers),
            Err(ControlError::NotEnoughCredit)
        );

        let mut queued_buy = order(3, Side::Buy, 20, 100);
        queued_buy.mark_queued();
        let reserved = Trade::new(100, 20, &queued_buy, &sell, Some(Side::Sell));
        assert_eq!(CreditControl.check_before_trade(&reserved, &ledgers), Ok(()));
    }

    #[test]
    fn test_credit_confirm_and_rollback_cancel_out() {
        let mut ledgers = ledgers(10_000, 0);
        ledgers.add_broker(Broker::new(BrokerId(2), 500));
        let mut sell = order(2, Side::Sell, 20, 90);
        sell.broker_id = BrokerId(2);
        sell.mark_queued();

        let trade = Trade::new(90, 10, &order(1, Side::Buy, 20, 100), &sell, Some(Side::Buy));
        CreditControl.on_trade_confirmed(&trade, &mut ledgers);
        assert_eq!(ledgers.credit(BrokerId(1)), 9_100);
        assert_eq!(ledgers.credit(BrokerId(2)), 1_400);

        CreditControl.on_trade_rolled_back(&trade, &mut ledgers);
        assert_eq!(ledgers.credit(BrokerId(1)), 10_000);
        assert_eq!(ledgers.credit(BrokerId(2)), 500);
    }

    #[test]
    fn test_reservation_round_trip() {
        let mut ledgers = ledgers(10_000, 0);
        let buy = order(1, Side::Buy, 10, 300);

        assert_eq!(CreditControl.check_before_queue(&buy, &ledgers), Ok(()));
        CreditControl.on_queued(&buy, &mut ledgers);
        assert_eq!(ledgers.credit(BrokerId(1)), 7_000);
        CreditControl.on_dequeued(&buy, &mut ledgers);
        assert_eq!(ledgers.credit(BrokerId(1)), 10_000);

        let big = order(2, Side::Buy, 100, 300);
        assert_eq!(
            CreditControl.check_before_queue(&big, &ledgers),
            Err(ControlError::NotEnoughCredit)
        );
    }

    #[test]
    fn test_execution_floor_only_for_new_orders() {
        let mut sell = order(2, Side::Sell, 40, 100);
        sell.mark_queued();
        let buy = order(1, Side::Buy, 100, 100).with_minimum_execution_quantity(50);
        let trades = vec![Trade::new(100, 40, &buy, &sell, Some(Side::Buy))];

        assert_eq!(
            ExecutionControl.check_after_matching(&buy, &trades, EntryKind::NewOrder),
            Err(ControlError::NotEnoughExecution)
        );
        assert_eq!(
            ExecutionControl.check_after_matching(&buy, &trades, EntryKind::Update),
            Ok(())
        );
    }

    #[test]
    fn test_chain_stops_at_first_failure() {
        let chain = ControlChain::default();
        assert_eq!(
            chain.names(),
            vec!["PositionControl", "CreditControl", "ExecutionControl"]
        );

        let ledgers = ledgers(0, 0);
        let book = OrderBook::new();
        assert_eq!(
            chain.check_before_matching(&order(1, Side::Sell, 5, 100), &book, &ledgers),
            Err(ControlError::NotEnoughPosition)
        );
        assert!(ControlChain::empty()
            .check_before_queue(&order(2, Side::Buy, 5, 100), &ledgers)
            .is_ok());
    }
}
