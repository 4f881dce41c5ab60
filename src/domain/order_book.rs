// ============================================================================
// Order Book Domain Model
// ============================================================================

use rust_decimal::Decimal;
use std::collections::VecDeque;

use super::ids::{Isin, OrderId, ShareholderId};
use super::order::{Order, OrderStatus, Side};
use crate::numeric::{Price, Quantity};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Order Book
// ============================================================================

/// Price-time ordered queues of one security.
///
/// Active queues keep the best price at the front and FIFO order within a
/// price. Dormant stop queues keep the best trigger price at the front. The
/// book owns every queued order; callers get detached orders back on removal.
///
/// The book never touches ledgers. Reserving and releasing buy-side credit is
/// the caller's job.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    buy_queue: VecDeque<Order>,
    sell_queue: VecDeque<Order>,
    stop_buy_queue: VecDeque<Order>,
    stop_sell_queue: VecDeque<Order>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, side: Side) -> &VecDeque<Order> {
        match side {
            Side::Buy => &self.buy_queue,
            Side::Sell => &self.sell_queue,
        }
    }

    pub fn stop_queue(&self, side: Side) -> &VecDeque<Order> {
        match side {
            Side::Buy => &self.stop_buy_queue,
            Side::Sell => &self.stop_sell_queue,
        }
    }

    fn queue_mut(&mut self, side: Side) -> &mut VecDeque<Order> {
        match side {
            Side::Buy => &mut self.buy_queue,
            Side::Sell => &mut self.sell_queue,
        }
    }

    fn stop_queue_mut(&mut self, side: Side) -> &mut VecDeque<Order> {
        match side {
            Side::Buy => &mut self.stop_buy_queue,
            Side::Sell => &mut self.stop_sell_queue,
        }
    }

    // ========================================================================
    // Enqueue / Restore
    // ========================================================================

    /// Insert behind every order with the same or better price
    pub fn enqueue(&mut self, mut order: Order) {
        order.mark_queued();
        let queue = self.queue_mut(order.side);
        let position = queue
            .iter()
            .position(|queued| order.queues_before(queued))
            .unwrap_or(queue.len());
        tracing::debug!(
            "Queued order {} ({:?} {} @ {}) at position {}",
            order.id,
            order.side,
            order.quantity(),
            order.price,
            position
        );
        queue.insert(position, order);
    }

    /// Insert a dormant stop order behind every order with the same or better trigger
    pub fn enqueue_stop(&mut self, mut order: Order) {
        order.mark_queued();
        let queue = self.stop_queue_mut(order.side);
        let position = queue
            .iter()
            .position(|queued| order.stop_queues_before(queued))
            .unwrap_or(queue.len());
        queue.insert(position, order);
    }

    /// Reinstate an order at a remembered position without touching its state
    pub(crate) fn insert_at(&mut self, index: usize, order: Order) {
        let queue = self.queue_mut(order.side);
        let index = index.min(queue.len());
        queue.insert(index, order);
    }

    /// Same as [`OrderBook::insert_at`] for the dormant queues
    pub(crate) fn insert_stop_at(&mut self, index: usize, order: Order) {
        let queue = self.stop_queue_mut(order.side);
        let index = index.min(queue.len());
        queue.insert(index, order);
    }

    /// Put an order back at the front of its queue in its snapshot state.
    ///
    /// Any live copy (for instance a replenished iceberg requeued at the back)
    /// is dropped first. Restoring trades newest first rebuilds the original
    /// queue because every traded resting order was at the front when it
    /// traded.
    pub(crate) fn restore(&mut self, snapshot: &Order) {
        let _ = self.remove_by_order_id(snapshot.side, snapshot.id);
        let order = Order::restored(snapshot, OrderStatus::Queued);
        self.queue_mut(order.side).push_front(order);
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn find_by_order_id(&self, side: Side, id: OrderId) -> Option<&Order> {
        self.queue(side).iter().find(|order| order.id == id)
    }

    pub(crate) fn find_by_order_id_mut(&mut self, side: Side, id: OrderId) -> Option<&mut Order> {
        self.queue_mut(side).iter_mut().find(|order| order.id == id)
    }

    pub fn find_stop_order(&self, side: Side, id: OrderId) -> Option<&Order> {
        self.stop_queue(side).iter().find(|order| order.id == id)
    }

    /// Whether `id` is taken on `side`, active or dormant
    pub fn contains(&self, side: Side, id: OrderId) -> bool {
        self.find_by_order_id(side, id).is_some() || self.find_stop_order(side, id).is_some()
    }

    pub fn best(&self, side: Side) -> Option<&Order> {
        self.queue(side).front()
    }

    pub fn has_order_of_side(&self, side: Side) -> bool {
        !self.queue(side).is_empty()
    }

    /// Best opposite order if its price crosses the incoming order's price
    pub fn find_order_to_match_with(&self, incoming: &Order) -> Option<&Order> {
        self.best(incoming.side.opposite())
            .filter(|resting| incoming.matches(resting))
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Detach an active order, returning its queue position with it
    pub fn remove_by_order_id(&mut self, side: Side, id: OrderId) -> Option<(usize, Order)> {
        let queue = self.queue_mut(side);
        let index = queue.iter().position(|order| order.id == id)?;
        queue.remove(index).map(|order| (index, order))
    }

    pub fn remove_stop_order(&mut self, side: Side, id: OrderId) -> Option<(usize, Order)> {
        let queue = self.stop_queue_mut(side);
        let index = queue.iter().position(|order| order.id == id)?;
        queue.remove(index).map(|order| (index, order))
    }

    /// Trade `quantity` off the best order of `side`.
    ///
    /// An iceberg whose peak runs out while hidden quantity remains is
    /// replenished and requeued behind its price level. Returns the order if it
    /// is now done and out of the book.
    ///
    /// # Panics
    /// Panics if the side is empty or `quantity` exceeds the best order's
    /// tradable quantity.
    pub(crate) fn consume_best(&mut self, side: Side, quantity: Quantity) -> Option<Order> {
        let queue = self.queue_mut(side);
        let front = queue
            .front_mut()
            .unwrap_or_else(|| panic!("no {:?} order to trade against", side));
        front.decrease_quantity(quantity);
        if front.quantity() > 0 {
            return None;
        }

        let mut order = queue.pop_front()?;
        if order.total_quantity() > 0 {
            tracing::debug!(
                "Replenishing iceberg {} with {} hidden shares left",
                order.id,
                order.total_quantity()
            );
            self.enqueue(order);
            None
        } else {
            order.mark_done();
            Some(order)
        }
    }

    /// Detach the highest-priority dormant stop order triggered at `last_trade_price`.
    ///
    /// Buy stops are scanned before sell stops.
    pub fn take_triggered_stop(&mut self, last_trade_price: Option<Price>) -> Option<Order> {
        for side in [Side::Buy, Side::Sell] {
            let queue = self.stop_queue_mut(side);
            if let Some(index) = queue
                .iter()
                .position(|order| order.is_triggered(last_trade_price))
            {
                return queue.remove(index);
            }
        }
        None
    }

    // ========================================================================
    // Aggregates
    // ========================================================================

    /// Shares a shareholder already offers, dormant stop orders included
    pub fn total_sell_quantity_by_shareholder(&self, shareholder_id: ShareholderId) -> Quantity {
        self.sell_queue
            .iter()
            .chain(self.stop_sell_queue.iter())
            .filter(|order| order.shareholder_id == shareholder_id)
            .map(Order::total_quantity)
            .sum()
    }

    /// Buy quantity priced at or above `price`, or sell quantity priced at or below it
    pub fn cumulative_quantity(&self, side: Side, price: Price) -> Quantity {
        self.queue(side)
            .iter()
            .filter(|order| match side {
                Side::Buy => order.price >= price,
                Side::Sell => order.price <= price,
            })
            .map(Order::total_quantity)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.buy_queue.len() + self.sell_queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buy_queue.is_empty() && self.sell_queue.is_empty()
    }

    pub fn dormant_len(&self) -> usize {
        self.stop_buy_queue.len() + self.stop_sell_queue.len()
    }

    /// Visible quantity per price level, best first
    pub fn depth(&self, side: Side, num_levels: usize) -> Vec<(Price, Quantity)> {
        let mut levels: Vec<(Price, Quantity)> = Vec::new();
        for order in self.queue(side) {
            match levels.last_mut() {
                Some((price, quantity)) if *price == order.price => *quantity += order.quantity(),
                _ => {
                    if levels.len() == num_levels {
                        break;
                    }
                    levels.push((order.price, order.quantity()));
                },
            }
        }
        levels
    }

    pub fn snapshot(&self, isin: &Isin, depth: usize) -> OrderBookSnapshot {
        OrderBookSnapshot::with_depth(
            isin.to_string(),
            self.depth(Side::Buy, depth),
            self.depth(Side::Sell, depth),
        )
    }
}

// ============================================================================
// Order Book Snapshot
// ============================================================================

/// Immutable snapshot of the order book state
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderBookSnapshot {
    pub isin: String,
    /// Bid levels (price, visible quantity)
    pub bids: Vec<(Price, Quantity)>,
    /// Ask levels (price, visible quantity)
    pub asks: Vec<(Price, Quantity)>,
    /// Current spread (ask - bid); negative while an auction book is crossed
    pub spread: Option<Decimal>,
    /// Mid price
    pub mid_price: Option<Decimal>,
}

impl OrderBookSnapshot {
    pub fn with_depth(
        isin: String,
        bids: Vec<(Price, Quantity)>,
        asks: Vec<(Price, Quantity)>,
    ) -> Self {
        let spread = match (bids.first(), asks.first()) {
            (Some((bid, _)), Some((ask, _))) => Some(Decimal::from(*ask) - Decimal::from(*bid)),
            _ => None,
        };

        let mid_price = match (bids.first(), asks.first()) {
            (Some((bid, _)), Some((ask, _))) => {
                Some((Decimal::from(*bid) + Decimal::from(*ask)) / Decimal::from(2))
            },
            _ => None,
        };

        Self {
            isin,
            bids,
            asks,
            spread,
            mid_price,
        }
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|(price, _)| *price)
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|(price, _)| *price)
    }

    pub fn total_bid_quantity(&self) -> Quantity {
        self.bids.iter().map(|(_, qty)| qty).sum()
    }

    pub fn total_ask_quantity(&self) -> Quantity {
        self.asks.iter().map(|(_, qty)| qty).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::tests::{iceberg, order};
    use crate::domain::{BrokerId, OrderId};
    use chrono::Utc;

    fn ids(book: &OrderBook, side: Side) -> Vec<u64> {
        book.queue(side).iter().map(|order| order.id.0).collect()
    }

    #[test]
    fn test_price_time_insertion() {
        let mut book = OrderBook::new();
        book.enqueue(order(1, Side::Buy, 10, 100));
        book.enqueue(order(2, Side::Buy, 10, 200));
        book.enqueue(order(3, Side::Buy, 10, 100));
        book.enqueue(order(4, Side::Buy, 10, 150));

        assert_eq!(ids(&book, Side::Buy), vec![2, 4, 1, 3]);
        assert!(book
            .queue(Side::Buy)
            .iter()
            .all(|order| order.status() == OrderStatus::Queued));

        book.enqueue(order(5, Side::Sell, 10, 300));
        book.enqueue(order(6, Side::Sell, 10, 250));
        book.enqueue(order(7, Side::Sell, 10, 300));
        assert_eq!(ids(&book, Side::Sell), vec![6, 5, 7]);
    }

    #[test]
    fn test_find_and_remove() {
        let mut book = OrderBook::new();
        book.enqueue(order(1, Side::Sell, 10, 100));
        book.enqueue(order(2, Side::Sell, 10, 110));

        assert!(book.find_by_order_id(Side::Sell, OrderId(2)).is_some());
        assert!(book.find_by_order_id(Side::Buy, OrderId(2)).is_none());

        let (index, removed) = book.remove_by_order_id(Side::Sell, OrderId(2)).unwrap();
        assert_eq!(index, 1);
        assert_eq!(removed.id, OrderId(2));
        assert!(book.remove_by_order_id(Side::Sell, OrderId(2)).is_none());
    }

    #[test]
    fn test_find_order_to_match_with() {
        let mut book = OrderBook::new();
        book.enqueue(order(1, Side::Sell, 10, 100));

        assert!(book
            .find_order_to_match_with(&order(2, Side::Buy, 5, 100))
            .is_some());
        assert!(book
            .find_order_to_match_with(&order(3, Side::Buy, 5, 99))
            .is_none());
    }

    #[test]
    fn test_consume_best_replenishes_iceberg_behind_level() {
        let mut book = OrderBook::new();
        book.enqueue(iceberg(1, Side::Sell, 45, 1_000, 10));
        book.enqueue(order(2, Side::Sell, 5, 1_000));

        assert!(book.consume_best(Side::Sell, 10).is_none());

        assert_eq!(ids(&book, Side::Sell), vec![2, 1]);
        let iceberg = book.find_by_order_id(Side::Sell, OrderId(1)).unwrap();
        assert_eq!(iceberg.total_quantity(), 35);
        assert_eq!(iceberg.displayed_quantity(), Some(10));
    }

    #[test]
    fn test_consume_best_finishes_order() {
        let mut book = OrderBook::new();
        book.enqueue(order(1, Side::Buy, 10, 100));

        assert!(book.consume_best(Side::Buy, 4).is_none());
        let done = book.consume_best(Side::Buy, 6).unwrap();
        assert_eq!(done.status(), OrderStatus::Done);
        assert!(book.is_empty());
    }

    #[test]
    fn test_restore_puts_snapshot_in_front() {
        let mut book = OrderBook::new();
        book.enqueue(iceberg(1, Side::Sell, 45, 1_000, 10));
        book.enqueue(order(2, Side::Sell, 5, 1_000));
        let snapshot = book.best(Side::Sell).unwrap().snapshot();

        book.consume_best(Side::Sell, 10);
        book.restore(&snapshot);

        assert_eq!(ids(&book, Side::Sell), vec![1, 2]);
        let restored = book.best(Side::Sell).unwrap();
        assert_eq!(restored.total_quantity(), 45);
        assert_eq!(restored.displayed_quantity(), Some(10));
        assert_eq!(restored.status(), OrderStatus::Queued);
    }

    #[test]
    fn test_stop_queue_trigger_scan() {
        let mut book = OrderBook::new();
        let stop = |id: u64, side: Side, stop_price: Price| {
            Order::new_stop_limit(
                OrderId(id),
                Isin::new("ABC"),
                side,
                10,
                100,
                BrokerId(1),
                crate::domain::ShareholderId(1),
                Utc::now(),
                stop_price,
            )
        };
        book.enqueue_stop(stop(1, Side::Buy, 110));
        book.enqueue_stop(stop(2, Side::Buy, 120));
        book.enqueue_stop(stop(3, Side::Sell, 90));

        assert!(book.take_triggered_stop(Some(100)).is_none());
        let first = book.take_triggered_stop(Some(125)).unwrap();
        assert_eq!(first.id, OrderId(2));
        let second = book.take_triggered_stop(Some(125)).unwrap();
        assert_eq!(second.id, OrderId(1));
        let third = book.take_triggered_stop(Some(90)).unwrap();
        assert_eq!(third.id, OrderId(3));
        assert_eq!(book.dormant_len(), 0);
    }

    #[test]
    fn test_total_sell_quantity_by_shareholder() {
        let mut book = OrderBook::new();
        book.enqueue(order(1, Side::Sell, 10, 100));
        book.enqueue(iceberg(2, Side::Sell, 45, 100, 5));
        book.enqueue(order(3, Side::Buy, 7, 90));

        assert_eq!(
            book.total_sell_quantity_by_shareholder(crate::domain::ShareholderId(1)),
            55
        );
        assert_eq!(
            book.total_sell_quantity_by_shareholder(crate::domain::ShareholderId(2)),
            0
        );
    }

    #[test]
    fn test_depth_and_snapshot() {
        let mut book = OrderBook::new();
        book.enqueue(order(1, Side::Buy, 10, 100));
        book.enqueue(order(2, Side::Buy, 5, 100));
        book.enqueue(order(3, Side::Buy, 5, 90));
        book.enqueue(order(4, Side::Sell, 8, 105));

        assert_eq!(book.depth(Side::Buy, 10), vec![(100, 15), (90, 5)]);
        assert_eq!(book.depth(Side::Buy, 1), vec![(100, 15)]);

        let snapshot = book.snapshot(&Isin::new("ABC"), 5);
        assert_eq!(snapshot.best_bid(), Some(100));
        assert_eq!(snapshot.best_ask(), Some(105));
        assert_eq!(snapshot.spread, Some(Decimal::from(5)));
        assert_eq!(snapshot.mid_price, Some(Decimal::new(1025, 1)));
        assert_eq!(snapshot.total_bid_quantity(), 20);
    }
}
