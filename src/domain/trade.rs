// ============================================================================
// Trade Domain Model
// ============================================================================

use crate::numeric::{value_of, Credit, Price, Quantity};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::ids::{BrokerId, Isin, OrderId, ShareholderId};
use super::order::{Order, OrderStatus, Side};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One match between a buy and a sell order.
///
/// Carries detached pre-trade copies of both orders so that the trade can be
/// rolled back after it was confirmed.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Trade {
    /// Unique trade identifier
    pub id: Uuid,

    pub isin: Isin,

    /// Execution price
    pub price: Price,

    /// Executed quantity
    pub quantity: Quantity,

    /// Side of the order that arrived and took liquidity; `None` for auction trades
    pub aggressor: Option<Side>,

    /// Trade timestamp
    pub timestamp: DateTime<Utc>,

    buy: Order,
    sell: Order,
    /// The buy order had no credit reservation when the trade was built
    buy_was_new: bool,
}

impl Trade {
    /// # Panics
    /// Panics if `buy` and `sell` are not a buy and a sell order.
    pub fn new(
        price: Price,
        quantity: Quantity,
        buy: &Order,
        sell: &Order,
        aggressor: Option<Side>,
    ) -> Self {
        assert!(
            buy.side == Side::Buy && sell.side == Side::Sell,
            "trade needs one buy and one sell order"
        );
        Self {
            id: Uuid::new_v4(),
            isin: buy.isin.clone(),
            price,
            quantity,
            aggressor,
            timestamp: Utc::now(),
            buy: buy.snapshot(),
            sell: sell.snapshot(),
            buy_was_new: buy.status() == OrderStatus::New,
        }
    }

    /// price * quantity
    pub fn traded_value(&self) -> Credit {
        value_of(self.price, self.quantity)
    }

    /// Pre-trade copy of the buy order
    pub fn buy(&self) -> &Order {
        &self.buy
    }

    /// Pre-trade copy of the sell order
    pub fn sell(&self) -> &Order {
        &self.sell
    }

    /// Pre-trade copy of the order on `side`
    pub fn order(&self, side: Side) -> &Order {
        match side {
            Side::Buy => &self.buy,
            Side::Sell => &self.sell,
        }
    }

    pub fn buy_order_id(&self) -> OrderId {
        self.buy.id
    }

    pub fn sell_order_id(&self) -> OrderId {
        self.sell.id
    }

    pub fn buy_broker_id(&self) -> BrokerId {
        self.buy.broker_id
    }

    pub fn sell_broker_id(&self) -> BrokerId {
        self.sell.broker_id
    }

    pub fn buy_shareholder_id(&self) -> ShareholderId {
        self.buy.shareholder_id
    }

    pub fn sell_shareholder_id(&self) -> ShareholderId {
        self.sell.shareholder_id
    }

    /// Whether the buy order was new (unreserved) when the trade was built
    pub fn buy_was_new(&self) -> bool {
        self.buy_was_new
    }

    /// Credit the queued buy order reserved for the traded shares above their
    /// traded value. Zero for a new buy order, which reserved nothing.
    pub fn excess_reservation(&self) -> Credit {
        if self.buy_was_new() {
            0
        } else {
            value_of(self.buy.price, self.quantity) - self.traded_value()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::tests::order;

    #[test]
    fn test_trade_creation() {
        let buy = order(1, Side::Buy, 10, 200);
        let mut sell = order(2, Side::Sell, 10, 150);
        sell.mark_queued();

        let trade = Trade::new(150, 10, &buy, &sell, Some(Side::Buy));

        assert_eq!(trade.isin.as_str(), "ABC");
        assert_eq!(trade.traded_value(), 1_500);
        assert_eq!(trade.buy_order_id(), OrderId(1));
        assert_eq!(trade.sell_order_id(), OrderId(2));
        assert_eq!(trade.sell().status(), OrderStatus::Snapshot);
        assert!(trade.buy_was_new());
        assert_eq!(trade.excess_reservation(), 0);
    }

    #[test]
    fn test_excess_reservation_of_queued_buy() {
        let mut buy = order(1, Side::Buy, 10, 200);
        buy.mark_queued();
        let mut sell = order(2, Side::Sell, 10, 150);
        sell.mark_queued();

        let trade = Trade::new(180, 4, &buy, &sell, None);

        assert!(!trade.buy_was_new());
        assert_eq!(trade.excess_reservation(), 4 * (200 - 180));
    }

    #[test]
    fn test_snapshot_survives_order_mutation() {
        let buy = order(1, Side::Buy, 10, 200);
        let mut sell = order(2, Side::Sell, 10, 200);
        sell.mark_queued();
        let trade = Trade::new(200, 6, &buy, &sell, Some(Side::Buy));

        sell.decrease_quantity(6);

        assert_eq!(trade.sell().total_quantity(), 10);
        assert_eq!(sell.total_quantity(), 4);
    }
}
