// ============================================================================
// Order Domain Model
// ============================================================================

use super::ids::{BrokerId, Isin, OrderId, ShareholderId};
use crate::numeric::{value_of, Credit, Price, Quantity};
use chrono::{DateTime, Utc};
use smallvec::{smallvec, SmallVec};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use state::{OrderStatus, OrderTransition};

// ============================================================================
// Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Variant-specific order data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OrderKind {
    /// Fully visible limit order
    Plain,
    /// Discloses at most `peak_size` shares at a time
    Iceberg {
        peak_size: Quantity,
        displayed_quantity: Quantity,
    },
    /// Dormant until the last trade price reaches `stop_price`
    StopLimit { stop_price: Price },
}

/// New field values carried by an update request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderUpdate {
    pub quantity: Quantity,
    pub price: Price,
    /// Zero for non-iceberg orders
    pub peak_size: Quantity,
    /// Zero for orders that are not dormant stop orders
    pub stop_price: Price,
    pub expiry: Option<DateTime<Utc>>,
    pub entry_time: DateTime<Utc>,
}

// ============================================================================
// Order State Machine
// ============================================================================

pub mod state {
    #[cfg(feature = "serde")]
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub enum OrderStatus {
        /// Not yet in the book; holds no credit reservation
        New = 0,
        /// Resting in the book (active or dormant queue)
        Queued = 1,
        /// In-place update that keeps queue priority is in progress
        Updating = 2,
        /// Fully traded and removed from the book
        Done = 3,
        /// Detached copy kept for rollback; never enters the book
        Snapshot = 4,
    }

    impl OrderStatus {
        pub fn is_in_book(&self) -> bool {
            matches!(self, OrderStatus::Queued | OrderStatus::Updating)
        }
    }

    /// Valid state transitions for the order state machine
    #[derive(Debug, Clone, Copy)]
    pub enum OrderTransition {
        Queue,
        BeginUpdate,
        Reset,
        Fill,
    }

    impl OrderStatus {
        pub fn transition(&self, transition: OrderTransition) -> Result<OrderStatus, String> {
            match (self, transition) {
                (OrderStatus::New, OrderTransition::Queue) => Ok(OrderStatus::Queued),
                // iceberg replenishment re-queues a queued order
                (OrderStatus::Queued, OrderTransition::Queue) => Ok(OrderStatus::Queued),
                (OrderStatus::Updating, OrderTransition::Queue) => Ok(OrderStatus::Queued),
                (OrderStatus::Done, OrderTransition::Queue) => Ok(OrderStatus::Queued),

                (OrderStatus::Queued, OrderTransition::BeginUpdate) => Ok(OrderStatus::Updating),

                (OrderStatus::Queued, OrderTransition::Reset) => Ok(OrderStatus::New),
                (OrderStatus::Updating, OrderTransition::Reset) => Ok(OrderStatus::New),

                (OrderStatus::New, OrderTransition::Fill) => Ok(OrderStatus::Done),
                (OrderStatus::Queued, OrderTransition::Fill) => Ok(OrderStatus::Done),

                _ => Err(format!(
                    "Invalid transition from {:?} via {:?}",
                    self, transition
                )),
            }
        }
    }
}

// ============================================================================
// Order Entity
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Order {
    pub id: OrderId,
    pub isin: Isin,
    pub side: Side,
    pub price: Price,
    pub broker_id: BrokerId,
    pub shareholder_id: ShareholderId,
    /// Shares that must trade on entry or the order is rejected
    pub minimum_execution_quantity: Quantity,
    pub expiry: Option<DateTime<Utc>>,
    /// Request that last touched the order, echoed in activation events
    pub request_id: u64,

    quantity: Quantity,
    kind: OrderKind,
    status: OrderStatus,
    /// Oldest first; a new entry is appended whenever priority is lost
    entry_times: SmallVec<[DateTime<Utc>; 2]>,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: OrderId,
        isin: Isin,
        side: Side,
        quantity: Quantity,
        price: Price,
        broker_id: BrokerId,
        shareholder_id: ShareholderId,
        entry_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            isin,
            side,
            price,
            broker_id,
            shareholder_id,
            minimum_execution_quantity: 0,
            expiry: None,
            request_id: 0,
            quantity,
            kind: OrderKind::Plain,
            status: OrderStatus::New,
            entry_times: smallvec![entry_time],
        }
    }

    /// Create a new iceberg order (partially visible)
    #[allow(clippy::too_many_arguments)]
    pub fn new_iceberg(
        id: OrderId,
        isin: Isin,
        side: Side,
        quantity: Quantity,
        price: Price,
        broker_id: BrokerId,
        shareholder_id: ShareholderId,
        entry_time: DateTime<Utc>,
        peak_size: Quantity,
    ) -> Self {
        let mut order = Self::new(
            id,
            isin,
            side,
            quantity,
            price,
            broker_id,
            shareholder_id,
            entry_time,
        );
        order.kind = OrderKind::Iceberg {
            peak_size,
            displayed_quantity: peak_size.min(quantity),
        };
        order
    }

    /// Create a new stop-limit order (dormant until triggered)
    #[allow(clippy::too_many_arguments)]
    pub fn new_stop_limit(
        id: OrderId,
        isin: Isin,
        side: Side,
        quantity: Quantity,
        price: Price,
        broker_id: BrokerId,
        shareholder_id: ShareholderId,
        entry_time: DateTime<Utc>,
        stop_price: Price,
    ) -> Self {
        let mut order = Self::new(
            id,
            isin,
            side,
            quantity,
            price,
            broker_id,
            shareholder_id,
            entry_time,
        );
        order.kind = OrderKind::StopLimit { stop_price };
        order
    }

    pub fn with_minimum_execution_quantity(mut self, quantity: Quantity) -> Self {
        self.minimum_execution_quantity = quantity;
        self
    }

    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn with_request_id(mut self, request_id: u64) -> Self {
        self.request_id = request_id;
        self
    }

    // ========================================================================
    // Getters
    // ========================================================================

    /// Quantity visible to matching.
    ///
    /// A queued iceberg only exposes its displayed peak; a new one matches
    /// with its whole quantity.
    pub fn quantity(&self) -> Quantity {
        match self.kind {
            OrderKind::Iceberg {
                displayed_quantity, ..
            } if self.status != OrderStatus::New => displayed_quantity,
            _ => self.quantity,
        }
    }

    /// Remaining tradable quantity, hidden part included
    pub fn total_quantity(&self) -> Quantity {
        self.quantity
    }

    /// Value of the whole remaining quantity; what a queued buy order reserves
    pub fn value(&self) -> Credit {
        value_of(self.price, self.quantity)
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn kind(&self) -> OrderKind {
        self.kind
    }

    pub fn peak_size(&self) -> Option<Quantity> {
        match self.kind {
            OrderKind::Iceberg { peak_size, .. } => Some(peak_size),
            _ => None,
        }
    }

    pub fn displayed_quantity(&self) -> Option<Quantity> {
        match self.kind {
            OrderKind::Iceberg {
                displayed_quantity, ..
            } => Some(displayed_quantity),
            _ => None,
        }
    }

    pub fn stop_price(&self) -> Option<Price> {
        match self.kind {
            OrderKind::StopLimit { stop_price } => Some(stop_price),
            _ => None,
        }
    }

    pub fn is_iceberg(&self) -> bool {
        matches!(self.kind, OrderKind::Iceberg { .. })
    }

    pub fn is_stop_limit(&self) -> bool {
        matches!(self.kind, OrderKind::StopLimit { .. })
    }

    /// Time the order last (re)gained its queue position
    pub fn entry_time(&self) -> DateTime<Utc> {
        self.entry_times[self.entry_times.len() - 1]
    }

    pub fn entry_times(&self) -> &[DateTime<Utc>] {
        &self.entry_times
    }

    // ========================================================================
    // Priority
    // ========================================================================

    /// Whether this order's price crosses `other` (an opposite-side order)
    pub fn matches(&self, other: &Order) -> bool {
        match self.side {
            Side::Buy => self.price >= other.price,
            Side::Sell => self.price <= other.price,
        }
    }

    /// Strict price priority over a same-side order; equal prices keep FIFO
    pub fn queues_before(&self, other: &Order) -> bool {
        match self.side {
            Side::Buy => self.price > other.price,
            Side::Sell => self.price < other.price,
        }
    }

    /// Strict trigger priority over a same-side dormant stop order
    pub fn stop_queues_before(&self, other: &Order) -> bool {
        match (self.stop_price(), other.stop_price()) {
            (Some(mine), Some(theirs)) => match self.side {
                Side::Buy => mine > theirs,
                Side::Sell => mine < theirs,
            },
            _ => false,
        }
    }

    /// Whether a stop order's trigger condition holds at `last_trade_price`
    pub fn is_triggered(&self, last_trade_price: Option<Price>) -> bool {
        match (self.kind, last_trade_price) {
            (OrderKind::StopLimit { stop_price }, Some(last)) => match self.side {
                Side::Buy => last >= stop_price,
                Side::Sell => last <= stop_price,
            },
            _ => false,
        }
    }

    /// Quantity increase, price change or larger iceberg peak
    pub fn will_lose_priority(&self, update: &OrderUpdate) -> bool {
        update.quantity > self.quantity
            || update.price != self.price
            || matches!(self.kind, OrderKind::Iceberg { peak_size, .. } if update.peak_size > peak_size)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Consume traded shares.
    ///
    /// # Panics
    /// Panics if `amount` exceeds the tradable quantity.
    pub fn decrease_quantity(&mut self, amount: Quantity) {
        assert!(
            amount <= self.quantity(),
            "order {} cannot trade {} of {}",
            self.id,
            amount,
            self.quantity()
        );
        self.quantity -= amount;
        if self.status != OrderStatus::New {
            if let OrderKind::Iceberg {
                displayed_quantity, ..
            } = &mut self.kind
            {
                *displayed_quantity -= amount;
            }
        }
    }

    /// Refill an exhausted iceberg peak from the hidden quantity
    pub fn replenish(&mut self) {
        if let OrderKind::Iceberg {
            peak_size,
            displayed_quantity,
        } = &mut self.kind
        {
            *displayed_quantity = (*peak_size).min(self.quantity);
        }
    }

    pub(crate) fn mark_queued(&mut self) {
        self.apply_transition(OrderTransition::Queue);
        self.replenish();
    }

    pub(crate) fn mark_new(&mut self) {
        self.apply_transition(OrderTransition::Reset);
    }

    pub(crate) fn mark_done(&mut self) {
        self.apply_transition(OrderTransition::Fill);
    }

    pub(crate) fn begin_update(&mut self) {
        self.apply_transition(OrderTransition::BeginUpdate);
    }

    pub(crate) fn finish_update(&mut self) {
        self.apply_transition(OrderTransition::Queue);
    }

    /// Overwrite quantity, price, peak and stop price from an update request.
    ///
    /// The displayed peak of an iceberg never grows here; it shrinks to fit a
    /// smaller peak or quantity.
    pub fn apply_update(&mut self, update: &OrderUpdate) {
        self.quantity = update.quantity;
        self.price = update.price;
        self.expiry = update.expiry;
        match &mut self.kind {
            OrderKind::Plain => {},
            OrderKind::Iceberg {
                peak_size,
                displayed_quantity,
            } => {
                *peak_size = update.peak_size;
                *displayed_quantity = (*displayed_quantity)
                    .min(update.peak_size)
                    .min(update.quantity);
            },
            OrderKind::StopLimit { stop_price } => {
                *stop_price = update.stop_price;
            },
        }
    }

    pub(crate) fn record_entry_time(&mut self, entry_time: DateTime<Utc>) {
        self.entry_times.push(entry_time);
    }

    /// Turn a triggered stop order into a new plain limit order
    pub(crate) fn activate(&mut self) {
        self.kind = OrderKind::Plain;
        self.mark_new();
    }

    /// Detached copy for rollback
    pub fn snapshot(&self) -> Order {
        let mut copy = self.clone();
        copy.status = OrderStatus::Snapshot;
        copy
    }

    /// Rebuild a live order from a snapshot
    pub(crate) fn restored(snapshot: &Order, status: OrderStatus) -> Order {
        let mut order = snapshot.clone();
        order.status = status;
        order
    }

    fn apply_transition(&mut self, transition: OrderTransition) {
        self.status = match self.status.transition(transition) {
            Ok(status) => status,
            Err(reason) => panic!("order {}: {}", self.id, reason),
        };
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn order(id: u64, side: Side, quantity: Quantity, price: Price) -> Order {
        Order::new(
            OrderId(id),
            Isin::new("ABC"),
            side,
            quantity,
            price,
            BrokerId(1),
            ShareholderId(1),
            Utc::now(),
        )
    }

    pub(crate) fn iceberg(
        id: u64,
        side: Side,
        quantity: Quantity,
        price: Price,
        peak_size: Quantity,
    ) -> Order {
        Order::new_iceberg(
            OrderId(id),
            Isin::new("ABC"),
            side,
            quantity,
            price,
            BrokerId(1),
            ShareholderId(1),
            Utc::now(),
            peak_size,
        )
    }

    fn update(quantity: Quantity, price: Price, peak_size: Quantity) -> OrderUpdate {
        OrderUpdate {
            quantity,
            price,
            peak_size,
            stop_price: 0,
            expiry: None,
            entry_time: Utc::now(),
        }
    }

    #[test]
    fn test_order_creation() {
        let order = order(1, Side::Buy, 304, 15_700);

        assert_eq!(order.quantity(), 304);
        assert_eq!(order.value(), 304 * 15_700);
        assert_eq!(order.status(), OrderStatus::New);
        assert_eq!(order.entry_times().len(), 1);
    }

    #[test]
    fn test_price_priority() {
        let high = order(1, Side::Buy, 10, 200);
        let low = order(2, Side::Buy, 10, 100);
        assert!(high.queues_before(&low));
        assert!(!low.queues_before(&high));
        assert!(!high.queues_before(&high.clone()));

        let cheap = order(3, Side::Sell, 10, 100);
        let dear = order(4, Side::Sell, 10, 200);
        assert!(cheap.queues_before(&dear));
    }

    #[test]
    fn test_crossing() {
        let buy = order(1, Side::Buy, 10, 150);
        assert!(buy.matches(&order(2, Side::Sell, 10, 150)));
        assert!(buy.matches(&order(3, Side::Sell, 10, 100)));
        assert!(!buy.matches(&order(4, Side::Sell, 10, 151)));
    }

    #[test]
    fn test_iceberg_exposes_peak_only_when_queued() {
        let mut order = iceberg(1, Side::Sell, 45, 1_000, 10);
        assert_eq!(order.quantity(), 45);

        order.mark_queued();
        assert_eq!(order.quantity(), 10);
        assert_eq!(order.total_quantity(), 45);

        order.decrease_quantity(10);
        assert_eq!(order.quantity(), 0);
        assert_eq!(order.total_quantity(), 35);

        order.replenish();
        assert_eq!(order.quantity(), 10);
    }

    #[test]
    #[should_panic]
    fn test_overtrade_panics() {
        let mut order = order(1, Side::Buy, 5, 100);
        order.decrease_quantity(6);
    }

    #[test]
    fn test_will_lose_priority() {
        let order = order(1, Side::Buy, 10, 100);
        assert!(!order.will_lose_priority(&update(5, 100, 0)));
        assert!(order.will_lose_priority(&update(11, 100, 0)));
        assert!(order.will_lose_priority(&update(10, 101, 0)));

        let iceberg = iceberg(2, Side::Buy, 50, 100, 10);
        assert!(!iceberg.will_lose_priority(&update(50, 100, 5)));
        assert!(iceberg.will_lose_priority(&update(50, 100, 20)));
    }

    #[test]
    fn test_iceberg_update_shrinks_displayed() {
        let mut order = iceberg(1, Side::Sell, 50, 100, 10);
        order.mark_queued();
        order.apply_update(&update(4, 100, 10));
        assert_eq!(order.displayed_quantity(), Some(4));

        let mut order = iceberg(2, Side::Sell, 50, 100, 10);
        order.mark_queued();
        order.apply_update(&update(50, 100, 3));
        assert_eq!(order.displayed_quantity(), Some(3));
    }

    #[test]
    fn test_stop_trigger() {
        let buy = Order::new_stop_limit(
            OrderId(1),
            Isin::new("ABC"),
            Side::Buy,
            10,
            120,
            BrokerId(1),
            ShareholderId(1),
            Utc::now(),
            110,
        );
        assert!(!buy.is_triggered(None));
        assert!(!buy.is_triggered(Some(109)));
        assert!(buy.is_triggered(Some(110)));

        let sell = Order::new_stop_limit(
            OrderId(2),
            Isin::new("ABC"),
            Side::Sell,
            10,
            90,
            BrokerId(1),
            ShareholderId(1),
            Utc::now(),
            95,
        );
        assert!(sell.is_triggered(Some(95)));
        assert!(!sell.is_triggered(Some(96)));
    }

    #[test]
    fn test_state_transitions() {
        assert_eq!(
            OrderStatus::New.transition(OrderTransition::Queue),
            Ok(OrderStatus::Queued)
        );
        assert_eq!(
            OrderStatus::Queued.transition(OrderTransition::BeginUpdate),
            Ok(OrderStatus::Updating)
        );
        assert!(OrderStatus::Done.transition(OrderTransition::Fill).is_err());
        assert!(OrderStatus::Snapshot
            .transition(OrderTransition::Queue)
            .is_err());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut order = order(1, Side::Sell, 10, 100);
        order.mark_queued();
        let snapshot = order.snapshot();
        order.decrease_quantity(4);

        assert_eq!(snapshot.status(), OrderStatus::Snapshot);
        assert_eq!(snapshot.total_quantity(), 10);
        let restored = Order::restored(&snapshot, OrderStatus::Queued);
        assert_eq!(restored.total_quantity(), 10);
        assert_eq!(restored.status(), OrderStatus::Queued);
    }
}
