// ============================================================================
// Ledgers
// Broker credit and shareholder positions
// ============================================================================

use super::ids::{BrokerId, Isin, ShareholderId};
use crate::numeric::{Credit, Quantity};
use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A broker and its cash credit.
///
/// Invariant: credit never goes below zero.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Broker {
    pub id: BrokerId,
    credit: Credit,
}

impl Broker {
    pub fn new(id: BrokerId, credit: Credit) -> Self {
        Self { id, credit }
    }

    pub fn credit(&self) -> Credit {
        self.credit
    }

    pub fn has_enough_credit(&self, amount: Credit) -> bool {
        self.credit >= amount
    }

    pub fn increase_credit(&mut self, amount: Credit) {
        self.credit = self
            .credit
            .checked_add(amount)
            .unwrap_or_else(|| panic!("broker {} credit overflow", self.id));
    }

    /// # Panics
    /// Panics if `amount` exceeds the available credit. Callers check with
    /// [`Broker::has_enough_credit`] first.
    pub fn decrease_credit(&mut self, amount: Credit) {
        assert!(
            self.has_enough_credit(amount),
            "broker {} credit {} cannot cover {}",
            self.id,
            self.credit,
            amount
        );
        self.credit -= amount;
    }
}

/// A shareholder and its per-security positions.
///
/// Invariant: no position goes below zero.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Shareholder {
    pub id: ShareholderId,
    positions: HashMap<Isin, Quantity>,
}

impl Shareholder {
    pub fn new(id: ShareholderId) -> Self {
        Self {
            id,
            positions: HashMap::new(),
        }
    }

    pub fn with_position(mut self, isin: Isin, quantity: Quantity) -> Self {
        self.positions.insert(isin, quantity);
        self
    }

    pub fn position(&self, isin: &Isin) -> Quantity {
        self.positions.get(isin).copied().unwrap_or(0)
    }

    pub fn has_enough_position(&self, isin: &Isin, quantity: Quantity) -> bool {
        self.position(isin) >= quantity
    }

    pub fn increase_position(&mut self, isin: &Isin, quantity: Quantity) {
        *self.positions.entry(isin.clone()).or_insert(0) += quantity;
    }

    /// # Panics
    /// Panics if the position would go negative.
    pub fn decrease_position(&mut self, isin: &Isin, quantity: Quantity) {
        let id = self.id;
        let position = self.positions.entry(isin.clone()).or_insert(0);
        assert!(
            *position >= quantity,
            "shareholder {} position {} on {} cannot cover {}",
            id,
            position,
            isin,
            quantity
        );
        *position -= quantity;
    }
}

/// Key-to-entity stores for brokers and shareholders.
///
/// Orders refer to their owners by id; every credit or position mutation goes
/// through here.
#[derive(Debug, Clone, Default)]
pub struct Ledgers {
    brokers: HashMap<BrokerId, Broker>,
    shareholders: HashMap<ShareholderId, Shareholder>,
}

impl Ledgers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_broker(&mut self, broker: Broker) {
        self.brokers.insert(broker.id, broker);
    }

    pub fn add_shareholder(&mut self, shareholder: Shareholder) {
        self.shareholders.insert(shareholder.id, shareholder);
    }

    pub fn broker(&self, id: BrokerId) -> Option<&Broker> {
        self.brokers.get(&id)
    }

    pub fn shareholder(&self, id: ShareholderId) -> Option<&Shareholder> {
        self.shareholders.get(&id)
    }

    pub fn has_broker(&self, id: BrokerId) -> bool {
        self.brokers.contains_key(&id)
    }

    pub fn has_shareholder(&self, id: ShareholderId) -> bool {
        self.shareholders.contains_key(&id)
    }

    /// Credit of a known broker, zero for an unknown one
    pub fn credit(&self, id: BrokerId) -> Credit {
        self.broker(id).map(Broker::credit).unwrap_or(0)
    }

    pub fn position(&self, id: ShareholderId, isin: &Isin) -> Quantity {
        self.shareholder(id)
            .map(|shareholder| shareholder.position(isin))
            .unwrap_or(0)
    }

    /// Sum of all broker credit; constant across any sequence without trades
    pub fn total_credit(&self) -> Credit {
        self.brokers.values().map(Broker::credit).sum()
    }

    /// Mutable access to a broker the request handling already resolved.
    ///
    /// # Panics
    /// Panics if the broker is unknown.
    pub(crate) fn broker_mut(&mut self, id: BrokerId) -> &mut Broker {
        self.brokers
            .get_mut(&id)
            .unwrap_or_else(|| panic!("unknown broker {}", id))
    }

    /// # Panics
    /// Panics if the shareholder is unknown.
    pub(crate) fn shareholder_mut(&mut self, id: ShareholderId) -> &mut Shareholder {
        self.shareholders
            .get_mut(&id)
            .unwrap_or_else(|| panic!("unknown shareholder {}", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_credit() {
        let mut broker = Broker::new(BrokerId(1), 100);
        assert!(broker.has_enough_credit(100));
        assert!(!broker.has_enough_credit(101));

        broker.decrease_credit(40);
        broker.increase_credit(15);
        assert_eq!(broker.credit(), 75);
    }

    #[test]
    #[should_panic]
    fn test_broker_credit_cannot_go_negative() {
        let mut broker = Broker::new(BrokerId(1), 10);
        broker.decrease_credit(11);
    }

    #[test]
    fn test_shareholder_positions() {
        let isin = Isin::new("ABC");
        let mut shareholder = Shareholder::new(ShareholderId(1)).with_position(isin.clone(), 50);

        shareholder.decrease_position(&isin, 20);
        shareholder.increase_position(&Isin::new("XYZ"), 5);

        assert_eq!(shareholder.position(&isin), 30);
        assert_eq!(shareholder.position(&Isin::new("XYZ")), 5);
        assert!(shareholder.has_enough_position(&isin, 30));
        assert!(!shareholder.has_enough_position(&isin, 31));
    }

    #[test]
    #[should_panic]
    fn test_position_cannot_go_negative() {
        let mut shareholder = Shareholder::new(ShareholderId(1));
        shareholder.decrease_position(&Isin::new("ABC"), 1);
    }

    #[test]
    fn test_ledgers_lookup() {
        let mut ledgers = Ledgers::new();
        ledgers.add_broker(Broker::new(BrokerId(1), 500));
        ledgers.add_broker(Broker::new(BrokerId(2), 250));
        ledgers.add_shareholder(Shareholder::new(ShareholderId(7)));

        assert!(ledgers.has_broker(BrokerId(1)));
        assert!(!ledgers.has_broker(BrokerId(3)));
        assert!(ledgers.has_shareholder(ShareholderId(7)));
        assert_eq!(ledgers.credit(BrokerId(2)), 250);
        assert_eq!(ledgers.total_credit(), 750);
    }
}
