// ============================================================================
// Inbound Requests
// ============================================================================

use crate::domain::{BrokerId, Isin, MatchingState, OrderId, OrderUpdate, ShareholderId, Side};
use crate::numeric::{Price, Quantity};
use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RequestKind {
    NewOrder,
    UpdateOrder,
}

/// Order entry or update request.
///
/// Zero means "absent" for `peak_size`, `minimum_execution_quantity` and
/// `stop_price`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EnterOrderRq {
    pub kind: RequestKind,
    pub request_id: u64,
    pub isin: String,
    pub order_id: u64,
    pub entry_time: DateTime<Utc>,
    pub side: Side,
    pub quantity: Quantity,
    pub price: Price,
    pub broker_id: u64,
    pub shareholder_id: u64,
    pub peak_size: Quantity,
    pub minimum_execution_quantity: Quantity,
    pub stop_price: Price,
    pub expiry: Option<DateTime<Utc>>,
}

impl EnterOrderRq {
    #[allow(clippy::too_many_arguments)]
    pub fn new_order(
        request_id: u64,
        isin: impl Into<String>,
        order_id: u64,
        side: Side,
        quantity: Quantity,
        price: Price,
        broker_id: u64,
        shareholder_id: u64,
    ) -> Self {
        Self {
            kind: RequestKind::NewOrder,
            request_id,
            isin: isin.into(),
            order_id,
            entry_time: Utc::now(),
            side,
            quantity,
            price,
            broker_id,
            shareholder_id,
            peak_size: 0,
            minimum_execution_quantity: 0,
            stop_price: 0,
            expiry: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update_order(
        request_id: u64,
        isin: impl Into<String>,
        order_id: u64,
        side: Side,
        quantity: Quantity,
        price: Price,
        broker_id: u64,
        shareholder_id: u64,
    ) -> Self {
        let mut rq = Self::new_order(
            request_id,
            isin,
            order_id,
            side,
            quantity,
            price,
            broker_id,
            shareholder_id,
        );
        rq.kind = RequestKind::UpdateOrder;
        rq
    }

    pub fn with_peak_size(mut self, peak_size: Quantity) -> Self {
        self.peak_size = peak_size;
        self
    }

    pub fn with_minimum_execution_quantity(mut self, quantity: Quantity) -> Self {
        self.minimum_execution_quantity = quantity;
        self
    }

    pub fn with_stop_price(mut self, stop_price: Price) -> Self {
        self.stop_price = stop_price;
        self
    }

    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn with_entry_time(mut self, entry_time: DateTime<Utc>) -> Self {
        self.entry_time = entry_time;
        self
    }

    pub fn isin(&self) -> Isin {
        Isin::new(&self.isin)
    }

    pub fn order_id(&self) -> OrderId {
        OrderId(self.order_id)
    }

    pub fn broker_id(&self) -> BrokerId {
        BrokerId(self.broker_id)
    }

    pub fn shareholder_id(&self) -> ShareholderId {
        ShareholderId(self.shareholder_id)
    }

    pub fn order_update(&self) -> OrderUpdate {
        OrderUpdate {
            quantity: self.quantity,
            price: self.price,
            peak_size: self.peak_size,
            stop_price: self.stop_price,
            expiry: self.expiry,
            entry_time: self.entry_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeleteOrderRq {
    pub request_id: u64,
    pub isin: String,
    pub side: Side,
    pub order_id: u64,
}

impl DeleteOrderRq {
    pub fn new(request_id: u64, isin: impl Into<String>, side: Side, order_id: u64) -> Self {
        Self {
            request_id,
            isin: isin.into(),
            side,
            order_id,
        }
    }

    pub fn order_id(&self) -> OrderId {
        OrderId(self.order_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChangeMatchingStateRq {
    pub isin: String,
    pub target_state: MatchingState,
}

impl ChangeMatchingStateRq {
    pub fn new(isin: impl Into<String>, target_state: MatchingState) -> Self {
        Self {
            isin: isin.into(),
            target_state,
        }
    }
}
