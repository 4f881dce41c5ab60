// ============================================================================
// Event Handler Interface
// Defines the contract for publishing order and trade events
// ============================================================================

use crate::domain::{Isin, MatchingState, OrderId, RejectReason, Side, Trade};
use crate::numeric::{Price, Quantity};
use chrono::{DateTime, Utc};
use crossbeam::channel::Sender;
use parking_lot::Mutex;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Events emitted by the exchange once a request's mutations are final
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OrderEvent {
    /// New order accepted
    OrderAccepted {
        request_id: u64,
        order_id: OrderId,
        timestamp: DateTime<Utc>,
    },

    /// Update applied
    OrderUpdated {
        request_id: u64,
        order_id: OrderId,
        timestamp: DateTime<Utc>,
    },

    /// Order removed on request
    OrderDeleted {
        request_id: u64,
        order_id: OrderId,
        timestamp: DateTime<Utc>,
    },

    /// Request rejected with every applicable reason
    OrderRejected {
        request_id: u64,
        order_id: OrderId,
        reasons: Vec<RejectReason>,
        timestamp: DateTime<Utc>,
    },

    /// Stop order triggered and turned live
    OrderActivated {
        request_id: u64,
        order_id: OrderId,
        timestamp: DateTime<Utc>,
    },

    /// Order traded on entry, update or activation
    OrderExecuted {
        request_id: u64,
        order_id: OrderId,
        trades: Vec<Trade>,
        timestamp: DateTime<Utc>,
    },

    /// Order removed at its expiry time
    OrderExpired {
        isin: Isin,
        side: Side,
        order_id: OrderId,
        timestamp: DateTime<Utc>,
    },

    /// Indicative opening price after an auction-mode book change
    OpeningPriceUpdated {
        isin: Isin,
        opening_price: Option<Price>,
        tradable_quantity: Quantity,
        timestamp: DateTime<Utc>,
    },

    /// Auction call executed
    AuctionCleared {
        isin: Isin,
        opening_price: Option<Price>,
        trades: Vec<Trade>,
        timestamp: DateTime<Utc>,
    },

    MatchingStateChanged {
        isin: Isin,
        state: MatchingState,
        timestamp: DateTime<Utc>,
    },
}

/// Event handler trait for publishing exchange events
/// Implementations can handle logging, metrics, notifications, etc.
pub trait EventHandler: Send + Sync {
    /// Handle an order event
    fn on_event(&self, event: OrderEvent);

    /// Batch event handler (optional optimization)
    fn on_events(&self, events: Vec<OrderEvent>) {
        for event in events {
            self.on_event(event);
        }
    }
}

/// No-op event handler for testing
pub struct NoOpEventHandler;

impl EventHandler for NoOpEventHandler {
    fn on_event(&self, _event: OrderEvent) {
        // Do nothing
    }
}

/// Logging event handler
pub struct LoggingEventHandler;

impl EventHandler for LoggingEventHandler {
    fn on_event(&self, event: OrderEvent) {
        tracing::debug!("Exchange event: {:?}", event);
    }
}

/// Keeps every published event in memory
#[derive(Default)]
pub struct RecordingEventHandler {
    events: Mutex<Vec<OrderEvent>>,
}

impl RecordingEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OrderEvent> {
        self.events.lock().clone()
    }

    /// Drain the recorded events
    pub fn take(&self) -> Vec<OrderEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventHandler for RecordingEventHandler {
    fn on_event(&self, event: OrderEvent) {
        self.events.lock().push(event);
    }

    fn on_events(&self, events: Vec<OrderEvent>) {
        self.events.lock().extend(events);
    }
}

/// Forwards events to an external publisher over a channel.
///
/// Publishing never blocks the exchange: events are dropped with a warning
/// once the receiving side is gone.
pub struct ChannelEventHandler {
    sender: Sender<OrderEvent>,
}

impl ChannelEventHandler {
    pub fn new(sender: Sender<OrderEvent>) -> Self {
        Self { sender }
    }
}

impl EventHandler for ChannelEventHandler {
    fn on_event(&self, event: OrderEvent) {
        if self.sender.send(event).is_err() {
            tracing::warn!("Event receiver disconnected, dropping event");
        }
    }
}
