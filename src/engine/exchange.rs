// ============================================================================
// Exchange
// Request handling service over every configured security
// ============================================================================

use super::expiry::ExpiryQueue;
use super::security::{Activation, EnterOutcome, Security, StateChange};
use crate::domain::{
    BrokerId, Isin, Ledgers, MatchingState, OrderBookSnapshot, OrderId, OrderValidator,
    RejectReason, ShareholderId,
};
use crate::interfaces::{
    ChangeMatchingStateRq, DeleteOrderRq, EnterOrderRq, EventHandler, OrderEvent, RequestKind,
};
use crate::numeric::{Credit, Quantity};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Entry point for order requests.
///
/// Every security sits behind its own mutex, so requests for different
/// securities run in parallel while each book sees one request at a time.
/// Lock order is security, then ledgers, then the expiry queue. Events are
/// published after every lock is released.
pub struct Exchange {
    securities: HashMap<Isin, Mutex<Security>>,
    ledgers: Mutex<Ledgers>,
    expiry: Mutex<ExpiryQueue>,
    validator: OrderValidator,
    event_handler: Arc<dyn EventHandler>,
}

impl Exchange {
    pub fn new(
        securities: Vec<Security>,
        ledgers: Ledgers,
        validator: OrderValidator,
        event_handler: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            securities: securities
                .into_iter()
                .map(|security| (security.isin().clone(), Mutex::new(security)))
                .collect(),
            ledgers: Mutex::new(ledgers),
            expiry: Mutex::new(ExpiryQueue::new()),
            validator,
            event_handler,
        }
    }

    // ========================================================================
    // Request Handling
    // ========================================================================

    /// Enter a new order or update a queued one
    pub fn handle_enter_order(&self, rq: EnterOrderRq) -> Vec<OrderEvent> {
        let events = self.enter_order(&rq).unwrap_or_else(|reasons| {
            tracing::warn!(
                "Enter request {} for order {} rejected: {:?}",
                rq.request_id,
                rq.order_id,
                reasons
            );
            vec![rejected(rq.request_id, rq.order_id(), reasons)]
        });
        self.publish(&events);
        events
    }

    fn enter_order(&self, rq: &EnterOrderRq) -> Result<Vec<OrderEvent>, Vec<RejectReason>> {
        let Some(security) = self.securities.get(&rq.isin()) else {
            let ledgers = self.ledgers.lock();
            self.validator.validate_enter_order(rq, None, &ledgers)?;
            return Err(vec![RejectReason::UnknownSecurity]);
        };

        let mut security = security.lock();
        let mut ledgers = self.ledgers.lock();
        self.validator
            .validate_enter_order(rq, Some(security.increments()), &ledgers)?;

        let outcome = match rq.kind {
            RequestKind::NewOrder => security.add_order(rq, &mut ledgers),
            RequestKind::UpdateOrder => security.update_order(rq, &mut ledgers),
        }
        .map_err(|reason| vec![reason])?;
        drop(ledgers);

        let now = Utc::now();
        let mut events = vec![match rq.kind {
            RequestKind::NewOrder => OrderEvent::OrderAccepted {
                request_id: rq.request_id,
                order_id: rq.order_id(),
                timestamp: now,
            },
            RequestKind::UpdateOrder => OrderEvent::OrderUpdated {
                request_id: rq.request_id,
                order_id: rq.order_id(),
                timestamp: now,
            },
        }];
        events.extend(enter_events(rq, outcome, now));
        if security.state() == MatchingState::Auction {
            events.push(opening_price_event(&security, now));
        }

        if let Some(expiry) = rq.expiry {
            self.expiry
                .lock()
                .schedule(expiry, security.isin().clone(), rq.side, rq.order_id());
        }
        Ok(events)
    }

    pub fn handle_delete_order(&self, rq: DeleteOrderRq) -> Vec<OrderEvent> {
        let events = self.delete_order(&rq).unwrap_or_else(|reasons| {
            tracing::warn!(
                "Delete request {} for order {} rejected: {:?}",
                rq.request_id,
                rq.order_id,
                reasons
            );
            vec![rejected(rq.request_id, rq.order_id(), reasons)]
        });
        self.publish(&events);
        events
    }

    fn delete_order(&self, rq: &DeleteOrderRq) -> Result<Vec<OrderEvent>, Vec<RejectReason>> {
        let security = self.securities.get(&Isin::new(&rq.isin));
        self.validator
            .validate_delete_order(rq, security.is_some())?;
        let Some(security) = security else {
            return Err(vec![RejectReason::UnknownSecurity]);
        };

        let mut security = security.lock();
        let mut ledgers = self.ledgers.lock();
        security
            .delete_order(rq.side, rq.order_id(), &mut ledgers)
            .map_err(|reason| vec![reason])?;
        drop(ledgers);

        let now = Utc::now();
        let mut events = vec![OrderEvent::OrderDeleted {
            request_id: rq.request_id,
            order_id: rq.order_id(),
            timestamp: now,
        }];
        if security.state() == MatchingState::Auction {
            events.push(opening_price_event(&security, now));
        }
        Ok(events)
    }

    pub fn handle_change_matching_state(&self, rq: ChangeMatchingStateRq) -> Vec<OrderEvent> {
        let Some(security) = self.securities.get(&Isin::new(&rq.isin)) else {
            tracing::warn!("Matching state change for unknown security {}", rq.isin);
            return Vec::new();
        };

        let mut security = security.lock();
        let mut ledgers = self.ledgers.lock();
        let change = security.change_matching_state(rq.target_state, &mut ledgers);
        drop(ledgers);

        let events = state_change_events(&security, change, Utc::now());
        drop(security);

        self.publish(&events);
        events
    }

    /// Remove every order whose expiry is at or before `now`
    pub fn expire_orders(&self, now: DateTime<Utc>) -> Vec<OrderEvent> {
        let due = self.expiry.lock().pop_due(now);
        let mut events = Vec::new();

        for entry in due {
            let Some(security) = self.securities.get(&entry.isin) else {
                continue;
            };
            let mut security = security.lock();
            let mut ledgers = self.ledgers.lock();
            let Some(order) = security.expire(entry.side, entry.order_id, now, &mut ledgers) else {
                continue;
            };
            drop(ledgers);

            events.push(OrderEvent::OrderExpired {
                isin: order.isin.clone(),
                side: order.side,
                order_id: order.id,
                timestamp: now,
            });
            if security.state() == MatchingState::Auction {
                events.push(opening_price_event(&security, now));
            }
        }

        self.publish(&events);
        events
    }

    fn publish(&self, events: &[OrderEvent]) {
        if !events.is_empty() {
            self.event_handler.on_events(events.to_vec());
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Run `f` against a security while holding its lock
    pub fn with_security<R>(&self, isin: &str, f: impl FnOnce(&Security) -> R) -> Option<R> {
        self.securities
            .get(&Isin::new(isin))
            .map(|security| f(&security.lock()))
    }

    pub fn broker_credit(&self, id: BrokerId) -> Option<Credit> {
        self.ledgers.lock().broker(id).map(|broker| broker.credit())
    }

    pub fn shareholder_position(&self, id: ShareholderId, isin: &str) -> Option<Quantity> {
        self.ledgers
            .lock()
            .shareholder(id)
            .map(|shareholder| shareholder.position(&Isin::new(isin)))
    }

    pub fn total_credit(&self) -> Credit {
        self.ledgers.lock().total_credit()
    }

    pub fn snapshot(&self, isin: &str, depth: usize) -> Option<OrderBookSnapshot> {
        self.with_security(isin, |security| {
            security.order_book().snapshot(security.isin(), depth)
        })
    }

    pub fn isins(&self) -> Vec<Isin> {
        let mut isins: Vec<Isin> = self.securities.keys().cloned().collect();
        isins.sort();
        isins
    }

    pub fn pending_expiries(&self) -> usize {
        self.expiry.lock().len()
    }
}

// ============================================================================
// Event Construction
// ============================================================================

fn rejected(request_id: u64, order_id: OrderId, reasons: Vec<RejectReason>) -> OrderEvent {
    OrderEvent::OrderRejected {
        request_id,
        order_id,
        reasons,
        timestamp: Utc::now(),
    }
}

fn enter_events(rq: &EnterOrderRq, outcome: EnterOutcome, now: DateTime<Utc>) -> Vec<OrderEvent> {
    let mut events = Vec::new();
    if !outcome.result.trades.is_empty() {
        events.push(OrderEvent::OrderExecuted {
            request_id: rq.request_id,
            order_id: rq.order_id(),
            trades: outcome.result.trades,
            timestamp: now,
        });
    }
    events.extend(activation_events(outcome.activations, now));
    events
}

fn activation_events(activations: Vec<Activation>, now: DateTime<Utc>) -> Vec<OrderEvent> {
    let mut events = Vec::new();
    for activation in activations {
        events.push(OrderEvent::OrderActivated {
            request_id: activation.request_id,
            order_id: activation.order_id,
            timestamp: now,
        });
        if let Some(reason) = activation.result.outcome.reject_reason() {
            events.push(rejected(
                activation.request_id,
                activation.order_id,
                vec![reason],
            ));
        } else if !activation.result.trades.is_empty() {
            events.push(OrderEvent::OrderExecuted {
                request_id: activation.request_id,
                order_id: activation.order_id,
                trades: activation.result.trades,
                timestamp: now,
            });
        }
    }
    events
}

fn state_change_events(
    security: &Security,
    change: StateChange,
    now: DateTime<Utc>,
) -> Vec<OrderEvent> {
    let isin = security.isin().clone();
    let mut events = Vec::new();
    if let Some(auction) = change.auction {
        events.push(OrderEvent::AuctionCleared {
            isin: isin.clone(),
            opening_price: auction.opening_price.map(|opening| opening.price),
            trades: auction.trades,
            timestamp: now,
        });
    }
    events.extend(activation_events(change.activations, now));
    events.push(OrderEvent::MatchingStateChanged {
        isin,
        state: change.current,
        timestamp: now,
    });
    if change.current == MatchingState::Auction {
        events.push(opening_price_event(security, now));
    }
    events
}

fn opening_price_event(security: &Security, now: DateTime<Utc>) -> OrderEvent {
    let opening = security.opening_price();
    OrderEvent::OpeningPriceUpdated {
        isin: security.isin().clone(),
        opening_price: opening.map(|opening| opening.price),
        tradable_quantity: opening.map_or(0, |opening| opening.tradable_quantity),
        timestamp: now,
    }
}

// ============================================================================
// Expiry Timer
// ============================================================================

/// Expire due orders every `period` on the current tokio runtime
#[cfg(feature = "async")]
pub fn spawn_expiry_timer(
    exchange: Arc<Exchange>,
    period: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let expired = exchange.expire_orders(Utc::now());
            if !expired.is_empty() {
                tracing::debug!("Expiry timer produced {} events", expired.len());
            }
        }
    })
}
