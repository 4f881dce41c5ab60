// ============================================================================
// Tiny Exchange Library
// Order matching with continuous trading, call auctions and atomic rollback
// ============================================================================

//! # Tiny Exchange
//!
//! An in-memory order matching engine for securities traded by brokers on
//! behalf of shareholders.
//!
//! ## Features
//!
//! - **Price-time priority** order books with plain, iceberg and stop-limit orders
//! - **Continuous matching** at the resting order's price
//! - **Call auctions** clearing at the price that maximizes executed quantity
//! - **Credit reservation**: queued buy orders hold their full value
//! - **All-or-nothing passes**: a failing credit, position or minimum
//!   execution check rolls back every trade of the pass
//! - **Stop-order activation chains** driven by the last trade price
//!
//! ## Example
//!
//! ```rust
//! use tiny_exchange::prelude::*;
//! use std::sync::Arc;
//!
//! let exchange = ExchangeBuilder::new()
//!     .with_security(SecurityConfig::new("IRO1ABC"))
//!     .with_broker(1, 1_000_000)
//!     .with_broker(2, 0)
//!     .with_shareholder(1, &[])
//!     .with_shareholder(2, &[("IRO1ABC", 500)])
//!     .with_event_handler(Arc::new(LoggingEventHandler))
//!     .build()
//!     .unwrap();
//!
//! // Seller offers 100 shares at 15_000
//! exchange.handle_enter_order(EnterOrderRq::new_order(1, "IRO1ABC", 1, Side::Sell, 100, 15_000, 2, 2));
//!
//! // Buyer takes 60 of them
//! let events = exchange.handle_enter_order(EnterOrderRq::new_order(2, "IRO1ABC", 2, Side::Buy, 60, 15_000, 1, 1));
//! assert!(events.iter().any(|event| matches!(event, OrderEvent::OrderExecuted { .. })));
//!
//! let snapshot = exchange.snapshot("IRO1ABC", 5).unwrap();
//! assert_eq!(snapshot.asks, vec![(15_000, 40)]);
//! assert_eq!(exchange.broker_credit(BrokerId(2)), Some(900_000));
//! ```

pub mod domain;
pub mod engine;
pub mod interfaces;
pub mod numeric;

// Re-exports for convenience
pub mod prelude {
    pub use crate::domain::order::state::{OrderStatus, OrderTransition};
    pub use crate::domain::{
        Broker, BrokerConfig, BrokerId, ExchangeConfig, Isin, Ledgers, MatchingState, Order,
        OrderBook, OrderBookSnapshot, OrderId, OrderKind, RejectReason, SecurityConfig,
        Shareholder, ShareholderConfig, ShareholderId, Side, Trade, ValidationConfig,
    };
    #[cfg(feature = "async")]
    pub use crate::engine::spawn_expiry_timer;
    pub use crate::engine::{
        create_from_config, ControlChain, Exchange, ExchangeBuilder, MatchingOutcome,
        OpeningPrice, Security,
    };
    pub use crate::interfaces::{
        ChangeMatchingStateRq, ChannelEventHandler, DeleteOrderRq, EnterOrderRq, EventHandler,
        LoggingEventHandler, MatchingControl, NoOpEventHandler, OrderEvent, RecordingEventHandler,
    };
    pub use crate::numeric::{Credit, Price, Quantity};
}
