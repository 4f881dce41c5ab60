// ============================================================================
// Domain Models Module
// Contains all core domain entities and value objects
// ============================================================================

pub mod config;
pub mod errors;
pub mod ids;
pub mod ledger;
pub mod order;
pub mod order_book;
pub mod trade;
pub mod validation;

pub use config::{
    BrokerConfig, ExchangeConfig, MatchingState, SecurityConfig, ShareholderConfig,
    ValidationConfig,
};
pub use errors::{ConfigError, RejectReason};
pub use ids::{BrokerId, Isin, OrderId, ShareholderId};
pub use ledger::{Broker, Ledgers, Shareholder};
pub use order::{Order, OrderKind, OrderUpdate, Side};
pub use order_book::{OrderBook, OrderBookSnapshot};
pub use trade::Trade;
pub use validation::{Increments, OrderValidator};

// Re-export state machine
pub use order::state::{OrderStatus, OrderTransition};
