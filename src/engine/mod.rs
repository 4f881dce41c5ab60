// ============================================================================
// Engine Module
// Contains the matching business logic and the request handling service
// ============================================================================

mod auction;
mod controls;
mod exchange;
mod expiry;
mod matcher;
mod security;

pub mod factory;

pub use auction::{find_opening_price, tradable_quantity, OpeningPrice};
pub use controls::{ControlChain, CreditControl, ExecutionControl, PositionControl};
#[cfg(feature = "async")]
pub use exchange::spawn_expiry_timer;
pub use exchange::Exchange;
pub use expiry::{ExpiryEntry, ExpiryQueue};
pub use factory::{create_from_config, ExchangeBuilder};
pub use matcher::{AuctionResult, MatchResult, Matcher, MatchingOutcome};
pub use security::{Activation, EnterOutcome, Security, StateChange};
