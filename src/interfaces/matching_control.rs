// ============================================================================
// Matching Control Interface
// Pluggable checks and ledger effects around every matching step
// ============================================================================

use crate::domain::{Ledgers, Order, OrderBook, RejectReason, Trade};
use thiserror::Error;

/// A control's refusal; the matcher stops at the first one
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    #[error("not enough position")]
    NotEnoughPosition,
    #[error("not enough credit")]
    NotEnoughCredit,
    #[error("not enough execution")]
    NotEnoughExecution,
}

pub type ControlResult = Result<(), ControlError>;

impl From<ControlError> for RejectReason {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::NotEnoughPosition => RejectReason::NotEnoughPosition,
            ControlError::NotEnoughCredit => RejectReason::NotEnoughCredit,
            ControlError::NotEnoughExecution => RejectReason::NotEnoughExecution,
        }
    }
}

/// How an order reached the matcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Fresh order entry; the only case with an execution floor
    NewOrder,
    /// Update that lost queue priority and is matched again
    Update,
    /// Stop order whose trigger fired
    Activation,
}

/// Strategy interface for the controls gating book and ledger mutations.
///
/// Checks take shared references and decide; the `on_*` hooks perform the
/// matching ledger effects and cannot fail. A hook and its inverse must cancel
/// out exactly so that a rolled back pass leaves no trace.
pub trait MatchingControl: Send + Sync {
    /// Get the control name for logging
    fn name(&self) -> &str;

    /// Before a new or rematched order starts matching
    fn check_before_matching(
        &self,
        _order: &Order,
        _book: &OrderBook,
        _ledgers: &Ledgers,
    ) -> ControlResult {
        Ok(())
    }

    /// Before a prospective trade is confirmed
    fn check_before_trade(&self, _trade: &Trade, _ledgers: &Ledgers) -> ControlResult {
        Ok(())
    }

    fn on_trade_confirmed(&self, _trade: &Trade, _ledgers: &mut Ledgers) {}

    fn on_trade_rolled_back(&self, _trade: &Trade, _ledgers: &mut Ledgers) {}

    /// After the match loop, before any remainder is queued
    fn check_after_matching(
        &self,
        _order: &Order,
        _trades: &[Trade],
        _entry: EntryKind,
    ) -> ControlResult {
        Ok(())
    }

    /// Before an order takes a place in the book (active or dormant)
    fn check_before_queue(&self, _order: &Order, _ledgers: &Ledgers) -> ControlResult {
        Ok(())
    }

    fn on_queued(&self, _order: &Order, _ledgers: &mut Ledgers) {}

    /// An order left the book without trading
    fn on_dequeued(&self, _order: &Order, _ledgers: &mut Ledgers) {}
}
