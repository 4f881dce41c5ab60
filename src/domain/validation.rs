//! Order Validator - structural request checks
//!
//! Runs before a request reaches a security's book, so a failure here never
//! needs a rollback. Every failing rule is reported, not only the first one.
//!
//! ## Validation Rules
//! - Order id, quantity and price must be positive
//! - Peak size and minimum execution quantity cannot exceed the quantity
//! - Stop-limit orders cannot be iceberg orders or carry a minimum execution quantity
//! - Expiry must be later than the entry time
//! - Price, quantity and their product must stay within [`ValidationConfig`] bounds
//! - Security, broker and shareholder must be known
//! - Quantity must be a multiple of the lot size, prices of the tick size

use super::config::ValidationConfig;
use super::errors::RejectReason;
use super::ledger::Ledgers;
use crate::interfaces::{DeleteOrderRq, EnterOrderRq};
use crate::numeric::{checked_value, is_multiple_of, Price, Quantity};

/// Price and quantity increments of a security
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Increments {
    pub tick_size: Price,
    pub lot_size: Quantity,
}

#[derive(Debug, Clone, Default)]
pub struct OrderValidator {
    config: ValidationConfig,
}

impl OrderValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Check an enter-order request.
    ///
    /// `increments` is `None` when the ISIN names no known security.
    pub fn validate_enter_order(
        &self,
        rq: &EnterOrderRq,
        increments: Option<Increments>,
        ledgers: &Ledgers,
    ) -> Result<(), Vec<RejectReason>> {
        let mut errors = self.check_fields(rq);

        match increments {
            None => errors.push(RejectReason::UnknownSecurity),
            Some(increments) => errors.extend(Self::check_increments(rq, increments)),
        }
        if !ledgers.has_broker(rq.broker_id()) {
            errors.push(RejectReason::UnknownBroker);
        }
        if !ledgers.has_shareholder(rq.shareholder_id()) {
            errors.push(RejectReason::UnknownShareholder);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn validate_delete_order(
        &self,
        rq: &DeleteOrderRq,
        security_known: bool,
    ) -> Result<(), Vec<RejectReason>> {
        let mut errors = Vec::new();
        if rq.order_id == 0 {
            errors.push(RejectReason::InvalidOrderId);
        }
        if !security_known {
            errors.push(RejectReason::UnknownSecurity);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn check_fields(&self, rq: &EnterOrderRq) -> Vec<RejectReason> {
        let mut errors = Vec::new();

        if rq.order_id == 0 {
            errors.push(RejectReason::InvalidOrderId);
        }
        if rq.quantity == 0 {
            errors.push(RejectReason::NonPositiveQuantity);
        }
        if rq.price == 0 {
            errors.push(RejectReason::NonPositivePrice);
        }
        if rq.peak_size > rq.quantity {
            errors.push(RejectReason::InvalidPeakSize);
        }
        if rq.minimum_execution_quantity > rq.quantity {
            errors.push(RejectReason::InvalidMinimumExecutionQuantity);
        }
        if rq.stop_price > 0 {
            if rq.peak_size > 0 {
                errors.push(RejectReason::StopOrderCannotBeIceberg);
            }
            if rq.minimum_execution_quantity > 0 {
                errors.push(RejectReason::StopOrderCannotHaveMinimumExecution);
            }
            if rq.stop_price > self.config.max_price {
                errors.push(RejectReason::InvalidStopPrice);
            }
        }
        if matches!(rq.expiry, Some(expiry) if expiry <= rq.entry_time) {
            errors.push(RejectReason::InvalidExpiry);
        }
        if rq.price > self.config.max_price
            || rq.quantity > self.config.max_quantity
            || checked_value(rq.price, rq.quantity).is_err()
        {
            errors.push(RejectReason::ValueOverflow);
        }

        errors
    }

    fn check_increments(rq: &EnterOrderRq, increments: Increments) -> Vec<RejectReason> {
        let mut errors = Vec::new();
        // zero increments are rejected when the security is configured
        if !is_multiple_of(rq.quantity, increments.lot_size).unwrap_or(false) {
            errors.push(RejectReason::QuantityNotMultipleOfLotSize);
        }
        if !is_multiple_of(rq.price, increments.tick_size).unwrap_or(false) {
            errors.push(RejectReason::PriceNotMultipleOfTickSize);
        }
        if rq.stop_price > 0 && !is_multiple_of(rq.stop_price, increments.tick_size).unwrap_or(false)
        {
            errors.push(RejectReason::InvalidStopPrice);
        }
        errors
    }
}
