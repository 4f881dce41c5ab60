//! Rejection reasons and configuration errors

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Why a request was turned down.
///
/// Structural reasons are found before anything is mutated; the matching
/// reasons (`NotEnough*`) are reported after the request's effects were
/// rolled back.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RejectReason {
    #[error("Unknown security ISIN")]
    UnknownSecurity,

    #[error("Unknown broker ID")]
    UnknownBroker,

    #[error("Unknown shareholder ID")]
    UnknownShareholder,

    #[error("Invalid order ID")]
    InvalidOrderId,

    #[error("Order ID not found in the order book")]
    OrderIdNotFound,

    #[error("Order ID already exists on this side of the book")]
    DuplicateOrderId,

    #[error("Order quantity is not positive")]
    NonPositiveQuantity,

    #[error("Order price is not positive")]
    NonPositivePrice,

    #[error("Iceberg order peak size is out of range")]
    InvalidPeakSize,

    #[error("Cannot specify peak size for a non-iceberg order")]
    PeakSizeForNonIceberg,

    #[error("Minimum execution quantity is out of range")]
    InvalidMinimumExecutionQuantity,

    #[error("Cannot change minimum execution quantity of an order")]
    CannotChangeMinimumExecutionQuantity,

    #[error("Cannot specify minimum execution quantity during an auction")]
    MinimumExecutionQuantityInAuction,

    #[error("Quantity is not a multiple of security lot size")]
    QuantityNotMultipleOfLotSize,

    #[error("Price is not a multiple of security tick size")]
    PriceNotMultipleOfTickSize,

    #[error("Buyer has not enough credit")]
    NotEnoughCredit,

    #[error("Seller has not enough positions")]
    NotEnoughPosition,

    #[error("Order did not reach its minimum execution quantity")]
    NotEnoughExecution,

    #[error("Stop price is out of range")]
    InvalidStopPrice,

    #[error("Stop-limit orders cannot be iceberg orders")]
    StopOrderCannotBeIceberg,

    #[error("Stop-limit orders cannot have a minimum execution quantity")]
    StopOrderCannotHaveMinimumExecution,

    #[error("Cannot specify a stop price for an active order")]
    StopPriceForActiveOrder,

    #[error("Stop-limit orders are not accepted during an auction")]
    StopOrderInAuction,

    #[error("Expiry must be after the entry time")]
    InvalidExpiry,

    #[error("Order value exceeds the representable range")]
    ValueOverflow,
}

/// Invalid exchange or security configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("ISIN cannot be empty")]
    EmptyIsin,

    #[error("Tick size of {isin} must be positive")]
    ZeroTickSize { isin: String },

    #[error("Lot size of {isin} must be positive")]
    ZeroLotSize { isin: String },

    #[error("Duplicate security {isin}")]
    DuplicateSecurity { isin: String },

    #[error("Duplicate broker {id}")]
    DuplicateBroker { id: u64 },

    #[error("Duplicate shareholder {id}")]
    DuplicateShareholder { id: u64 },

    #[error("Invalid configuration document: {message}")]
    Parse { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_reason_display() {
        assert_eq!(
            RejectReason::NotEnoughCredit.to_string(),
            "Buyer has not enough credit"
        );
        assert_eq!(
            RejectReason::StopOrderInAuction.to_string(),
            "Stop-limit orders are not accepted during an auction"
        );
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::ZeroLotSize {
            isin: "ABC".to_string(),
        };
        assert_eq!(err.to_string(), "Lot size of ABC must be positive");
    }
}
