// ============================================================================
// Numeric Module
// Integer price/quantity/credit arithmetic for the matching core
// ============================================================================
//
// Prices and quantities are whole numbers of ticks and shares. A value is
// always `price * quantity`, so the only arithmetic hazard is overflow of that
// product; request validation rejects orders whose value cannot be
// represented and the core multiplies freely afterwards.

mod errors;

pub use errors::{NumericError, NumericResult};

/// Limit price, in currency units
pub type Price = u64;

/// Number of shares
pub type Quantity = u64;

/// Broker cash credit, in currency units
pub type Credit = u64;

/// Value of `quantity` shares at `price`.
#[inline]
pub fn value_of(price: Price, quantity: Quantity) -> Credit {
    price * quantity
}

/// Value of `quantity` shares at `price`, failing instead of overflowing.
#[inline]
pub fn checked_value(price: Price, quantity: Quantity) -> NumericResult<Credit> {
    price.checked_mul(quantity).ok_or(NumericError::Overflow)
}

/// Whether `value` is a whole multiple of `step`.
///
/// # Errors
/// Returns `DivisionByZero` when `step` is zero.
#[inline]
pub fn is_multiple_of(value: u64, step: u64) -> NumericResult<bool> {
    if step == 0 {
        return Err(NumericError::DivisionByZero);
    }
    Ok(value % step == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_of() {
        assert_eq!(value_of(15_800, 304), 4_803_200);
        assert_eq!(value_of(0, 10), 0);
    }

    #[test]
    fn test_checked_value_overflow() {
        assert_eq!(checked_value(u64::MAX, 2), Err(NumericError::Overflow));
        assert_eq!(checked_value(1_000, 3), Ok(3_000));
    }

    #[test]
    fn test_is_multiple_of() {
        assert_eq!(is_multiple_of(300, 100), Ok(true));
        assert_eq!(is_multiple_of(301, 100), Ok(false));
        assert_eq!(is_multiple_of(5, 0), Err(NumericError::DivisionByZero));
    }
}
