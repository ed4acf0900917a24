//! # Share Math
//!
//! `mul_div` with a 256-bit intermediate. Share and value amounts are `u128`
//! at 18 decimals, so `a * b` routinely exceeds `u128::MAX` long before the
//! quotient does. Widening to 256 bits keeps `a * b / c` exact.
//!
//! Rounding is explicit at every call site. Deposits and withdrawals both
//! floor, which leaves the remainder with the pool.

use thiserror::Error;
use uint::construct_uint;

construct_uint! {
    /// 256-bit unsigned integer for intermediate products.
    pub struct U256(4);
}

/// Arithmetic failures. Wrapping is never an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MathError {
    #[error("arithmetic overflow")]
    Overflow,

    #[error("division by zero")]
    DivisionByZero,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Rounding {
    Floor,
    Ceiling,
}

/// Computes `value * numerator / denominator` without intermediate overflow.
///
/// # Errors
///
/// [`MathError::DivisionByZero`] when `denominator == 0`, and
/// [`MathError::Overflow`] when the quotient does not fit in `u128`.
pub fn mul_div(
    value: u128,
    numerator: u128,
    denominator: u128,
    rounding: Rounding,
) -> Result<u128, MathError> {
    if denominator == 0 {
        return Err(MathError::DivisionByZero);
    }

    let product = U256::from(value)
        .checked_mul(U256::from(numerator))
        .ok_or(MathError::Overflow)?;
    let denom = U256::from(denominator);

    let result = match rounding {
        Rounding::Floor => product / denom,
        Rounding::Ceiling => {
            let (quotient, remainder) = product.div_mod(denom);
            if remainder.is_zero() {
                quotient
            } else {
                quotient
                    .checked_add(U256::one())
                    .ok_or(MathError::Overflow)?
            }
        }
    };

    if result > U256::from(u128::MAX) {
        return Err(MathError::Overflow);
    }
    Ok(result.low_u128())
}

/// Floor `mul_div`, the rounding every vault path uses.
pub fn mul_div_down(value: u128, numerator: u128, denominator: u128) -> Result<u128, MathError> {
    mul_div(value, numerator, denominator, Rounding::Floor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div_floor() {
        assert_eq!(mul_div(100, 3, 2, Rounding::Floor).unwrap(), 150);
        assert_eq!(mul_div(100, 1, 3, Rounding::Floor).unwrap(), 33);
    }

    #[test]
    fn test_mul_div_ceiling() {
        assert_eq!(mul_div(100, 3, 2, Rounding::Ceiling).unwrap(), 150);
        assert_eq!(mul_div(100, 1, 3, Rounding::Ceiling).unwrap(), 34);
    }

    #[test]
    fn test_intermediate_product_wider_than_u128() {
        // (2^127) * 4 / 8 = 2^126. The product alone overflows u128.
        let big = 1u128 << 127;
        assert_eq!(mul_div_down(big, 4, 8).unwrap(), 1u128 << 126);
    }

    #[test]
    fn test_result_overflow_rejected() {
        assert_eq!(mul_div_down(u128::MAX, 2, 1), Err(MathError::Overflow));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(mul_div_down(100, 100, 0), Err(MathError::DivisionByZero));
    }

    #[test]
    fn test_eighteen_decimal_values() {
        // 1,000 USD deposit into a vault with 10,000 shares over 20,000 USD.
        let value = 1_000 * 10u128.pow(18);
        let supply = 10_000 * 10u128.pow(18);
        let total = 20_000 * 10u128.pow(18);
        assert_eq!(mul_div_down(value, supply, total).unwrap(), 500 * 10u128.pow(18));
    }
}
