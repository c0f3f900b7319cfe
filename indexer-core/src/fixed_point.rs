// 18-decimal fixed-point arithmetic with the same truncation as the launch contract.
use alloy_primitives::{aliases::U512, U256};
use thiserror::Error;

/// 1.0 in 18-decimal fixed point.
pub const ONE: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Wei per gwei. Curve control points are stored on-chain in gwei.
pub const GWEI: U256 = U256::from_limbs([1_000_000_000, 0, 0, 0]);

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MathError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("arithmetic overflow")]
    Overflow,
    #[error("arithmetic underflow")]
    Underflow,
}

fn widen(v: U256) -> U512 {
    U512::from_limbs_slice(v.as_limbs())
}

fn narrow(v: U512) -> Result<U256, MathError> {
    let limbs = v.as_limbs();
    if limbs[4..].iter().any(|&l| l != 0) {
        return Err(MathError::Overflow);
    }
    Ok(U256::from_limbs_slice(&limbs[..4]))
}

pub fn add(a: U256, b: U256) -> Result<U256, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

pub fn sub(a: U256, b: U256) -> Result<U256, MathError> {
    a.checked_sub(b).ok_or(MathError::Underflow)
}

/// `a * b / ONE`, floored. The product is taken at 512 bits.
pub fn mul(a: U256, b: U256) -> Result<U256, MathError> {
    narrow(widen(a) * widen(b) / widen(ONE))
}

/// `a * ONE / b`, floored.
pub fn div(a: U256, b: U256) -> Result<U256, MathError> {
    if b.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    narrow(widen(a) * widen(ONE) / widen(b))
}

/// `a * b * c / ONE / ONE` with a single triple product and two floor divisions.
///
/// This is not `mul(mul(a, b), c)`: flooring after the first product loses
/// precision the contract does not lose.
pub fn mul3(a: U256, b: U256, c: U256) -> Result<U256, MathError> {
    let one = widen(ONE);
    let ab = widen(a) * widen(b);
    let abc = ab.checked_mul(widen(c)).ok_or(MathError::Overflow)?;
    narrow(abc / one / one)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(n: u64) -> U256 {
        U256::from(n) * ONE
    }

    #[test]
    fn test_mul_truncates() {
        assert_eq!(mul(units(3), units(2)).unwrap(), units(6));
        // 1 wei * 1 wei / ONE floors to zero
        assert_eq!(mul(U256::from(1), U256::from(1)).unwrap(), U256::ZERO);
        // 0.5 * 0.5 = 0.25
        let half = ONE / U256::from(2);
        assert_eq!(mul(half, half).unwrap(), ONE / U256::from(4));
    }

    #[test]
    fn test_div_truncates_and_rejects_zero() {
        assert_eq!(div(units(1), units(3)).unwrap(), U256::from(333_333_333_333_333_333u64));
        assert_eq!(div(units(6), units(2)).unwrap(), units(3));
        assert_eq!(div(units(1), U256::ZERO), Err(MathError::DivisionByZero));
    }

    #[test]
    fn test_mul_uses_wide_intermediate() {
        // a * b overflows 256 bits but the scaled result does not
        let a = U256::MAX / U256::from(2);
        assert_eq!(mul(a, ONE).unwrap(), a);
        assert_eq!(mul(U256::MAX, units(2)), Err(MathError::Overflow));
    }

    #[test]
    fn test_add_sub_checked() {
        assert_eq!(add(units(1), units(2)).unwrap(), units(3));
        assert_eq!(add(U256::MAX, U256::from(1)), Err(MathError::Overflow));
        assert_eq!(sub(units(1), units(2)), Err(MathError::Underflow));
        assert_eq!(sub(units(2), units(1)).unwrap(), units(1));
    }

    #[test]
    fn test_mul3_differs_from_nested_mul() {
        let a = U256::from(999_999_999_999_999_999u64);
        let b = U256::from(3u64);
        let c = ONE * U256::from(7);
        let exact = mul3(a, b, c).unwrap();
        let nested = mul(mul(a, b).unwrap(), c).unwrap();
        // nested floors a*b/ONE to 2 before scaling by 7
        assert_eq!(nested, U256::from(14u64));
        assert_eq!(exact, U256::from(20u64));
    }
}
