// src/math.rs
//! Fixed-point decimal arithmetic used for every ratio and reward share.
//!
//! Values are stored as a big integer scaled by 10^18. Multiplication and
//! division truncate toward zero at the 18th fractional digit so results are
//! identical on every node.

use num_bigint::{BigInt, Sign};
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive, Zero};
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};
use std::str::FromStr;
use thiserror::Error;

/// Number of fractional decimal digits.
pub const PRECISION: u32 = 18;

static PRECISION_MULTIPLIER: Lazy<BigInt> = Lazy::new(|| BigInt::from(10u8).pow(PRECISION));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecError {
    #[error("empty decimal string")]
    Empty,

    #[error("invalid decimal string: {0}")]
    Invalid(String),

    #[error("too many fractional digits ({0}), max is 18")]
    TooPrecise(usize),
}

/// Signed decimal with 18 digits of precision.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dec(BigInt);

impl Dec {
    pub fn zero() -> Self {
        Dec(BigInt::zero())
    }

    pub fn one() -> Self {
        Dec(PRECISION_MULTIPLIER.clone())
    }

    pub fn from_u64(v: u64) -> Self {
        Dec(BigInt::from(v) * &*PRECISION_MULTIPLIER)
    }

    pub fn from_u128(v: u128) -> Self {
        Dec(BigInt::from(v) * &*PRECISION_MULTIPLIER)
    }

    pub fn from_i128(v: i128) -> Self {
        Dec(BigInt::from(v) * &*PRECISION_MULTIPLIER)
    }

    /// `value * 10^-prec`, e.g. `with_prec(5, 1)` is 0.5.
    pub fn with_prec(value: i128, prec: u32) -> Self {
        assert!(prec <= PRECISION, "precision {} exceeds {}", prec, PRECISION);
        Dec(BigInt::from(value) * BigInt::from(10u8).pow(PRECISION - prec))
    }

    /// `numerator / denominator`, `None` when the denominator is zero.
    pub fn from_ratio(numerator: u128, denominator: u128) -> Option<Self> {
        Dec::from_u128(numerator).checked_quo(&Dec::from_u128(denominator))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_positive()
    }

    pub fn abs(&self) -> Dec {
        Dec(self.0.abs())
    }

    /// Division truncated toward zero; `None` on division by zero.
    pub fn checked_quo(&self, other: &Dec) -> Option<Dec> {
        if other.is_zero() {
            return None;
        }
        Some(Dec((&self.0 * &*PRECISION_MULTIPLIER) / &other.0))
    }

    /// Multiplication by an integer amount.
    pub fn mul_u128(&self, v: u128) -> Dec {
        Dec(&self.0 * BigInt::from(v))
    }

    /// Integer part, truncated toward zero.
    pub fn truncate_int(&self) -> BigInt {
        &self.0 / &*PRECISION_MULTIPLIER
    }

    /// Integer part as `u128`; `None` for negative or oversized values.
    pub fn truncate_u128(&self) -> Option<u128> {
        self.truncate_int().to_u128()
    }

    /// Nearest integer, ties to even.
    pub fn round_int(&self) -> BigInt {
        let (quo, rem) = self.0.abs().div_rem(&*PRECISION_MULTIPLIER);
        let doubled = &rem * 2u8;
        let rounded = match doubled.cmp(&*PRECISION_MULTIPLIER) {
            std::cmp::Ordering::Less => quo,
            std::cmp::Ordering::Greater => quo + 1u8,
            std::cmp::Ordering::Equal => {
                if quo.is_even() {
                    quo
                } else {
                    quo + 1u8
                }
            }
        };
        if self.0.sign() == Sign::Minus {
            -rounded
        } else {
            rounded
        }
    }

    pub fn round_u128(&self) -> Option<u128> {
        self.round_int().to_u128()
    }

    /// Smallest integer not less than the value.
    pub fn ceil_int(&self) -> BigInt {
        let (quo, rem) = self.0.div_mod_floor(&*PRECISION_MULTIPLIER);
        if rem.is_zero() {
            quo
        } else {
            quo + 1u8
        }
    }
}

impl Add for Dec {
    type Output = Dec;

    fn add(self, rhs: Dec) -> Dec {
        Dec(self.0 + rhs.0)
    }
}

impl Sub for Dec {
    type Output = Dec;

    fn sub(self, rhs: Dec) -> Dec {
        Dec(self.0 - rhs.0)
    }
}

impl Mul for Dec {
    type Output = Dec;

    /// Truncates toward zero.
    fn mul(self, rhs: Dec) -> Dec {
        Dec((self.0 * rhs.0) / &*PRECISION_MULTIPLIER)
    }
}

impl Neg for Dec {
    type Output = Dec;

    fn neg(self) -> Dec {
        Dec(-self.0)
    }
}

impl fmt::Display for Dec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (int, frac) = self.0.abs().div_rem(&*PRECISION_MULTIPLIER);
        let sign = if self.0.is_negative() { "-" } else { "" };
        write!(
            f,
            "{}{}.{:0>width$}",
            sign,
            int,
            frac.to_string(),
            width = PRECISION as usize
        )
    }
}

impl fmt::Debug for Dec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dec({})", self)
    }
}

impl FromStr for Dec {
    type Err = DecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DecError::Empty);
        }

        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };

        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DecError::Invalid(s.to_string()));
        }
        if body.contains('.') && frac_part.is_empty() {
            return Err(DecError::Invalid(s.to_string()));
        }
        if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DecError::Invalid(s.to_string()));
        }
        if frac_part.len() > PRECISION as usize {
            return Err(DecError::TooPrecise(frac_part.len()));
        }

        let digits = format!("{}{:0<width$}", int_part, frac_part, width = PRECISION as usize);
        let value =
            BigInt::from_str(&digits).map_err(|_| DecError::Invalid(s.to_string()))?;

        Ok(Dec(if negative { -value } else { value }))
    }
}

impl Serialize for Dec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Dec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Dec::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Dec {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(dec("0.5").to_string(), "0.500000000000000000");
        assert_eq!(dec("-12.25").to_string(), "-12.250000000000000000");
        assert_eq!(dec("3"), Dec::from_u64(3));
        assert_eq!(Dec::with_prec(2, 1), dec("0.2"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!("".parse::<Dec>(), Err(DecError::Empty));
        assert!("1.".parse::<Dec>().is_err());
        assert!(".5".parse::<Dec>().is_err());
        assert!("1e5".parse::<Dec>().is_err());
        assert_eq!(
            "0.0000000000000000001".parse::<Dec>(),
            Err(DecError::TooPrecise(19))
        );
    }

    #[test]
    fn test_mul_and_quo_truncate() {
        let third = Dec::from_ratio(1, 3).unwrap();
        assert_eq!(third.to_string(), "0.333333333333333333");

        let share = Dec::from_ratio(150, 450).unwrap();
        assert_eq!(share.mul_u128(500).truncate_u128(), Some(166));

        let neg = -Dec::from_ratio(2, 3).unwrap();
        assert_eq!(neg.to_string(), "-0.666666666666666666");
        assert_eq!((neg * Dec::from_u64(3)).to_string(), "-1.999999999999999998");
    }

    #[test]
    fn test_quo_by_zero() {
        assert!(Dec::one().checked_quo(&Dec::zero()).is_none());
        assert!(Dec::from_ratio(1, 0).is_none());
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(dec("2.5").round_u128(), Some(2));
        assert_eq!(dec("3.5").round_u128(), Some(4));
        assert_eq!(dec("3.4999").round_u128(), Some(3));
        assert_eq!(dec("-2.5").round_int(), BigInt::from(-2));
        assert_eq!(dec("0.2").ceil_int(), BigInt::from(1));
        assert_eq!(dec("-0.2").ceil_int(), BigInt::from(0));
    }

    #[test]
    fn test_truncate_negative_is_none() {
        assert_eq!(dec("-1.5").truncate_u128(), None);
        assert_eq!(dec("-1.5").truncate_int(), BigInt::from(-1));
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&dec("0.2")).unwrap();
        assert_eq!(json, "\"0.200000000000000000\"");
        let back: Dec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dec("0.2"));
    }
}
