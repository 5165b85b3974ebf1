use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const EURO_CURRENCY_CODE: &str = "EUR";
pub const EURO_CURRENCY_CODE_LOWER: &str = "eur";

//--------------------------------------       Money         ---------------------------------------------------------
/// A monetary amount in euro cents. Provider APIs quote asset quantities in minor units, so all
/// arithmetic and storage happens in cents; use [`Money::from_major`] at the program-configuration
/// boundary where amounts are expressed in whole euros.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, AddAssign, add_assign);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in cents: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MoneyConversionError(format!("Value {} is too large to convert to Money", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let euros = self.0 / 100;
        let cents = (self.0 % 100).abs();
        write!(f, "€{euros}.{cents:02}")
    }
}

impl Money {
    /// The amount in cents.
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Construct an amount from whole euros.
    pub fn from_major(euros: i64) -> Self {
        Self(euros * 100)
    }

    /// The whole-euro part of the amount, truncated towards zero.
    pub fn major_units(&self) -> i64 {
        self.0 / 100
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = Money::from(1050);
        let b = Money::from_major(5);
        assert_eq!(a + b, Money::from(1550));
        assert_eq!(a - b, Money::from(550));
        assert_eq!(-a, Money::from(-1050));
        assert_eq!(a * 3, Money::from(3150));
        let mut c = a;
        c -= b;
        assert_eq!(c, Money::from(550));
    }

    #[test]
    fn multiplier_scales_cent_amounts() {
        let transfer = Money::from_major(25);
        assert_eq!(transfer * 4, Money::from(10_000));
    }

    #[test]
    fn formatting() {
        assert_eq!(Money::from(1234).to_string(), "€12.34");
        assert_eq!(Money::from(5).to_string(), "€0.05");
        assert_eq!(Money::from_major(25).to_string(), "€25.00");
    }

    #[test]
    fn sum() {
        let total: Money = vec![Money::from(100), Money::from(250)].into_iter().sum();
        assert_eq!(total, Money::from(350));
    }
}
