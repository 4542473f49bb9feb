//! Fixed-point currency in whole cents.
//!
//! Revenue enters and leaves the engine as [`Decimal`], but every allocation
//! step runs on integer cents so that rounding is exact and platform
//! independent.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// An amount of currency expressed in hundredths of the unit.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cents(pub i64);

impl Cents {
    pub const ZERO: Cents = Cents(0);

    /// Convert a decimal amount to cents, rounding half away from zero.
    ///
    /// Returns the converted amount and whether rounding changed the value,
    /// or `None` if the amount does not fit in 64 bits of cents.
    pub fn from_decimal(amount: Decimal) -> Option<(Cents, bool)> {
        let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let was_rounded = rounded != amount;
        rounded.rescale(2);
        let cents = i64::try_from(rounded.mantissa()).ok()?;
        Some((Cents(cents), was_rounded))
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl std::fmt::Display for Cents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl std::ops::Add for Cents {
    type Output = Cents;

    fn add(self, rhs: Cents) -> Cents {
        Cents(self.0 + rhs.0)
    }
}

impl std::iter::Sum for Cents {
    fn sum<I: Iterator<Item = Cents>>(iter: I) -> Cents {
        iter.fold(Cents::ZERO, |acc, c| acc + c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_decimal_exact() {
        let (cents, rounded) = Cents::from_decimal(Decimal::new(12545, 2)).unwrap();
        assert_eq!(cents, Cents(12545));
        assert!(!rounded);
    }

    #[test]
    fn test_from_decimal_whole_units() {
        let (cents, rounded) = Cents::from_decimal(Decimal::new(42, 0)).unwrap();
        assert_eq!(cents, Cents(4200));
        assert!(!rounded);
    }

    #[test]
    fn test_from_decimal_rounds_half_away_from_zero() {
        let (cents, rounded) = Cents::from_decimal(Decimal::new(10005, 3)).unwrap();
        assert_eq!(cents, Cents(1001));
        assert!(rounded);

        let (cents, _) = Cents::from_decimal(Decimal::new(10004, 3)).unwrap();
        assert_eq!(cents, Cents(1000));
    }

    #[test]
    fn test_trailing_zeros_are_not_rounding() {
        let (cents, rounded) = Cents::from_decimal(Decimal::new(125450, 3)).unwrap();
        assert_eq!(cents, Cents(12545));
        assert!(!rounded);
    }

    #[test]
    fn test_to_decimal_and_display() {
        assert_eq!(Cents(7853).to_decimal(), Decimal::new(7853, 2));
        assert_eq!(Cents(5).to_string(), "0.05");
    }

    #[test]
    fn test_sum() {
        let total: Cents = [Cents(1), Cents(2), Cents(3)].into_iter().sum();
        assert_eq!(total, Cents(6));
    }
}
