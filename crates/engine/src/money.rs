use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
    str::FromStr,
};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Signed money amount backed by an exact decimal.
///
/// Use this type for **all** monetary values in the engine (balances,
/// transaction amounts, rule thresholds, recurring amounts). Arithmetic never
/// goes through binary floating point, so thousands of postings add up to the
/// cent.
///
/// The value is signed:
/// - positive = income / increase
/// - negative = expense / decrease
///
/// # Examples
///
/// ```rust
/// use engine::Money;
///
/// let amount: Money = "12.34".parse().unwrap();
/// assert_eq!(amount.to_string(), "12.34");
/// assert_eq!((amount - "0.34".parse().unwrap()).to_string(), "12.00");
/// ```
///
/// Parsing from user input accepts `.` or `,` as decimal separator:
///
/// ```rust
/// use engine::Money;
///
/// assert_eq!("10,5".parse::<Money>().unwrap(), "10.50".parse().unwrap());
/// assert!("ten".parse::<Money>().is_err());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Largest magnitude accepted for one posting or recurring amount.
    ///
    /// Balances and projected totals are sums of such amounts and stay far
    /// below `Decimal::MAX`.
    #[must_use]
    pub fn max_amount() -> Self {
        Self(Decimal::from(1_000_000_000_000_i64))
    }

    #[must_use]
    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Builds an amount from an integer number of minor units and a scale,
    /// e.g. `Money::from_minor(1050, 2)` is `10.50`.
    #[must_use]
    pub fn from_minor(minor: i64, scale: u32) -> Self {
        Self(Decimal::new(minor, scale))
    }

    #[must_use]
    pub const fn decimal(self) -> Decimal {
        self.0
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    #[must_use]
    pub fn is_positive(self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    #[must_use]
    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    #[must_use]
    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    /// Checked addition (returns `None` on overflow).
    #[must_use]
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    /// Checked subtraction (returns `None` on overflow).
    #[must_use]
    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }

    /// Canonical text used for storage: no trailing zeros, no exponent.
    #[must_use]
    pub fn to_storage(self) -> String {
        self.0.normalize().to_string()
    }

    /// Parses the canonical storage text written by [`Money::to_storage`].
    pub fn from_storage(value: &str, label: &str) -> Result<Self, EngineError> {
        Decimal::from_str(value)
            .map(Self)
            .map_err(|_| EngineError::InvalidAmount(format!("invalid stored {label}: {value}")))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut value = self.0;
        if value.scale() < 2 {
            value.rescale(2);
        }
        write!(f, "{value}")
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(Decimal::from(value))
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl FromStr for Money {
    type Err = EngineError;

    /// Parses a decimal string.
    ///
    /// Accepts `.` or `,` as decimal separator and an optional leading `+`/`-`.
    /// Exponent notation and thousands separators are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(EngineError::InvalidAmount("empty amount".to_string()));
        }

        let unsigned = trimmed
            .strip_prefix('-')
            .or_else(|| trimmed.strip_prefix('+'))
            .unwrap_or(trimmed);
        if unsigned.is_empty()
            || !unsigned
                .chars()
                .all(|c| c.is_ascii_digit() || c == '.' || c == ',')
        {
            return Err(EngineError::InvalidAmount("invalid amount".to_string()));
        }

        let normalized = trimmed.replace(',', ".");
        Decimal::from_str(&normalized)
            .map(Money)
            .map_err(|_| EngineError::InvalidAmount("invalid amount".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(s: &str) -> Money {
        s.parse().unwrap()
    }

    #[test]
    fn display_keeps_at_least_two_decimals() {
        assert_eq!(Money::ZERO.to_string(), "0.00");
        assert_eq!(Money::from_minor(1, 2).to_string(), "0.01");
        assert_eq!(m("10.5").to_string(), "10.50");
        assert_eq!(m("-10.5").to_string(), "-10.50");
        assert_eq!(m("0.125").to_string(), "0.125");
    }

    #[test]
    fn parse_accepts_dot_or_comma() {
        assert_eq!(m("10"), Money::from(10));
        assert_eq!(m("10,50"), Money::from_minor(1050, 2));
        assert_eq!(m("+1.00"), Money::from(1));
        assert_eq!(m("  2.30 "), Money::from_minor(230, 2));
        assert!("1e3".parse::<Money>().is_err());
        assert!("-".parse::<Money>().is_err());
        assert!("1.2.3".parse::<Money>().is_err());
    }

    #[test]
    fn tenths_add_up_exactly() {
        let total: Money = std::iter::repeat_n(m("0.1"), 10_000).sum();
        assert_eq!(total, Money::from(1000));
    }

    #[test]
    fn storage_round_trip_is_canonical() {
        assert_eq!(m("12.300").to_storage(), "12.3");
        assert_eq!(Money::from_storage("12.3", "balance").unwrap(), m("12.30"));
        assert!(Money::from_storage("abc", "balance").is_err());
    }
}
