use serde::{Deserialize, Serialize};

use crate::{EngineError, Money};

/// ISO 4217 currency code carried by an account and every transaction posted
/// against it.
///
/// ## Minor units
///
/// `minor_units()` is the number of fraction digits an amount may carry in
/// this currency. Postings with more digits are rejected instead of being
/// rounded, so balances never hold sub-cent residue.
///
/// Example: EUR has 2 minor units, so `10.50` is valid and `10.505` is not.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Eur,
    Usd,
    Gbp,
    Chf,
    Jpy,
}

impl Currency {
    /// Canonical currency code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Currency::Eur => "EUR",
            Currency::Usd => "USD",
            Currency::Gbp => "GBP",
            Currency::Chf => "CHF",
            Currency::Jpy => "JPY",
        }
    }

    /// Number of fraction digits allowed for amounts.
    #[must_use]
    pub const fn minor_units(self) -> u32 {
        match self {
            Currency::Jpy => 0,
            Currency::Eur | Currency::Usd | Currency::Gbp | Currency::Chf => 2,
        }
    }

    /// Rejects amounts carrying more fraction digits than the currency allows.
    pub fn ensure_precision(self, amount: Money) -> Result<(), EngineError> {
        if amount.decimal().normalize().scale() > self.minor_units() {
            return Err(EngineError::InvalidAmount(format!(
                "{} allows at most {} decimal places",
                self.code(),
                self.minor_units()
            )));
        }
        Ok(())
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

impl TryFrom<&str> for Currency {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "EUR" => Ok(Currency::Eur),
            "USD" => Ok(Currency::Usd),
            "GBP" => Ok(Currency::Gbp),
            "CHF" => Ok(Currency::Chf),
            "JPY" => Ok(Currency::Jpy),
            other => Err(EngineError::CurrencyMismatch(format!(
                "unsupported currency: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_codes_case_insensitively() {
        assert_eq!(Currency::try_from(" usd ").unwrap(), Currency::Usd);
        assert!(Currency::try_from("XYZ").is_err());
    }

    #[test]
    fn precision_follows_minor_units() {
        let cents: Money = "10.50".parse().unwrap();
        let sub_cent: Money = "10.505".parse().unwrap();
        assert!(Currency::Eur.ensure_precision(cents).is_ok());
        assert!(Currency::Eur.ensure_precision(sub_cent).is_err());
        assert!(Currency::Jpy.ensure_precision(Money::from(1200)).is_ok());
        assert!(Currency::Jpy.ensure_precision(cents).is_err());
    }
}
