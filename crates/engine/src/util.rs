//! Internal helpers for model validation and conversion.
//!
//! These utilities are **not** part of the public API. They centralize
//! validation and mapping logic so the engine enforces consistent invariants.

use uuid::Uuid;

use crate::{Currency, EngineError, Money, ResultEngine};

/// Parse a UUID from storage and return a labeled error on failure.
pub(crate) fn parse_uuid(value: &str, label: &str) -> ResultEngine<Uuid> {
    Uuid::parse_str(value).map_err(|_| EngineError::KeyNotFound(format!("invalid {label} id")))
}

/// Parse an optional UUID column.
pub(crate) fn parse_optional_uuid(value: Option<&str>, label: &str) -> ResultEngine<Option<Uuid>> {
    value.map(|raw| parse_uuid(raw, label)).transpose()
}

/// Parse a currency code stored in the DB into a strongly typed `Currency`.
pub(crate) fn model_currency(value: &str) -> ResultEngine<Currency> {
    Currency::try_from(value)
        .map_err(|_| EngineError::InvalidAmount(format!("invalid currency: {value}")))
}

/// Ensure two currencies match (transfers, template accounts).
pub(crate) fn ensure_same_currency(expected: Currency, actual: Currency) -> ResultEngine<()> {
    if expected != actual {
        return Err(EngineError::CurrencyMismatch(format!(
            "expected {}, got {}",
            expected.code(),
            actual.code()
        )));
    }
    Ok(())
}

/// Amounts in commands are magnitudes; the engine derives the sign.
pub(crate) fn ensure_positive_amount(amount: Money, label: &str) -> ResultEngine<()> {
    if !amount.is_positive() {
        return Err(EngineError::InvalidAmount(format!("{label} must be > 0")));
    }
    if amount > Money::max_amount() {
        return Err(EngineError::InvalidAmount(format!(
            "{label} must be at most {}",
            Money::max_amount()
        )));
    }
    Ok(())
}

pub(crate) fn normalize_required_name(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation(format!(
            "{label} name must not be empty"
        )));
    }
    if trimmed.chars().count() > 255 {
        return Err(EngineError::Validation(format!(
            "{label} name must be at most 255 characters"
        )));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// `None` keeps the stored value, `Some("")` clears it.
pub(crate) fn apply_optional_text_patch(
    existing: Option<String>,
    patch: Option<&str>,
) -> Option<String> {
    match patch {
        None => existing,
        Some(value) => normalize_optional_text(Some(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_patch_keeps_or_clears() {
        let existing = Some("Rent".to_string());
        assert_eq!(apply_optional_text_patch(existing.clone(), None), existing);
        assert_eq!(apply_optional_text_patch(existing.clone(), Some("  ")), None);
        assert_eq!(
            apply_optional_text_patch(existing, Some(" Mortgage ")),
            Some("Mortgage".to_string())
        );
    }

    #[test]
    fn names_are_trimmed_and_bounded() {
        assert_eq!(normalize_required_name(" Food ", "category").unwrap(), "Food");
        assert!(normalize_required_name("   ", "category").is_err());
        assert!(normalize_required_name(&"x".repeat(256), "rule").is_err());
    }
}
