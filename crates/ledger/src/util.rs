//! Internal helpers for model validation and conversion.
//!
//! These utilities are **not** part of the public API.

use uuid::Uuid;

use crate::{Currency, LedgerError, ResultLedger};

/// Parse a UUID from storage and return a labeled error on failure.
pub(crate) fn parse_uuid(value: &str, label: &str) -> ResultLedger<Uuid> {
    Uuid::parse_str(value).map_err(|_| LedgerError::Validation(format!("invalid {label} id")))
}

/// Ensure an event currency matches the currency of the scope it lands in.
pub(crate) fn ensure_currency(expected: Currency, actual: Currency) -> ResultLedger<()> {
    if expected != actual {
        return Err(LedgerError::CurrencyMismatch(format!(
            "expected {}, got {}",
            expected.code(),
            actual.code()
        )));
    }
    Ok(())
}

pub(crate) fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Trim a required text field, rejecting blank input.
pub(crate) fn required_text(value: &str, field: &str) -> ResultLedger<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::Validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Collapse duplicates, keeping the first occurrence of each id.
pub(crate) fn unique_ids<'a>(ids: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::new();
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_ids_keeps_input_order() {
        assert_eq!(unique_ids(["b", "a", "b", "c", "a"]), vec!["b", "a", "c"]);
    }

    #[test]
    fn blank_text_is_normalized_away() {
        assert_eq!(normalize_optional_text(Some("  ")), None);
        assert_eq!(normalize_optional_text(Some(" x ")), Some("x".to_string()));
        assert!(required_text(" ", "title").is_err());
    }
}
