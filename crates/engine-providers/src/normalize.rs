//! Provider response normalization helpers (§4.1 quirks).
//!
//! Providers disagree on currency formatting, date formatting, and whether a
//! missing field is `null`, an empty string, or simply absent. Adapters call
//! through these helpers so the quirks live in one place instead of being
//! re-implemented per provider.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

static CURRENCY_STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9.\-]").unwrap());

/// Parses a provider currency string like `"$1,234.50"` into a [`Decimal`].
/// Returns `None` for an empty or unparseable string rather than erroring —
/// callers treat currency fields as optional data, not structural.
pub fn parse_currency(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let stripped = CURRENCY_STRIP.replace_all(trimmed, "");
    Decimal::from_str(&stripped).ok()
}

/// Normalizes a provider date string to UTC. Providers return dates in a
/// handful of shapes (full RFC 3339, a bare date, a naive datetime without a
/// zone); this tries each in turn.
pub fn parse_provider_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(DateTime::from_naive_utc_and_offset(date.and_hms_opt(0, 0, 0)?, Utc));
    }
    None
}

/// Treats an empty string the way an absent field would be treated:
/// `Some("")` becomes `None`.
pub fn empty_as_none(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_currency_with_symbol_and_commas() {
        assert_eq!(parse_currency("$1,234.50"), Some(Decimal::new(123450, 2)));
    }

    #[test]
    fn parses_plain_currency() {
        assert_eq!(parse_currency("42.00"), Some(Decimal::new(4200, 2)));
    }

    #[test]
    fn empty_currency_is_none() {
        assert_eq!(parse_currency(""), None);
        assert_eq!(parse_currency("   "), None);
    }

    #[test]
    fn parses_rfc3339_date() {
        let parsed = parse_provider_date("2026-05-01T08:00:00Z").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-05-01T08:00:00+00:00");
    }

    #[test]
    fn parses_bare_date() {
        let parsed = parse_provider_date("2026-05-01").unwrap();
        assert_eq!(parsed.format("%Y-%m-%d").to_string(), "2026-05-01");
    }

    #[test]
    fn empty_date_is_none() {
        assert_eq!(parse_provider_date(""), None);
    }

    #[test]
    fn empty_string_field_becomes_none() {
        assert_eq!(empty_as_none(Some("".to_string())), None);
        assert_eq!(empty_as_none(Some("  ".to_string())), None);
        assert_eq!(empty_as_none(Some("x".to_string())), Some("x".to_string()));
    }
}
