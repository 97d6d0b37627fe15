//! Canonical participant type (§3).
//!
//! Identity and lookup fields are typed columns; everything provider-specific
//! and variably shaped lands in one of the flexible JSON sub-objects
//! (`team_info`, `payment_info`, `address`, `additional_data`) rather than a
//! single untyped bag, per the redesign note on "dynamic row shapes" (§9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Field-length maxima enforced by providers; values longer than these are
/// truncated and a warning logged rather than rejected (§4.1).
pub const MAX_PHONE_LEN: usize = 50;
pub const MAX_BIB_LEN: usize = 50;
pub const MAX_CHIP_LEN: usize = 50;
pub const MAX_GENDER_LEN: usize = 30;

/// A race participant, unique on `(partner_id, provider_event_id,
/// provider_participant_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub partner_id: i64,
    pub provider_id: String,
    pub provider_event_id: String,
    pub provider_race_id: String,
    pub provider_participant_id: String,
    pub registration_id: Option<String>,

    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub gender: Option<String>,
    pub age: Option<i32>,
    pub bib_number: Option<String>,
    pub chip_number: Option<String>,
    pub phone: Option<String>,

    pub registration_date: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    /// Bumped to "now" on every upsert, regardless of whether anything else
    /// changed. Must be non-decreasing across upserts (§3, §8).
    pub fetched_date: DateTime<Utc>,

    pub team_info: serde_json::Value,
    pub payment_info: serde_json::Value,
    pub address: serde_json::Value,
    pub additional_data: serde_json::Value,
    /// Unmodified provider response this participant was parsed from (§3).
    pub raw_payload: serde_json::Value,
}

/// Truncates a field to `max_len` characters, returning whether truncation
/// happened so the caller can log a warning (§4.1 field-length quirk).
pub fn truncate_field(value: &str, max_len: usize) -> (String, bool) {
    if value.chars().count() <= max_len {
        (value.to_string(), false)
    } else {
        (value.chars().take(max_len).collect(), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_field_leaves_short_values_untouched() {
        let (value, truncated) = truncate_field("555-1234", MAX_PHONE_LEN);
        assert_eq!(value, "555-1234");
        assert!(!truncated);
    }

    #[test]
    fn truncate_field_cuts_long_values() {
        let long = "x".repeat(MAX_PHONE_LEN + 1);
        let (value, truncated) = truncate_field(&long, MAX_PHONE_LEN);
        assert_eq!(value.chars().count(), MAX_PHONE_LEN);
        assert!(truncated);
    }

    #[test]
    fn truncate_field_at_exact_boundary_not_truncated() {
        let exact = "x".repeat(MAX_PHONE_LEN);
        let (value, truncated) = truncate_field(&exact, MAX_PHONE_LEN);
        assert_eq!(value.chars().count(), MAX_PHONE_LEN);
        assert!(!truncated);
    }
}
