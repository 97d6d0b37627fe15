//! Canonical event and race types (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A race event as known to one provider, owned by one tenant.
///
/// Uniqueness is on `(partner_id, provider_id, provider_event_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub partner_id: i64,
    pub provider_id: String,
    pub provider_event_id: String,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Unmodified provider response for this event, kept for debugging and
    /// reprocessing if normalization logic changes.
    pub raw_payload: serde_json::Value,
}

impl Event {
    /// Whether this event is still eligible for scheduled resync: past
    /// events beyond `grace` of their start are skipped (§4.4, §4.6).
    pub fn within_grace(&self, now: DateTime<Utc>, grace: chrono::Duration) -> bool {
        self.start_time + grace > now
    }
}

/// A race within an [`Event`]. Must reference an event that already exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Race {
    pub partner_id: i64,
    pub provider_id: String,
    pub provider_race_id: String,
    pub provider_event_id: String,
    pub name: String,
    pub distance_meters: Option<f64>,
    pub start_time: Option<DateTime<Utc>>,
    /// Unmodified provider response this race was parsed from (§3).
    pub raw_payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(start_time: DateTime<Utc>) -> Event {
        Event {
            partner_id: 1,
            provider_id: "runsignup".to_string(),
            provider_event_id: "100".to_string(),
            name: "Spring 5K".to_string(),
            start_time,
            created_at: Utc::now(),
            raw_payload: serde_json::json!({}),
        }
    }

    #[test]
    fn event_within_grace_when_recently_started() {
        let now = Utc::now();
        let event = sample_event(now - chrono::Duration::minutes(30));
        assert!(event.within_grace(now, chrono::Duration::hours(1)));
    }

    #[test]
    fn event_outside_grace_long_past() {
        let now = Utc::now();
        let event = sample_event(now - chrono::Duration::hours(3));
        assert!(!event.within_grace(now, chrono::Duration::hours(1)));
    }
}
