//! RunSignUp adapter (§4.1).
//!
//! Auth scheme: API key + secret as query parameters. Pagination: numbered
//! `page` parameter, 100 participants per page. Quirk: the top-level
//! "event" concept in RunSignUp's own API is called a "race", and what we
//! call a canonical [`Race`] is RunSignUp's nested "event" sub-object —
//! inverted naming relative to every other provider in this engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine_core::prelude::*;
use serde::Deserialize;
use std::time::Duration;

use crate::adapter::{ParticipantPage, ProviderAdapter};
use crate::http_support::check_response;
use crate::normalize::{empty_as_none, parse_provider_date};
use engine_core::models::participant::{truncate_field, MAX_BIB_LEN, MAX_CHIP_LEN, MAX_GENDER_LEN, MAX_PHONE_LEN};

const PAGE_SIZE: u32 = 100;

pub struct RunSignUpAdapter {
    http: reqwest::Client,
    base_url: String,
}

impl RunSignUpAdapter {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("static reqwest client config is always valid"),
            base_url: base_url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RaceListResponse {
    races: Vec<RaceEnvelope>,
}

#[derive(Debug, Deserialize)]
struct RaceEnvelope {
    race: RemoteRace,
}

#[derive(Debug, Deserialize)]
struct RemoteRace {
    race_id: i64,
    name: String,
    next_date: Option<String>,
    #[serde(default)]
    events: Vec<RemoteSubEvent>,
}

#[derive(Debug, Deserialize)]
struct RemoteSubEvent {
    event_id: i64,
    name: String,
    start_time: Option<String>,
    distance: Option<String>,
}

/// RunSignUp returns either a bare array or `{"participants": [...]}`
/// depending on API version — the adapter accepts both (§4.1 quirk).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ParticipantsResponse {
    Wrapped { participants: Vec<RemoteParticipant> },
    Bare(Vec<RemoteParticipant>),
}

impl ParticipantsResponse {
    fn into_inner(self) -> Vec<RemoteParticipant> {
        match self {
            ParticipantsResponse::Wrapped { participants } => participants,
            ParticipantsResponse::Bare(list) => list,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RemoteParticipant {
    registration_id: i64,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    gender: Option<String>,
    age: Option<i32>,
    bib_num: Option<String>,
    chip_num: Option<String>,
    phone: Option<String>,
    registration_date: Option<String>,
    last_modified: Option<String>,
}

#[async_trait]
impl ProviderAdapter for RunSignUpAdapter {
    fn provider_name(&self) -> &str {
        "runsignup"
    }

    async fn authenticate(&self, credential: &ProviderCredential) -> Result<()> {
        let response = self
            .http
            .get(format!("{}/rest/v2/user", self.base_url))
            .query(&[("api_key", &credential.principal), ("api_secret", &credential.secret)])
            .send()
            .await?;
        check_response(self.provider_name(), response).await?;
        Ok(())
    }

    async fn list_events(&self, credential: &ProviderCredential) -> Result<Vec<Event>> {
        let response = self
            .http
            .get(format!("{}/rest/v2/races", self.base_url))
            .query(&[("api_key", &credential.principal), ("api_secret", &credential.secret)])
            .send()
            .await?;
        let response = check_response(self.provider_name(), response).await?;
        let raw_body: serde_json::Value = response.json().await?;
        let parsed: RaceListResponse = serde_json::from_value(raw_body.clone())?;

        Ok(parsed
            .races
            .into_iter()
            .map(|envelope| {
                let race = envelope.race;
                let start_time = race
                    .next_date
                    .as_deref()
                    .and_then(parse_provider_date)
                    .unwrap_or_else(Utc::now);
                Event {
                    partner_id: credential.partner_id,
                    provider_id: self.provider_name().to_string(),
                    provider_event_id: race.race_id.to_string(),
                    name: race.name,
                    start_time,
                    created_at: Utc::now(),
                    raw_payload: raw_body.clone(),
                }
            })
            .collect())
    }

    async fn list_races(&self, credential: &ProviderCredential, event: &Event) -> Result<Vec<Race>> {
        let response = self
            .http
            .get(format!("{}/rest/v2/race/{}", self.base_url, event.provider_event_id))
            .query(&[("api_key", &credential.principal), ("api_secret", &credential.secret)])
            .send()
            .await?;
        let response = check_response(self.provider_name(), response).await?;
        let raw_body: serde_json::Value = response.json().await?;
        let envelope: RaceEnvelope = serde_json::from_value(raw_body.clone())?;

        Ok(envelope
            .race
            .events
            .into_iter()
            .map(|sub_event| Race {
                partner_id: credential.partner_id,
                provider_id: self.provider_name().to_string(),
                provider_race_id: sub_event.event_id.to_string(),
                provider_event_id: event.provider_event_id.clone(),
                name: sub_event.name,
                distance_meters: sub_event.distance.and_then(|d| d.parse::<f64>().ok()),
                start_time: sub_event.start_time.as_deref().and_then(parse_provider_date),
                raw_payload: raw_body.clone(),
            })
            .collect())
    }

    async fn list_participants(
        &self,
        credential: &ProviderCredential,
        race: &Race,
        event: &Event,
        since: Option<DateTime<Utc>>,
        cursor: Option<String>,
    ) -> Result<(ParticipantPage, Option<String>)> {
        let page: u32 = cursor.and_then(|c| c.parse().ok()).unwrap_or(1);

        let mut query = vec![
            ("api_key".to_string(), credential.principal.clone()),
            ("api_secret".to_string(), credential.secret.clone()),
            ("page".to_string(), page.to_string()),
            ("results_per_page".to_string(), PAGE_SIZE.to_string()),
        ];
        if let Some(since) = since {
            query.push(("modified_after".to_string(), since.to_rfc3339()));
        }

        let response = self
            .http
            .get(format!(
                "{}/rest/v2/race/{}/participants",
                self.base_url, race.provider_race_id
            ))
            .query(&query)
            .send()
            .await?;
        let response = check_response(self.provider_name(), response).await?;
        let raw_body: serde_json::Value = response.json().await?;
        let parsed: ParticipantsResponse = serde_json::from_value(raw_body.clone())?;
        let raw_items = match &raw_body {
            serde_json::Value::Object(map) => map.get("participants").and_then(|v| v.as_array()).cloned().unwrap_or_default(),
            serde_json::Value::Array(items) => items.clone(),
            _ => Vec::new(),
        };
        let remote_participants = parsed.into_inner();
        let has_more = remote_participants.len() as u32 == PAGE_SIZE;

        let participants = remote_participants
            .into_iter()
            .enumerate()
            .map(|(i, remote)| {
                let raw = raw_items.get(i).cloned().unwrap_or(serde_json::Value::Null);
                normalize_participant(credential.partner_id, event, race, remote, raw)
            })
            .collect();

        let next_cursor = if has_more { Some((page + 1).to_string()) } else { None };
        Ok((
            ParticipantPage {
                participants,
                has_more,
            },
            next_cursor,
        ))
    }
}

fn normalize_participant(
    partner_id: i64,
    event: &Event,
    race: &Race,
    remote: RemoteParticipant,
    raw_payload: serde_json::Value,
) -> RowResult<Participant> {
    let row_id = remote.registration_id.to_string();

    let (bib_number, bib_truncated) = remote
        .bib_num
        .as_deref()
        .map(|v| truncate_field(v, MAX_BIB_LEN))
        .unzip();
    let (chip_number, chip_truncated) = remote
        .chip_num
        .as_deref()
        .map(|v| truncate_field(v, MAX_CHIP_LEN))
        .unzip();
    let (phone, phone_truncated) = remote
        .phone
        .as_deref()
        .map(|v| truncate_field(v, MAX_PHONE_LEN))
        .unzip();
    let (gender, gender_truncated) = remote
        .gender
        .as_deref()
        .map(|v| truncate_field(v, MAX_GENDER_LEN))
        .unzip();

    if bib_truncated == Some(true) {
        tracing::warn!(row_id = %row_id, field = "bib_num", "field truncated to max length");
    }
    if chip_truncated == Some(true) {
        tracing::warn!(row_id = %row_id, field = "chip_num", "field truncated to max length");
    }
    if phone_truncated == Some(true) {
        tracing::warn!(row_id = %row_id, field = "phone", "field truncated to max length");
    }
    if gender_truncated == Some(true) {
        tracing::warn!(row_id = %row_id, field = "gender", "field truncated to max length");
    }

    Ok(Participant {
        partner_id,
        provider_id: "runsignup".to_string(),
        provider_event_id: event.provider_event_id.clone(),
        provider_race_id: race.provider_race_id.clone(),
        provider_participant_id: row_id.clone(),
        registration_id: Some(row_id),
        first_name: empty_as_none(remote.first_name),
        last_name: empty_as_none(remote.last_name),
        email: empty_as_none(remote.email),
        gender,
        age: remote.age,
        bib_number,
        chip_number,
        phone,
        registration_date: remote.registration_date.as_deref().and_then(parse_provider_date),
        last_modified: remote.last_modified.as_deref().and_then(parse_provider_date),
        fetched_date: Utc::now(),
        team_info: serde_json::json!({}),
        payment_info: serde_json::json!({}),
        address: serde_json::json!({}),
        additional_data: serde_json::json!({}),
        raw_payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        Event {
            partner_id: 1,
            provider_id: "runsignup".to_string(),
            provider_event_id: "100".to_string(),
            name: "Spring 5K".to_string(),
            start_time: Utc::now(),
            created_at: Utc::now(),
            raw_payload: serde_json::json!({}),
        }
    }

    fn sample_race() -> Race {
        Race {
            partner_id: 1,
            provider_id: "runsignup".to_string(),
            provider_race_id: "200".to_string(),
            provider_event_id: "100".to_string(),
            name: "5K".to_string(),
            distance_meters: Some(5000.0),
            start_time: None,
            raw_payload: serde_json::json!({}),
        }
    }

    #[test]
    fn normalize_participant_maps_identity_fields() {
        let remote = RemoteParticipant {
            registration_id: 555,
            first_name: Some("Jordan".to_string()),
            last_name: Some("Lee".to_string()),
            email: Some("jordan@example.com".to_string()),
            gender: Some("F".to_string()),
            age: Some(34),
            bib_num: Some("101".to_string()),
            chip_num: None,
            phone: Some("".to_string()),
            registration_date: Some("2026-01-01".to_string()),
            last_modified: None,
        };

        let participant = normalize_participant(1, &sample_event(), &sample_race(), remote, serde_json::json!({})).unwrap();
        assert_eq!(participant.provider_participant_id, "555");
        assert_eq!(participant.first_name.as_deref(), Some("Jordan"));
        assert_eq!(participant.phone, None, "empty phone string normalizes to None");
    }

    #[test]
    fn long_bib_number_is_truncated() {
        let mut remote_bib = "9".repeat(MAX_BIB_LEN + 10);
        remote_bib.push('1');
        let remote = RemoteParticipant {
            registration_id: 1,
            first_name: None,
            last_name: None,
            email: None,
            gender: None,
            age: None,
            bib_num: Some(remote_bib),
            chip_num: None,
            phone: None,
            registration_date: None,
            last_modified: None,
        };

        let participant = normalize_participant(1, &sample_event(), &sample_race(), remote, serde_json::json!({})).unwrap();
        assert_eq!(participant.bib_number.unwrap().chars().count(), MAX_BIB_LEN);
    }

    #[test]
    fn participants_response_accepts_bare_array() {
        let json = r#"[{"registration_id": 1, "first_name": "A", "last_name": "B"}]"#;
        let parsed: ParticipantsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.into_inner().len(), 1);
    }

    #[test]
    fn participants_response_accepts_wrapped_object() {
        let json = r#"{"participants": [{"registration_id": 1, "first_name": "A", "last_name": "B"}]}"#;
        let parsed: ParticipantsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.into_inner().len(), 1);
    }
}
