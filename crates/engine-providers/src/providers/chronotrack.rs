//! ChronoTrack adapter (§4.1).
//!
//! Auth scheme: API key + user id as query parameters, same family as
//! RunSignUp but without a secret. Pagination: numbered page with a fixed
//! page size. Quirk: ChronoTrack reports participant names as one combined
//! `display_name` field instead of separate first/last columns; the adapter
//! splits on the first whitespace run, logging nothing since this is a
//! structural field difference rather than bad data.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine_core::prelude::*;
use serde::Deserialize;
use std::time::Duration;

use crate::adapter::{ParticipantPage, ProviderAdapter};
use crate::http_support::check_response;
use crate::normalize::{empty_as_none, parse_provider_date};

const PAGE_SIZE: u32 = 100;

pub struct ChronoTrackAdapter {
    http: reqwest::Client,
    base_url: String,
}

impl ChronoTrackAdapter {
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
struct EventListResponse {
    events: Vec<RemoteEvent>,
}

#[derive(Debug, Deserialize)]
struct RemoteEvent {
    event_id: String,
    event_name: String,
    event_start_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RaceListResponse {
    races: Vec<RemoteRace>,
}

#[derive(Debug, Deserialize)]
struct RemoteRace {
    race_id: String,
    race_name: String,
    race_distance: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ParticipantListResponse {
    entries: Vec<RemoteParticipant>,
    page_count: u32,
}

#[derive(Debug, Deserialize)]
struct RemoteParticipant {
    entry_id: String,
    display_name: Option<String>,
    email: Option<String>,
    bib: Option<String>,
    last_update: Option<String>,
}

fn split_display_name(display_name: Option<String>) -> (Option<String>, Option<String>) {
    match display_name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => (None, None),
        Some(name) => match name.split_once(' ') {
            Some((first, rest)) => (Some(first.to_string()), Some(rest.to_string())),
            None => (Some(name.to_string()), None),
        },
    }
}

#[async_trait]
impl ProviderAdapter for ChronoTrackAdapter {
    fn provider_name(&self) -> &str {
        "chronotrack"
    }

    async fn authenticate(&self, credential: &ProviderCredential) -> Result<()> {
        let response = self
            .http
            .get(format!("{}/api/account", self.base_url))
            .query(&[("user_id", &credential.principal), ("api_key", &credential.secret)])
            .send()
            .await?;
        check_response(self.provider_name(), response).await?;
        Ok(())
    }

    async fn list_events(&self, credential: &ProviderCredential) -> Result<Vec<Event>> {
        let response = self
            .http
            .get(format!("{}/api/events", self.base_url))
            .query(&[("user_id", &credential.principal), ("api_key", &credential.secret)])
            .send()
            .await?;
        let response = check_response(self.provider_name(), response).await?;
        let raw_body: serde_json::Value = response.json().await?;
        let parsed: EventListResponse = serde_json::from_value(raw_body.clone())?;

        Ok(parsed
            .events
            .into_iter()
            .map(|remote| Event {
                partner_id: credential.partner_id,
                provider_id: self.provider_name().to_string(),
                provider_event_id: remote.event_id,
                name: remote.event_name,
                start_time: remote
                    .event_start_time
                    .as_deref()
                    .and_then(parse_provider_date)
                    .unwrap_or_else(Utc::now),
                created_at: Utc::now(),
                raw_payload: raw_body.clone(),
            })
            .collect())
    }

    async fn list_races(&self, credential: &ProviderCredential, event: &Event) -> Result<Vec<Race>> {
        let response = self
            .http
            .get(format!("{}/api/events/{}/races", self.base_url, event.provider_event_id))
            .query(&[("user_id", &credential.principal), ("api_key", &credential.secret)])
            .send()
            .await?;
        let response = check_response(self.provider_name(), response).await?;
        let raw_body: serde_json::Value = response.json().await?;
        let parsed: RaceListResponse = serde_json::from_value(raw_body.clone())?;

        Ok(parsed
            .races
            .into_iter()
            .map(|remote| Race {
                partner_id: credential.partner_id,
                provider_id: self.provider_name().to_string(),
                provider_race_id: remote.race_id,
                provider_event_id: event.provider_event_id.clone(),
                name: remote.race_name,
                distance_meters: remote.race_distance,
                start_time: None,
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

        let mut request = self
            .http
            .get(format!("{}/api/races/{}/entries", self.base_url, race.provider_race_id))
            .query(&[
                ("user_id", credential.principal.clone()),
                ("api_key", credential.secret.clone()),
                ("page", page.to_string()),
                ("page_size", PAGE_SIZE.to_string()),
            ]);
        if let Some(since) = since {
            request = request.query(&[("updated_since", since.to_rfc3339())]);
        }

        let response = check_response(self.provider_name(), request.send().await?).await?;
        let raw_body: serde_json::Value = response.json().await?;
        let parsed: ParticipantListResponse = serde_json::from_value(raw_body.clone())?;
        let raw_items = raw_body
            .as_object()
            .and_then(|map| map.get("entries"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let has_more = page < parsed.page_count;

        let participants = parsed
            .entries
            .into_iter()
            .enumerate()
            .map(|(i, remote)| {
                let raw_payload = raw_items.get(i).cloned().unwrap_or(serde_json::Value::Null);
                let (first_name, last_name) = split_display_name(remote.display_name);
                Ok(Participant {
                    partner_id: credential.partner_id,
                    provider_id: self.provider_name().to_string(),
                    provider_event_id: event.provider_event_id.clone(),
                    provider_race_id: race.provider_race_id.clone(),
                    provider_participant_id: remote.entry_id.clone(),
                    registration_id: Some(remote.entry_id),
                    first_name,
                    last_name,
                    email: empty_as_none(remote.email),
                    gender: None,
                    age: None,
                    bib_number: empty_as_none(remote.bib),
                    chip_number: None,
                    phone: None,
                    registration_date: None,
                    last_modified: remote.last_update.as_deref().and_then(parse_provider_date),
                    fetched_date: Utc::now(),
                    team_info: serde_json::json!({}),
                    payment_info: serde_json::json!({}),
                    address: serde_json::json!({}),
                    additional_data: serde_json::json!({}),
                    raw_payload,
                })
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_display_name_handles_two_parts() {
        let (first, last) = split_display_name(Some("Jordan Lee".to_string()));
        assert_eq!(first.as_deref(), Some("Jordan"));
        assert_eq!(last.as_deref(), Some("Lee"));
    }

    #[test]
    fn split_display_name_handles_single_word() {
        let (first, last) = split_display_name(Some("Madonna".to_string()));
        assert_eq!(first.as_deref(), Some("Madonna"));
        assert_eq!(last, None);
    }

    #[test]
    fn split_display_name_handles_empty() {
        let (first, last) = split_display_name(Some("  ".to_string()));
        assert_eq!(first, None);
        assert_eq!(last, None);
    }
}
