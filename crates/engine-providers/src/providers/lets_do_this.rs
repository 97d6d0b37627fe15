//! Let's Do This adapter (§4.1).
//!
//! Auth scheme: API key as a header. Pagination: page token identical in
//! shape to RunSignUp's, but the participants endpoint nests results one
//! level deeper under `{"result": {"participants": [...]}}`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine_core::prelude::*;
use serde::Deserialize;
use std::time::Duration;

use crate::adapter::{ParticipantPage, ProviderAdapter};
use crate::http_support::check_response;
use crate::normalize::{empty_as_none, parse_provider_date};

const PAGE_SIZE: u32 = 50;

pub struct LetsDoThisAdapter {
    http: reqwest::Client,
    base_url: String,
}

impl LetsDoThisAdapter {
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
struct EventListResult {
    result: EventListInner,
}

#[derive(Debug, Deserialize)]
struct EventListInner {
    events: Vec<RemoteEvent>,
}

#[derive(Debug, Deserialize)]
struct RemoteEvent {
    id: String,
    name: String,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RaceListResult {
    result: RaceListInner,
}

#[derive(Debug, Deserialize)]
struct RaceListInner {
    races: Vec<RemoteRace>,
}

#[derive(Debug, Deserialize)]
struct RemoteRace {
    id: String,
    name: String,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ParticipantListResult {
    result: ParticipantListInner,
}

#[derive(Debug, Deserialize)]
struct ParticipantListInner {
    participants: Vec<RemoteParticipant>,
}

#[derive(Debug, Deserialize)]
struct RemoteParticipant {
    entry_id: String,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    race_number: Option<String>,
}

#[async_trait]
impl ProviderAdapter for LetsDoThisAdapter {
    fn provider_name(&self) -> &str {
        "lets_do_this"
    }

    async fn authenticate(&self, credential: &ProviderCredential) -> Result<()> {
        let response = self
            .http
            .get(format!("{}/v1/account", self.base_url))
            .header("X-Api-Key", &credential.secret)
            .send()
            .await?;
        check_response(self.provider_name(), response).await?;
        Ok(())
    }

    async fn list_events(&self, credential: &ProviderCredential) -> Result<Vec<Event>> {
        let response = self
            .http
            .get(format!("{}/v1/events", self.base_url))
            .header("X-Api-Key", &credential.secret)
            .send()
            .await?;
        let response = check_response(self.provider_name(), response).await?;
        let raw_body: serde_json::Value = response.json().await?;
        let parsed: EventListResult = serde_json::from_value(raw_body.clone())?;

        Ok(parsed
            .result
            .events
            .into_iter()
            .map(|remote| Event {
                partner_id: credential.partner_id,
                provider_id: self.provider_name().to_string(),
                provider_event_id: remote.id,
                name: remote.name,
                start_time: remote
                    .date
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
            .get(format!("{}/v1/events/{}/races", self.base_url, event.provider_event_id))
            .header("X-Api-Key", &credential.secret)
            .send()
            .await?;
        let response = check_response(self.provider_name(), response).await?;
        let raw_body: serde_json::Value = response.json().await?;
        let parsed: RaceListResult = serde_json::from_value(raw_body.clone())?;

        Ok(parsed
            .result
            .races
            .into_iter()
            .map(|remote| Race {
                partner_id: credential.partner_id,
                provider_id: self.provider_name().to_string(),
                provider_race_id: remote.id,
                provider_event_id: event.provider_event_id.clone(),
                name: remote.name,
                distance_meters: None,
                start_time: remote.date.as_deref().and_then(parse_provider_date),
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
            .get(format!(
                "{}/v1/races/{}/participants",
                self.base_url, race.provider_race_id
            ))
            .header("X-Api-Key", &credential.secret)
            .query(&[("page", page.to_string()), ("per_page", PAGE_SIZE.to_string())]);
        if let Some(since) = since {
            request = request.query(&[("since", since.to_rfc3339())]);
        }

        let response = check_response(self.provider_name(), request.send().await?).await?;
        let raw_body: serde_json::Value = response.json().await?;
        let parsed: ParticipantListResult = serde_json::from_value(raw_body.clone())?;
        let raw_items = raw_body
            .as_object()
            .and_then(|map| map.get("result"))
            .and_then(|v| v.as_object())
            .and_then(|map| map.get("participants"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let has_more = parsed.result.participants.len() as u32 == PAGE_SIZE;

        let participants = parsed
            .result
            .participants
            .into_iter()
            .enumerate()
            .map(|(i, remote)| {
                let raw_payload = raw_items.get(i).cloned().unwrap_or(serde_json::Value::Null);
                Ok(Participant {
                    partner_id: credential.partner_id,
                    provider_id: self.provider_name().to_string(),
                    provider_event_id: event.provider_event_id.clone(),
                    provider_race_id: race.provider_race_id.clone(),
                    provider_participant_id: remote.entry_id.clone(),
                    registration_id: Some(remote.entry_id),
                    first_name: empty_as_none(remote.first_name),
                    last_name: empty_as_none(remote.last_name),
                    email: empty_as_none(remote.email),
                    gender: None,
                    age: None,
                    bib_number: empty_as_none(remote.race_number),
                    chip_number: None,
                    phone: None,
                    registration_date: None,
                    last_modified: None,
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
