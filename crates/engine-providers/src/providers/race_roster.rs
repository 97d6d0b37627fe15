//! Race Roster adapter (§4.1).
//!
//! Auth scheme: a pre-issued JWT stored directly as the credential secret —
//! unlike Haku there's no token exchange step, the stored secret *is* the
//! bearer token. Pagination: offset + limit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine_core::prelude::*;
use serde::Deserialize;
use std::time::Duration;

use crate::adapter::{ParticipantPage, ProviderAdapter};
use crate::http_support::check_response;
use crate::normalize::{empty_as_none, parse_provider_date};

const PAGE_LIMIT: u32 = 100;

pub struct RaceRosterAdapter {
    http: reqwest::Client,
    base_url: String,
}

impl RaceRosterAdapter {
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
    data: Vec<RemoteEvent>,
}

#[derive(Debug, Deserialize)]
struct RemoteEvent {
    uuid: String,
    name: String,
    starts_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RaceListResponse {
    data: Vec<RemoteRace>,
}

#[derive(Debug, Deserialize)]
struct RemoteRace {
    uuid: String,
    name: String,
    distance: Option<f64>,
    starts_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ParticipantListResponse {
    data: Vec<RemoteParticipant>,
    total: u32,
}

#[derive(Debug, Deserialize)]
struct RemoteParticipant {
    uuid: String,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    bib_number: Option<String>,
    modified_at: Option<String>,
}

#[async_trait]
impl ProviderAdapter for RaceRosterAdapter {
    fn provider_name(&self) -> &str {
        "race_roster"
    }

    async fn authenticate(&self, credential: &ProviderCredential) -> Result<()> {
        let response = self
            .http
            .get(format!("{}/api/v3/me", self.base_url))
            .bearer_auth(&credential.secret)
            .send()
            .await?;
        check_response(self.provider_name(), response).await?;
        Ok(())
    }

    async fn list_events(&self, credential: &ProviderCredential) -> Result<Vec<Event>> {
        let response = self
            .http
            .get(format!("{}/api/v3/events", self.base_url))
            .bearer_auth(&credential.secret)
            .send()
            .await?;
        let response = check_response(self.provider_name(), response).await?;
        let raw_body: serde_json::Value = response.json().await?;
        let parsed: EventListResponse = serde_json::from_value(raw_body.clone())?;

        Ok(parsed
            .data
            .into_iter()
            .map(|remote| Event {
                partner_id: credential.partner_id,
                provider_id: self.provider_name().to_string(),
                provider_event_id: remote.uuid,
                name: remote.name,
                start_time: remote
                    .starts_at
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
            .get(format!(
                "{}/api/v3/events/{}/races",
                self.base_url, event.provider_event_id
            ))
            .bearer_auth(&credential.secret)
            .send()
            .await?;
        let response = check_response(self.provider_name(), response).await?;
        let raw_body: serde_json::Value = response.json().await?;
        let parsed: RaceListResponse = serde_json::from_value(raw_body.clone())?;

        Ok(parsed
            .data
            .into_iter()
            .map(|remote| Race {
                partner_id: credential.partner_id,
                provider_id: self.provider_name().to_string(),
                provider_race_id: remote.uuid,
                provider_event_id: event.provider_event_id.clone(),
                name: remote.name,
                distance_meters: remote.distance,
                start_time: remote.starts_at.as_deref().and_then(parse_provider_date),
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
        let offset: u32 = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);

        let mut request = self
            .http
            .get(format!(
                "{}/api/v3/races/{}/participants",
                self.base_url, race.provider_race_id
            ))
            .bearer_auth(&credential.secret)
            .query(&[("offset", offset.to_string()), ("limit", PAGE_LIMIT.to_string())]);
        if let Some(since) = since {
            request = request.query(&[("modified_since", since.to_rfc3339())]);
        }

        let response = check_response(self.provider_name(), request.send().await?).await?;
        let raw_body: serde_json::Value = response.json().await?;
        let parsed: ParticipantListResponse = serde_json::from_value(raw_body.clone())?;
        let raw_items = raw_body
            .as_object()
            .and_then(|map| map.get("data"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let has_more = offset + parsed.data.len() as u32 < parsed.total;

        let participants = parsed
            .data
            .into_iter()
            .enumerate()
            .map(|(i, remote)| {
                let raw_payload = raw_items.get(i).cloned().unwrap_or(serde_json::Value::Null);
                Ok(Participant {
                    partner_id: credential.partner_id,
                    provider_id: self.provider_name().to_string(),
                    provider_event_id: event.provider_event_id.clone(),
                    provider_race_id: race.provider_race_id.clone(),
                    provider_participant_id: remote.uuid.clone(),
                    registration_id: Some(remote.uuid),
                    first_name: empty_as_none(remote.first_name),
                    last_name: empty_as_none(remote.last_name),
                    email: empty_as_none(remote.email),
                    gender: None,
                    age: None,
                    bib_number: empty_as_none(remote.bib_number),
                    chip_number: None,
                    phone: None,
                    registration_date: None,
                    last_modified: remote.modified_at.as_deref().and_then(parse_provider_date),
                    fetched_date: Utc::now(),
                    team_info: serde_json::json!({}),
                    payment_info: serde_json::json!({}),
                    address: serde_json::json!({}),
                    additional_data: serde_json::json!({}),
                    raw_payload,
                })
            })
            .collect();

        let next_cursor = if has_more {
            Some((offset + PAGE_LIMIT).to_string())
        } else {
            None
        };
        Ok((
            ParticipantPage {
                participants,
                has_more,
            },
            next_cursor,
        ))
    }
}
