//! Haku adapter (§4.1).
//!
//! Auth scheme: OAuth2 client credentials. The adapter caches the bearer
//! token in memory and refreshes it once it's within a minute of expiry.
//! Pagination: opaque cursor returned by the API itself rather than a page
//! number.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine_core::prelude::*;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::adapter::{ParticipantPage, ProviderAdapter};
use crate::http_support::check_response;
use crate::normalize::{empty_as_none, parse_provider_date};

struct CachedToken {
    token: String,
    expires_at: Instant,
}

pub struct HakuAdapter {
    http: reqwest::Client,
    base_url: String,
    token: Mutex<Option<CachedToken>>,
}

impl HakuAdapter {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("static reqwest client config is always valid"),
            base_url: base_url.into(),
            token: Mutex::new(None),
        }
    }

    async fn bearer_token(&self, credential: &ProviderCredential) -> Result<String> {
        {
            let cached = self.token.lock().unwrap();
            if let Some(cached) = cached.as_ref() {
                if cached.expires_at > Instant::now() + Duration::from_secs(60) {
                    return Ok(cached.token.clone());
                }
            }
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: u64,
        }

        let response = self
            .http
            .post(format!("{}/oauth/token", self.base_url))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", credential.principal.as_str()),
                ("client_secret", credential.secret.as_str()),
            ])
            .send()
            .await?;
        let response = check_response(self.provider_name(), response).await?;
        let parsed: TokenResponse = response.json().await?;

        let mut cached = self.token.lock().unwrap();
        *cached = Some(CachedToken {
            token: parsed.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(parsed.expires_in),
        });
        Ok(parsed.access_token)
    }
}

#[derive(Debug, Deserialize)]
struct EventListResponse {
    events: Vec<RemoteEvent>,
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoteEvent {
    id: String,
    title: String,
    start_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RaceListResponse {
    races: Vec<RemoteRace>,
}

#[derive(Debug, Deserialize)]
struct RemoteRace {
    id: String,
    name: String,
    distance_km: Option<f64>,
    start_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ParticipantListResponse {
    participants: Vec<RemoteParticipant>,
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoteParticipant {
    registration_id: String,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    gender: Option<String>,
    age: Option<i32>,
    bib: Option<String>,
    updated_at: Option<String>,
}

#[async_trait]
impl ProviderAdapter for HakuAdapter {
    fn provider_name(&self) -> &str {
        "haku"
    }

    async fn authenticate(&self, credential: &ProviderCredential) -> Result<()> {
        self.bearer_token(credential).await?;
        Ok(())
    }

    async fn list_events(&self, credential: &ProviderCredential) -> Result<Vec<Event>> {
        let token = self.bearer_token(credential).await?;
        let mut events = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut request = self.http.get(format!("{}/api/v1/events", self.base_url)).bearer_auth(&token);
            if let Some(ref cursor) = cursor {
                request = request.query(&[("cursor", cursor)]);
            }
            let response = check_response(self.provider_name(), request.send().await?).await?;
            let raw_body: serde_json::Value = response.json().await?;
            let parsed: EventListResponse = serde_json::from_value(raw_body.clone())?;

            for remote in parsed.events {
                events.push(Event {
                    partner_id: credential.partner_id,
                    provider_id: self.provider_name().to_string(),
                    provider_event_id: remote.id,
                    name: remote.title,
                    start_time: remote
                        .start_date
                        .as_deref()
                        .and_then(parse_provider_date)
                        .unwrap_or_else(Utc::now),
                    created_at: Utc::now(),
                    raw_payload: raw_body.clone(),
                });
            }

            cursor = parsed.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        Ok(events)
    }

    async fn list_races(&self, credential: &ProviderCredential, event: &Event) -> Result<Vec<Race>> {
        let token = self.bearer_token(credential).await?;
        let response = self
            .http
            .get(format!("{}/api/v1/events/{}/races", self.base_url, event.provider_event_id))
            .bearer_auth(&token)
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
                provider_race_id: remote.id,
                provider_event_id: event.provider_event_id.clone(),
                name: remote.name,
                distance_meters: remote.distance_km.map(|km| km * 1000.0),
                start_time: remote.start_date.as_deref().and_then(parse_provider_date),
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
        let token = self.bearer_token(credential).await?;
        let mut request = self
            .http
            .get(format!(
                "{}/api/v1/races/{}/participants",
                self.base_url, race.provider_race_id
            ))
            .bearer_auth(&token);
        if let Some(ref cursor) = cursor {
            request = request.query(&[("cursor", cursor.as_str())]);
        }
        if let Some(since) = since {
            request = request.query(&[("updated_since", since.to_rfc3339().as_str())]);
        }

        let response = check_response(self.provider_name(), request.send().await?).await?;
        let raw_body: serde_json::Value = response.json().await?;
        let parsed: ParticipantListResponse = serde_json::from_value(raw_body.clone())?;
        let raw_items = raw_body
            .as_object()
            .and_then(|map| map.get("participants"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let has_more = parsed.next_cursor.is_some();

        let participants = parsed
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
                    provider_participant_id: remote.registration_id.clone(),
                    registration_id: Some(remote.registration_id),
                    first_name: empty_as_none(remote.first_name),
                    last_name: empty_as_none(remote.last_name),
                    email: empty_as_none(remote.email),
                    gender: empty_as_none(remote.gender),
                    age: remote.age,
                    bib_number: empty_as_none(remote.bib),
                    chip_number: None,
                    phone: None,
                    registration_date: None,
                    last_modified: remote.updated_at.as_deref().and_then(parse_provider_date),
                    fetched_date: Utc::now(),
                    team_info: serde_json::json!({}),
                    payment_info: serde_json::json!({}),
                    address: serde_json::json!({}),
                    additional_data: serde_json::json!({}),
                    raw_payload,
                })
            })
            .collect();

        Ok((
            ParticipantPage {
                participants,
                has_more,
            },
            parsed.next_cursor,
        ))
    }
}
