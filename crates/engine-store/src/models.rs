//! Diesel row types and their conversions to/from the canonical
//! [`engine_core::models`] types.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use engine_core::models as core;
use uuid::Uuid;

use crate::schema::{backfill_checkpoints, events, participants, partner_provider_credentials, races, sync_history};

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = partner_provider_credentials)]
pub struct CredentialRow {
    pub id: i64,
    pub partner_id: i64,
    pub provider_id: String,
    pub principal: String,
    pub secret: String,
    pub additional_config_json: serde_json::Value,
    pub active: bool,
}

impl From<CredentialRow> for core::ProviderCredential {
    fn from(row: CredentialRow) -> Self {
        core::ProviderCredential {
            partner_id: row.partner_id,
            provider_id: row.provider_id,
            principal: row.principal,
            secret: row.secret,
            additional_config: row.additional_config_json,
            active: row.active,
        }
    }
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = events)]
pub struct NewEvent<'a> {
    pub partner_id: i64,
    pub provider_id: &'a str,
    pub provider_event_id: &'a str,
    pub name: &'a str,
    pub start_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub raw_payload: serde_json::Value,
}

impl<'a> NewEvent<'a> {
    pub fn from_core(event: &'a core::Event) -> Self {
        Self {
            partner_id: event.partner_id,
            provider_id: &event.provider_id,
            provider_event_id: &event.provider_event_id,
            name: &event.name,
            start_time: event.start_time,
            created_at: event.created_at,
            raw_payload: event.raw_payload.clone(),
        }
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = events)]
pub struct EventRow {
    pub id: i64,
    pub partner_id: i64,
    pub provider_id: String,
    pub provider_event_id: String,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub raw_payload: serde_json::Value,
}

impl From<EventRow> for core::Event {
    fn from(row: EventRow) -> Self {
        core::Event {
            partner_id: row.partner_id,
            provider_id: row.provider_id,
            provider_event_id: row.provider_event_id,
            name: row.name,
            start_time: row.start_time,
            created_at: row.created_at,
            raw_payload: row.raw_payload,
        }
    }
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = races)]
pub struct NewRace<'a> {
    pub partner_id: i64,
    pub provider_id: &'a str,
    pub provider_race_id: &'a str,
    pub provider_event_id: &'a str,
    pub name: &'a str,
    pub distance_meters: Option<f64>,
    pub start_time: Option<DateTime<Utc>>,
    pub raw_payload: serde_json::Value,
}

impl<'a> NewRace<'a> {
    pub fn from_core(race: &'a core::Race) -> Self {
        Self {
            partner_id: race.partner_id,
            provider_id: &race.provider_id,
            provider_race_id: &race.provider_race_id,
            provider_event_id: &race.provider_event_id,
            name: &race.name,
            distance_meters: race.distance_meters,
            start_time: race.start_time,
            raw_payload: race.raw_payload.clone(),
        }
    }
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = participants)]
pub struct NewParticipant<'a> {
    pub partner_id: i64,
    pub provider_id: &'a str,
    pub provider_event_id: &'a str,
    pub provider_race_id: &'a str,
    pub provider_participant_id: &'a str,
    pub registration_id: Option<&'a str>,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
    pub email: Option<&'a str>,
    pub gender: Option<&'a str>,
    pub age: Option<i32>,
    pub bib_number: Option<&'a str>,
    pub chip_number: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub registration_date: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub fetched_date: DateTime<Utc>,
    pub team_info: serde_json::Value,
    pub payment_info: serde_json::Value,
    pub address: serde_json::Value,
    pub additional_data: serde_json::Value,
    pub raw_payload: serde_json::Value,
}

impl<'a> NewParticipant<'a> {
    /// Builds the insertable row. `fetched_date` is always stamped to `now`
    /// regardless of what the in-memory [`core::Participant`] carries — it
    /// must be bumped on every upsert (§4.3).
    pub fn from_core(participant: &'a core::Participant, now: DateTime<Utc>) -> Self {
        Self {
            partner_id: participant.partner_id,
            provider_id: &participant.provider_id,
            provider_event_id: &participant.provider_event_id,
            provider_race_id: &participant.provider_race_id,
            provider_participant_id: &participant.provider_participant_id,
            registration_id: participant.registration_id.as_deref(),
            first_name: participant.first_name.as_deref(),
            last_name: participant.last_name.as_deref(),
            email: participant.email.as_deref(),
            gender: participant.gender.as_deref(),
            age: participant.age,
            bib_number: participant.bib_number.as_deref(),
            chip_number: participant.chip_number.as_deref(),
            phone: participant.phone.as_deref(),
            registration_date: participant.registration_date,
            last_modified: participant.last_modified,
            fetched_date: now,
            team_info: participant.team_info.clone(),
            payment_info: participant.payment_info.clone(),
            address: participant.address.clone(),
            additional_data: participant.additional_data.clone(),
            raw_payload: participant.raw_payload.clone(),
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = sync_history)]
pub struct NewSyncHistoryRow<'a> {
    pub partner_id: i64,
    pub provider_id: &'a str,
    pub provider_event_id: Option<&'a str>,
    pub sync_kind: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: String,
    pub records_seen: i64,
    pub records_upserted: i64,
    pub errors: i64,
    pub reason: Option<&'a str>,
}

impl<'a> NewSyncHistoryRow<'a> {
    pub fn from_core(row: &'a core::SyncHistoryRow) -> Self {
        let status = match row.status {
            core::SyncStatus::Completed => "completed",
            core::SyncStatus::Failed => "failed",
        };
        Self {
            partner_id: row.partner_id,
            provider_id: &row.provider_id,
            provider_event_id: row.provider_event_id.as_deref(),
            sync_kind: row.sync_kind.to_string(),
            started_at: row.started_at,
            finished_at: row.finished_at,
            status: status.to_string(),
            records_seen: row.records_seen,
            records_upserted: row.records_upserted,
            errors: row.errors,
            reason: row.reason.as_deref(),
        }
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = backfill_checkpoints)]
pub struct CheckpointRow {
    pub run_id: Uuid,
    pub work_items: serde_json::Value,
    pub last_completed_index: i64,
    pub in_progress_cursor: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = backfill_checkpoints)]
pub struct NewCheckpointRow {
    pub run_id: Uuid,
    pub work_items: serde_json::Value,
    pub last_completed_index: i64,
    pub in_progress_cursor: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl NewCheckpointRow {
    pub fn from_core(checkpoint: &core::BackfillCheckpoint) -> Self {
        Self {
            run_id: checkpoint.run_id,
            work_items: serde_json::to_value(&checkpoint.work_items)
                .expect("BackfillWorkItem always serializes"),
            last_completed_index: checkpoint.last_completed_index,
            in_progress_cursor: checkpoint.in_progress_cursor.clone(),
            updated_at: Utc::now(),
        }
    }
}

impl TryFrom<CheckpointRow> for core::BackfillCheckpoint {
    type Error = serde_json::Error;

    fn try_from(row: CheckpointRow) -> Result<Self, Self::Error> {
        Ok(core::BackfillCheckpoint {
            run_id: row.run_id,
            work_items: serde_json::from_value(row.work_items)?,
            last_completed_index: row.last_completed_index,
            in_progress_cursor: row.in_progress_cursor,
        })
    }
}
