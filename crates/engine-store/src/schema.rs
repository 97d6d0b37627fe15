//! Diesel table definitions for the canonical store (§3, §6).
//!
//! `timing_partners` and `providers` are externally managed seed/reference
//! data; the engine only reads them. Every other table here is written by
//! the [`crate::gateway::StoreGateway`].

diesel::table! {
    timing_partners (partner_id) {
        partner_id -> BigInt,
        name -> Text,
    }
}

diesel::table! {
    providers (provider_id) {
        provider_id -> Text,
        name -> Text,
    }
}

diesel::table! {
    partner_provider_credentials (id) {
        id -> BigInt,
        partner_id -> BigInt,
        provider_id -> Text,
        principal -> Text,
        secret -> Text,
        additional_config_json -> Jsonb,
        active -> Bool,
    }
}

diesel::table! {
    events (id) {
        id -> BigInt,
        partner_id -> BigInt,
        provider_id -> Text,
        provider_event_id -> Text,
        name -> Text,
        start_time -> Timestamptz,
        created_at -> Timestamptz,
        raw_payload -> Jsonb,
    }
}

diesel::table! {
    races (id) {
        id -> BigInt,
        partner_id -> BigInt,
        provider_id -> Text,
        provider_race_id -> Text,
        provider_event_id -> Text,
        name -> Text,
        distance_meters -> Nullable<Double>,
        start_time -> Nullable<Timestamptz>,
        raw_payload -> Jsonb,
    }
}

diesel::table! {
    participants (id) {
        id -> BigInt,
        partner_id -> BigInt,
        provider_id -> Text,
        provider_event_id -> Text,
        provider_race_id -> Text,
        provider_participant_id -> Text,
        registration_id -> Nullable<Text>,
        first_name -> Nullable<Text>,
        last_name -> Nullable<Text>,
        email -> Nullable<Text>,
        gender -> Nullable<Text>,
        age -> Nullable<Integer>,
        bib_number -> Nullable<Text>,
        chip_number -> Nullable<Text>,
        phone -> Nullable<Text>,
        registration_date -> Nullable<Timestamptz>,
        last_modified -> Nullable<Timestamptz>,
        fetched_date -> Timestamptz,
        team_info -> Jsonb,
        payment_info -> Jsonb,
        address -> Jsonb,
        additional_data -> Jsonb,
        raw_payload -> Jsonb,
    }
}

diesel::table! {
    sync_history (id) {
        id -> BigInt,
        partner_id -> BigInt,
        provider_id -> Text,
        provider_event_id -> Nullable<Text>,
        sync_kind -> Text,
        started_at -> Timestamptz,
        finished_at -> Nullable<Timestamptz>,
        status -> Text,
        records_seen -> BigInt,
        records_upserted -> BigInt,
        errors -> BigInt,
        reason -> Nullable<Text>,
    }
}

diesel::table! {
    backfill_checkpoints (run_id) {
        run_id -> Uuid,
        work_items -> Jsonb,
        last_completed_index -> BigInt,
        in_progress_cursor -> Nullable<Text>,
        updated_at -> Timestamptz,
    }
}
