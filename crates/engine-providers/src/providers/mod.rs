//! Concrete per-provider [`ProviderAdapter`](crate::adapter::ProviderAdapter)
//! implementations.
//!
//! Each provider gets its own module because each disagrees on pagination
//! scheme, response envelope shape, and auth scheme — exactly the kind of
//! per-provider quirk §4.1 calls out. Shared behaviour (currency/date
//! normalization, field truncation) lives in [`crate::normalize`] and
//! [`engine_core::models::participant`] instead of being duplicated here.

pub mod chronotrack;
pub mod haku;
pub mod lets_do_this;
pub mod race_roster;
pub mod runsignup;

pub use chronotrack::ChronoTrackAdapter;
pub use haku::HakuAdapter;
pub use lets_do_this::LetsDoThisAdapter;
pub use race_roster::RaceRosterAdapter;
pub use runsignup::RunSignUpAdapter;
