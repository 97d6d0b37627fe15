//! The provider adapter contract (§4.1).
//!
//! One [`ProviderAdapter`] implementation per third-party provider
//! translates that provider's REST API into the canonical [`Event`],
//! [`Race`], and [`Participant`] types. Pagination is hidden behind a lazy,
//! resumable sequence (§9: "coroutine/async flavour") so that a
//! [`EngineError::RateLimited`] raised mid-page can be caught by the caller,
//! handled by the rate limiter, and the same sequence resumed without
//! restarting from page one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine_core::prelude::*;

/// One page of participants plus whatever the adapter needs to fetch the
/// next page. Adapters that paginate by offset/token store that state
/// internally and return `None` once exhausted.
#[derive(Debug, Clone)]
pub struct ParticipantPage {
    pub participants: Vec<RowResult<Participant>>,
    pub has_more: bool,
}

/// Capability-set trait implemented once per provider (§9: "adapter
/// polymorphism" — a trait + factory, not a deep class hierarchy).
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable identifier matching `providers.provider_id` (e.g. `"runsignup"`).
    fn provider_name(&self) -> &str;

    /// Exchanges credential material for whatever session/token state the
    /// provider's API requires. Must be safe to call repeatedly; most
    /// adapters are stateless here and simply validate the credential.
    async fn authenticate(&self, credential: &ProviderCredential) -> Result<()>;

    /// Every event visible to this credential. Used by discovery (§4.5) and
    /// by backfill; pagination is handled internally by the adapter.
    async fn list_events(&self, credential: &ProviderCredential) -> Result<Vec<Event>>;

    /// Every race belonging to one event.
    async fn list_races(&self, credential: &ProviderCredential, event: &Event) -> Result<Vec<Race>>;

    /// Fetches one page of participants for a race. `since` is `None` for a
    /// full sync and `Some(watermark)` for an incremental sync. `cursor` is
    /// `None` to start from the beginning and `Some(_)` to resume a sequence
    /// that was interrupted by a `RateLimited` error.
    async fn list_participants(
        &self,
        credential: &ProviderCredential,
        race: &Race,
        event: &Event,
        since: Option<DateTime<Utc>>,
        cursor: Option<String>,
    ) -> Result<(ParticipantPage, Option<String>)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_page_tracks_has_more() {
        let page = ParticipantPage {
            participants: vec![],
            has_more: false,
        };
        assert!(!page.has_more);
    }
}
