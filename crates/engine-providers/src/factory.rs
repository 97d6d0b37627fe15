//! Provider factory (§9: "adapter polymorphism" via a capability-set trait
//! plus a factory, not a deep class hierarchy).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use engine_core::error::EngineError;

use crate::adapter::ProviderAdapter;
use crate::providers::{ChronoTrackAdapter, HakuAdapter, LetsDoThisAdapter, RaceRosterAdapter, RunSignUpAdapter};

/// Base URLs for each provider's API, read from config rather than hardcoded
/// so tests can point adapters at a local wiremock server.
#[derive(Debug, Clone)]
pub struct ProviderBaseUrls {
    pub runsignup: String,
    pub haku: String,
    pub race_roster: String,
    pub lets_do_this: String,
    pub chronotrack: String,
}

impl Default for ProviderBaseUrls {
    fn default() -> Self {
        Self {
            runsignup: "https://runsignup.com".to_string(),
            haku: "https://api.hakuapp.com".to_string(),
            race_roster: "https://raceroster.com".to_string(),
            lets_do_this: "https://api.letsdothis.com".to_string(),
            chronotrack: "https://api.chronotrack.com".to_string(),
        }
    }
}

/// Builds and caches one [`ProviderAdapter`] per provider id.
pub struct ProviderFactory {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderFactory {
    pub fn new(base_urls: ProviderBaseUrls, http_timeout: Duration) -> Self {
        let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
        adapters.insert(
            "runsignup".to_string(),
            Arc::new(RunSignUpAdapter::new(base_urls.runsignup, http_timeout)),
        );
        adapters.insert(
            "haku".to_string(),
            Arc::new(HakuAdapter::new(base_urls.haku, http_timeout)),
        );
        adapters.insert(
            "race_roster".to_string(),
            Arc::new(RaceRosterAdapter::new(base_urls.race_roster, http_timeout)),
        );
        adapters.insert(
            "lets_do_this".to_string(),
            Arc::new(LetsDoThisAdapter::new(base_urls.lets_do_this, http_timeout)),
        );
        adapters.insert(
            "chronotrack".to_string(),
            Arc::new(ChronoTrackAdapter::new(base_urls.chronotrack, http_timeout)),
        );
        Self { adapters }
    }

    pub fn get(&self, provider_id: &str) -> Result<Arc<dyn ProviderAdapter>, EngineError> {
        self.adapters
            .get(provider_id)
            .cloned()
            .ok_or_else(|| EngineError::ConfigError {
                message: format!("unknown provider id {provider_id}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_resolves_every_known_provider() {
        let factory = ProviderFactory::new(ProviderBaseUrls::default(), Duration::from_secs(30));
        for provider_id in ["runsignup", "haku", "race_roster", "lets_do_this", "chronotrack"] {
            assert!(factory.get(provider_id).is_ok());
        }
    }

    #[test]
    fn factory_rejects_unknown_provider() {
        let factory = ProviderFactory::new(ProviderBaseUrls::default(), Duration::from_secs(30));
        assert!(factory.get("nonexistent").is_err());
    }
}
