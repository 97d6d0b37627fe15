//! Tenant and credential types.
//!
//! Both are externally managed: other services own the rows in
//! `timing_partners` and `partner_provider_credentials`. The engine only
//! reads them.

use serde::{Deserialize, Serialize};

/// A tenant of the race-timing platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimingPartner {
    pub partner_id: i64,
    pub name: String,
}

/// Per-(partner, provider) authentication material.
///
/// `Debug` is hand-implemented to redact `secret` — this type ends up in
/// logs and error contexts and must never leak credential material.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderCredential {
    pub partner_id: i64,
    pub provider_id: String,
    pub principal: String,
    pub secret: String,
    pub additional_config: serde_json::Value,
    pub active: bool,
}

impl std::fmt::Debug for ProviderCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredential")
            .field("partner_id", &self.partner_id)
            .field("provider_id", &self.provider_id)
            .field("principal", &self.principal)
            .field("secret", &"[redacted]")
            .field("additional_config", &self.additional_config)
            .field("active", &self.active)
            .finish()
    }
}
