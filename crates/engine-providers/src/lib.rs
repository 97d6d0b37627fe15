//! # Engine Providers
//!
//! The provider adapter contract (§4.1), the concrete per-provider HTTP
//! adapters, the provider factory, and the shared token-bucket rate limiter
//! (§4.2).
//!
//! ## Core Concepts
//!
//! - [`adapter::ProviderAdapter`] — capability-set trait every provider
//!   implements
//! - [`providers`] — RunSignUp, Haku, Race Roster, Let's Do This, and
//!   ChronoTrack implementations
//! - [`factory::ProviderFactory`] — resolves a provider id to its adapter
//! - [`rate_limiter::RateLimiter`] — per-credential token bucket

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod adapter;
pub mod factory;
pub mod http_support;
pub mod normalize;
pub mod providers;
pub mod rate_limiter;

pub use adapter::{ParticipantPage, ProviderAdapter};
pub use factory::{ProviderBaseUrls, ProviderFactory};
pub use rate_limiter::RateLimiter;

/// Current version of engine-providers.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    pub use crate::adapter::{ParticipantPage, ProviderAdapter};
    pub use crate::factory::{ProviderBaseUrls, ProviderFactory};
    pub use crate::rate_limiter::RateLimiter;
    pub use engine_core::prelude::*;
}
