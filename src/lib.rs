//! Research search: a cascading search layer over AI and web providers
//!
//! A request is tried against an LLM suggestion provider, a retrieval answer
//! provider and a web search provider, in that order. Calls are cached and
//! rate limited per provider, users are held to daily quotas, and when every
//! provider is unavailable the caller still receives clearly marked offline
//! preview results.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod fallback;
pub mod metrics;
pub mod network;
pub mod providers;
pub mod quota;
pub mod ratelimit;
pub mod search;
pub mod users;
pub mod web;

pub use config::Settings;
pub use error::{ProviderError, SearchError};
pub use search::{SearchOutcome, SearchParams, SearchRequest, SearchService};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
