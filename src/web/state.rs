//! Application state shared across handlers

use crate::config::Settings;
use crate::search::SearchService;
use crate::users::UserDirectory;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::debug;

/// Per-user limiter guarding the search endpoint
pub type EndpointLimiter = DefaultKeyedRateLimiter<String>;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SearchService>,
    pub directory: Arc<dyn UserDirectory>,
    pub search_limiter: Arc<EndpointLimiter>,
}

impl AppState {
    pub fn new(service: SearchService, directory: Arc<dyn UserDirectory>) -> Self {
        let per_minute = NonZeroU32::new(service.settings().server.search_requests_per_minute)
            .unwrap_or(NonZeroU32::MIN);

        Self {
            service: Arc::new(service),
            directory,
            search_limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute))),
        }
    }

    /// Drop endpoint limiter entries whose window has fully recovered
    pub fn prune_limiters(&self) {
        self.search_limiter.retain_recent();
        self.search_limiter.shrink_to_fit();
        debug!("{} users tracked by the search limiter", self.search_limiter.len());
    }

    pub fn settings(&self) -> &Settings {
        self.service.settings()
    }

    pub fn instance_name(&self) -> &str {
        &self.settings().general.instance_name
    }
}
