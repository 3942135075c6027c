//! Per-user daily search quotas
//!
//! Counters reset lazily at the UTC date boundary. A quota check never writes:
//! the rollover is only persisted when a search is actually recorded.

use crate::clock::{self, Clock};
use crate::error::SearchError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Daily limit meaning "no limit"
pub const UNLIMITED: i64 = -1;

/// Subscription tier of a user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Pro,
    Enterprise,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(format!("unknown tier: {}", other)),
        }
    }
}

/// Search counter stored on the user record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaState {
    pub searches_today: u32,
    pub last_search_date: Option<DateTime<Utc>>,
}

impl QuotaState {
    pub fn new(searches_today: u32, last_search_date: Option<DateTime<Utc>>) -> Self {
        Self {
            searches_today,
            last_search_date,
        }
    }
}

/// Evaluates and advances [`QuotaState`] against a tier limit
#[derive(Clone)]
pub struct QuotaGuard {
    clock: Arc<dyn Clock>,
}

impl QuotaGuard {
    pub fn new() -> Self {
        Self::with_clock(clock::system())
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }

    fn is_stale(&self, quota: &QuotaState) -> bool {
        match quota.last_search_date {
            Some(last) => last.date_naive() < self.today(),
            None => true,
        }
    }

    /// Searches counted against today, after any pending rollover
    pub fn searches_today(&self, quota: &QuotaState) -> u32 {
        if self.is_stale(quota) {
            0
        } else {
            quota.searches_today
        }
    }

    /// Whether one more search fits under `tier_limit`.
    ///
    /// Negative limits are unlimited.
    pub fn can_search(&self, quota: &QuotaState, tier_limit: i64) -> bool {
        if tier_limit < 0 {
            return true;
        }
        i64::from(self.searches_today(quota)) < tier_limit
    }

    /// Fail with `QuotaExceeded` when no search is left today
    pub fn check(&self, quota: &QuotaState, tier_limit: i64) -> Result<(), SearchError> {
        if self.can_search(quota, tier_limit) {
            Ok(())
        } else {
            debug!(
                "Quota exhausted: {} of {} searches used today",
                self.searches_today(quota),
                tier_limit
            );
            Err(SearchError::QuotaExceeded { limit: tier_limit })
        }
    }

    /// Count one search, rolling the counter over first if the day changed
    pub fn record_search(&self, quota: QuotaState) -> QuotaState {
        QuotaState {
            searches_today: self.searches_today(&quota).saturating_add(1),
            last_search_date: Some(self.clock.now()),
        }
    }

    /// Check and count in one step; the caller holds whatever lock guards `quota`
    pub fn try_record(&self, quota: QuotaState, tier_limit: i64) -> Result<QuotaState, SearchError> {
        self.check(&quota, tier_limit)?;
        Ok(self.record_search(quota))
    }

    /// Searches left today, `None` when unlimited
    pub fn remaining(&self, quota: &QuotaState, tier_limit: i64) -> Option<u32> {
        if tier_limit < 0 {
            return None;
        }
        let limit = u32::try_from(tier_limit).unwrap_or(u32::MAX);
        Some(limit.saturating_sub(self.searches_today(quota)))
    }
}

impl Default for QuotaGuard {
    fn default() -> Self {
        Self::new()
    }
}
