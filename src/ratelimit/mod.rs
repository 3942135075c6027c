//! Fixed-window rate limiting for outbound provider calls
//!
//! Each provider gets one [`RateLimiter`] shared by every request in the
//! process. A window opens on the first call and lasts 60 seconds; calls
//! beyond the ceiling inside that window are refused. Bursts at window
//! boundaries are accepted.

use crate::clock::{self, Clock};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

/// Length of one counting window
pub const WINDOW_SECONDS: i64 = 60;

/// Default ceiling per window
pub const DEFAULT_CEILING: u32 = 60;

/// Counter state for the current window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateWindow {
    pub request_count: u32,
    pub window_start: Option<DateTime<Utc>>,
}

/// Fixed-window call counter
pub struct RateLimiter {
    ceiling: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<RateWindow>,
}

impl RateLimiter {
    /// Create a limiter allowing `ceiling` calls per 60-second window
    pub fn new(ceiling: u32) -> Self {
        Self::with_clock(ceiling, clock::system())
    }

    /// Create a limiter reading time from `clock`
    pub fn with_clock(ceiling: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            ceiling,
            window: Duration::seconds(WINDOW_SECONDS),
            clock,
            state: Mutex::new(RateWindow::default()),
        }
    }

    /// Record a call if the current window has room.
    ///
    /// Refused calls are not counted.
    pub fn allow(&self) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let expired = match state.window_start {
            Some(start) => now - start > self.window,
            None => true,
        };
        if expired {
            state.window_start = Some(now);
            state.request_count = 0;
        }

        if state.request_count >= self.ceiling {
            debug!(
                "Rate window full ({}/{}), refusing call",
                state.request_count, self.ceiling
            );
            return false;
        }

        state.request_count += 1;
        true
    }

    /// Snapshot of the current window
    pub fn window(&self) -> RateWindow {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Configured ceiling
    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("ceiling", &self.ceiling)
            .field("window", &self.window())
            .finish()
    }
}

/// Process-wide limiters keyed by provider name
pub struct RateLimiterRegistry {
    clock: Arc<dyn Clock>,
    limiters: RwLock<HashMap<String, Arc<RateLimiter>>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::with_clock(clock::system())
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            limiters: RwLock::new(HashMap::new()),
        }
    }

    /// Get the limiter for a provider, creating it on first use.
    ///
    /// The ceiling only applies when the limiter is created.
    pub fn get_or_create(&self, provider: &str, ceiling: u32) -> Arc<RateLimiter> {
        if let Some(limiter) = self
            .limiters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(provider)
        {
            return limiter.clone();
        }

        let mut limiters = self.limiters.write().unwrap_or_else(|e| e.into_inner());
        limiters
            .entry(provider.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::with_clock(ceiling, self.clock.clone())))
            .clone()
    }

    /// Look up an existing limiter
    pub fn get(&self, provider: &str) -> Option<Arc<RateLimiter>> {
        self.limiters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(provider)
            .cloned()
    }
}

impl Default for RateLimiterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
