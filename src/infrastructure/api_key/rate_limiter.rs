//! Per-key request rate limiting
//!
//! Sliding one-minute window over request timestamps. The limiter is an
//! owned piece of state injected into the service; independent service
//! instances (and tests) each get their own.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

const WINDOW: Duration = Duration::from_secs(60);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Result of a rate limit check
#[derive(Debug, Clone, Copy)]
pub struct RateLimitResult {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Remaining requests in the current window
    pub remaining: u32,
    /// Per-minute limit that applied
    pub limit: u32,
}

/// Sliding-window rate limiter keyed by API key ID.
#[derive(Debug)]
pub struct RateLimiter {
    records: Arc<RwLock<HashMap<String, Vec<Instant>>>>,
    last_cleanup: Arc<RwLock<Instant>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            last_cleanup: Arc::new(RwLock::new(Instant::now())),
        }
    }

    /// Check the window and record the request when allowed, in one
    /// critical section.
    pub async fn check_and_record(&self, key_id: &str, per_minute: u32) -> RateLimitResult {
        self.maybe_cleanup().await;

        let now = Instant::now();
        let cutoff = now.checked_sub(WINDOW).unwrap_or(now);

        let mut records = self.records.write().await;
        let timestamps = records.entry(key_id.to_string()).or_default();
        timestamps.retain(|t| *t >= cutoff);

        let count = timestamps.len() as u32;

        if count >= per_minute {
            return RateLimitResult {
                allowed: false,
                remaining: 0,
                limit: per_minute,
            };
        }

        timestamps.push(now);

        RateLimitResult {
            allowed: true,
            remaining: per_minute.saturating_sub(count + 1),
            limit: per_minute,
        }
    }

    /// Drop the window for a key, e.g. on revocation.
    pub async fn reset(&self, key_id: &str) {
        let mut records = self.records.write().await;
        records.remove(key_id);
    }

    async fn maybe_cleanup(&self) {
        let due = {
            let last = self.last_cleanup.read().await;
            last.elapsed() >= CLEANUP_INTERVAL
        };

        if !due {
            return;
        }

        let mut last = self.last_cleanup.write().await;
        *last = Instant::now();

        let now = Instant::now();
        let cutoff = now.checked_sub(WINDOW).unwrap_or(now);

        let mut records = self.records.write().await;

        for timestamps in records.values_mut() {
            timestamps.retain(|t| *t >= cutoff);
        }

        records.retain(|_, v| !v.is_empty());
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
