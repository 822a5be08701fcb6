// src/cache/rate_limit.rs
//! Per-domain memory of 429/503 answers so fetchers can back off.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

use crate::clock::{Clock, SystemClock};

/// Back-off used when the server sent no usable `Retry-After`.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub status: u16,
    pub recorded_at: DateTime<Utc>,
    pub retry_after_secs: u64,
    /// How many times this domain has been recorded (survives re-records).
    pub hit_count: u32,
}

impl RateLimitRecord {
    pub fn wait_until(&self) -> DateTime<Utc> {
        let secs = i64::try_from(self.retry_after_secs).unwrap_or(i64::MAX);
        chrono::Duration::try_seconds(secs)
            .and_then(|d| self.recorded_at.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

pub struct RateLimitCache {
    clock: Arc<dyn Clock>,
    inner: Mutex<HashMap<String, RateLimitRecord>>,
}

impl Default for RateLimitCache {
    fn default() -> Self {
        Self::new()
    }
}

fn domain_key(domain: &str) -> String {
    domain.trim().to_ascii_lowercase()
}

impl RateLimitCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RateLimitRecord>> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Remember a rate-limit answer; `retry_after = None` means 60 s.
    pub fn record(&self, domain: &str, status: u16, retry_after: Option<Duration>) {
        let key = domain_key(domain);
        let now = self.clock.now();
        let mut g = self.lock();
        let hit_count = g.get(&key).map(|r| r.hit_count).unwrap_or(0) + 1;
        let retry_after_secs = retry_after
            .map(|d| d.as_secs())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        debug!(target: "cache", domain = %key, status, retry_after_secs, hit_count, "rate limit recorded");
        g.insert(
            key,
            RateLimitRecord {
                status,
                recorded_at: now,
                retry_after_secs,
                hit_count,
            },
        );
    }

    pub fn is_rate_limited(&self, domain: &str) -> bool {
        let now = self.clock.now();
        self.lock()
            .get(&domain_key(domain))
            .map(|r| now < r.wait_until())
            .unwrap_or(false)
    }

    /// Remaining back-off (whole seconds); zero when not limited.
    pub fn wait_time(&self, domain: &str) -> Duration {
        let now = self.clock.now();
        self.lock()
            .get(&domain_key(domain))
            .map(|r| (r.wait_until() - now).num_seconds().max(0) as u64)
            .map(Duration::from_secs)
            .unwrap_or(Duration::ZERO)
    }

    pub fn hit_count(&self, domain: &str) -> u32 {
        self.lock()
            .get(&domain_key(domain))
            .map(|r| r.hit_count)
            .unwrap_or(0)
    }

    pub fn get(&self, domain: &str) -> Option<RateLimitRecord> {
        self.lock().get(&domain_key(domain)).cloned()
    }

    /// Forget domains whose back-off is over; returns how many.
    pub fn clear_expired(&self) -> usize {
        let now = self.clock.now();
        let mut g = self.lock();
        let before = g.len();
        g.retain(|_, r| now < r.wait_until());
        before - g.len()
    }
}
