//! Failed-login throttling
//!
//! Counts failed credential checks per key (normally the normalized email).
//! Once a key reaches the configured number of failures inside the window it is
//! locked out until the lockout elapses. A successful login clears the key.
//! Keys whose window and lockout have both passed are swept on every failure,
//! and the table never holds more than `max_tracked_keys` entries.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::info;

/// Rate limiter configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Failures allowed inside one window
    pub max_failures: u32,
    /// Time window in seconds
    pub window_seconds: u64,
    /// Lockout duration in seconds
    pub lockout_seconds: u64,
    /// Upper bound on keys tracked at once
    pub max_tracked_keys: usize,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            window_seconds: 300,   // 5 minutes
            lockout_seconds: 3600, // 1 hour
            max_tracked_keys: 10_000,
        }
    }
}

#[derive(Debug)]
struct RateLimiterEntry {
    failures: u32,
    window_started: Instant,
    locked_until: Option<Instant>,
}

impl RateLimiterEntry {
    /// When this entry stops mattering
    fn expires_at(&self, window: Duration) -> Instant {
        match self.locked_until {
            Some(until) => until.max(self.window_started + window),
            None => self.window_started + window,
        }
    }
}

/// Rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    entries: Arc<Mutex<HashMap<String, RateLimiterEntry>>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Whether the key may attempt a login right now
    pub async fn is_allowed(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let Some(locked_until) = entries.get(key).map(|entry| entry.locked_until) else {
            return true;
        };

        match locked_until {
            Some(until) if now < until => false,
            Some(_) => {
                entries.remove(key);
                true
            }
            None => true,
        }
    }

    /// Record a failed login for the key
    pub async fn record_failure(&self, key: &str) {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let window = Duration::from_secs(self.config.window_seconds);

        entries.retain(|tracked, entry| tracked == key || entry.expires_at(window) > now);

        if !entries.contains_key(key) && entries.len() >= self.config.max_tracked_keys.max(1) {
            let soonest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at(window))
                .map(|(tracked, _)| tracked.clone());
            if let Some(evicted) = soonest {
                entries.remove(&evicted);
            }
        }

        let entry = entries.entry(key.to_string()).or_insert(RateLimiterEntry {
            failures: 0,
            window_started: now,
            locked_until: None,
        });

        if now.duration_since(entry.window_started) >= window {
            entry.failures = 0;
            entry.window_started = now;
        }

        entry.failures += 1;

        if entry.failures >= self.config.max_failures && entry.locked_until.is_none() {
            entry.locked_until = Some(now + Duration::from_secs(self.config.lockout_seconds));
            info!(
                "Locked out login key {} for {} seconds",
                key, self.config.lockout_seconds
            );
        }
    }

    /// Forget the failures of a key after a successful login
    pub async fn record_success(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    /// Get the rate limiter configuration
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}
