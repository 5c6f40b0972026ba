use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use chrono::{DateTime, Utc, Duration};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window_size: Duration,
    pub max_attempts: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_size: Duration::minutes(15),
            max_attempts: 5,
        }
    }
}

/// Failed attempts recorded for one key inside a fixed window.
///
/// `pending` counts logins that passed the gate and have not settled yet. They
/// spend the budget like failures until they settle.
#[derive(Debug, Clone)]
pub struct RateLimitEntry {
    pub window_start: DateTime<Utc>,
    pub attempt_count: u32,
    pub pending: u32,
}

impl RateLimitEntry {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            window_start: now,
            attempt_count: 0,
            pending: 0,
        }
    }

    fn is_expired(&self, window_size: Duration, now: DateTime<Utc>) -> bool {
        now - self.window_start >= window_size
    }

    fn spent(&self) -> u32 {
        self.attempt_count.saturating_add(self.pending)
    }

    fn is_idle(&self) -> bool {
        self.attempt_count == 0 && self.pending == 0
    }
}

/// Counts failed logins per identity key.
///
/// Every operation holds the map lock for its whole read-modify-write, so two
/// concurrent failures for the same key always land as two increments.
///
/// A login calls [`RateLimiter::try_begin`] before checking credentials and then
/// settles with exactly one of [`RateLimiter::record_failure`],
/// [`RateLimiter::clear`] or [`RateLimiter::release`]. The gate and the budget
/// share one critical section, so parallel guesses cannot outrun the limit.
pub struct RateLimiter {
    entries: Arc<Mutex<HashMap<String, RateLimitEntry>>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Live entry for `key`, restarted if its window elapsed. Unsettled
    /// reservations lapse with the window.
    fn current<'a>(
        &self,
        entries: &'a mut HashMap<String, RateLimitEntry>,
        key: &str,
        now: DateTime<Utc>,
    ) -> &'a mut RateLimitEntry {
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| RateLimitEntry::new(now));
        if entry.is_expired(self.config.window_size, now) {
            *entry = RateLimitEntry::new(now);
        }
        entry
    }

    /// False once the key has spent its budget in the current window.
    pub async fn check_allowed(&self, key: &str) -> bool {
        let now = Utc::now();
        let entries = self.entries.lock().await;

        match entries.get(key) {
            None => true,
            Some(entry) if entry.is_expired(self.config.window_size, now) => true,
            Some(entry) => entry.spent() < self.config.max_attempts,
        }
    }

    /// Reserves one attempt if the budget allows it.
    pub async fn try_begin(&self, key: &str) -> bool {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;

        let entry = self.current(&mut entries, key, now);
        if entry.spent() >= self.config.max_attempts {
            debug!(key = %key, attempts = entry.attempt_count, pending = entry.pending, "attempt refused");
            return false;
        }
        entry.pending += 1;
        true
    }

    /// Records one failure and returns the count in the current window.
    /// Settles a reservation taken by `try_begin`, if any.
    pub async fn record_failure(&self, key: &str) -> u32 {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;

        let entry = self.current(&mut entries, key, now);
        entry.pending = entry.pending.saturating_sub(1);
        entry.attempt_count = entry.attempt_count.saturating_add(1);

        if entry.attempt_count >= self.config.max_attempts {
            warn!(key = %key, attempts = entry.attempt_count, "login attempt limit reached");
        } else {
            debug!(key = %key, attempts = entry.attempt_count, "login failure recorded");
        }
        entry.attempt_count
    }

    /// Resets the failure count after a successful login and settles its
    /// reservation. Other in-flight attempts keep theirs.
    pub async fn clear(&self, key: &str) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(key) {
            entry.attempt_count = 0;
            entry.pending = entry.pending.saturating_sub(1);
            if entry.is_idle() {
                entries.remove(key);
            }
        }
    }

    /// Gives a reservation back without counting it as a failure.
    pub async fn release(&self, key: &str) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(key) {
            entry.pending = entry.pending.saturating_sub(1);
            if entry.is_idle() {
                entries.remove(key);
            }
        }
    }

    pub async fn attempts(&self, key: &str) -> u32 {
        let now = Utc::now();
        self.entries
            .lock()
            .await
            .get(key)
            .filter(|entry| !entry.is_expired(self.config.window_size, now))
            .map_or(0, |entry| entry.attempt_count)
    }

    pub async fn cleanup(&self) {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;

        // Remove windows that have elapsed
        entries.retain(|_, entry| !entry.is_expired(self.config.window_size, now));
    }
}
