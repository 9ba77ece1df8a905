use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

/// Per-project limiter for start, restart and install, using a fixed window.
pub struct ActionRateLimiter {
    /// project_id -> (count, window_start)
    entries: DashMap<Uuid, (u32, Instant)>,
    limit: u32,
    window: Duration,
}

impl ActionRateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            limit,
            window,
        }
    }

    /// Count one action. Returns Ok(()) or Err with retry-after seconds.
    pub fn check(&self, project_id: Uuid) -> Result<(), u64> {
        let now = Instant::now();

        let mut entry = self.entries.entry(project_id).or_insert((0, now));
        let (count, start) = entry.value_mut();

        if now.duration_since(*start) > self.window {
            *count = 1;
            *start = now;
            return Ok(());
        }

        if *count >= self.limit {
            let elapsed = now.duration_since(*start).as_secs();
            return Err(self.window.as_secs().saturating_sub(elapsed));
        }

        *count += 1;
        Ok(())
    }

    pub fn cleanup(&self) {
        let now = Instant::now();
        self.entries
            .retain(|_, (_, start)| now.duration_since(*start) < self.window);
    }
}

impl Default for ActionRateLimiter {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(60))
    }
}

/// Per-email login brute force limiter.
pub struct LoginRateLimiter {
    /// email -> (failed_count, window_start)
    entries: DashMap<String, (u32, Instant)>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Check if login attempt is allowed. 5 failures per 15 minutes.
    /// Does NOT increment the counter. Call `record_failure()` on invalid password.
    pub fn check(&self, email: &str) -> Result<(), u64> {
        let window = Duration::from_secs(15 * 60);
        let now = Instant::now();

        let entry = self.entries.get(&email.to_lowercase());
        let Some(entry) = entry else {
            return Ok(());
        };

        let (count, start) = entry.value();

        if now.duration_since(*start) > window {
            return Ok(());
        }

        if *count >= 5 {
            let elapsed = now.duration_since(*start).as_secs();
            return Err((15 * 60u64).saturating_sub(elapsed));
        }

        Ok(())
    }

    /// Record a failed login attempt. Increments the counter for the given email.
    pub fn record_failure(&self, email: &str) {
        let window = Duration::from_secs(15 * 60);
        let now = Instant::now();

        let mut entry = self.entries.entry(email.to_lowercase()).or_insert((0, now));
        let (count, start) = entry.value_mut();

        if now.duration_since(*start) > window {
            *count = 1;
            *start = now;
        } else {
            *count += 1;
        }
    }

    pub fn cleanup(&self, max_age: Duration) {
        let now = Instant::now();
        self.entries.retain(|_, (_, start)| now.duration_since(*start) < max_age);
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_are_limited_per_project() {
        let limiter = ActionRateLimiter::new(2, Duration::from_secs(60));
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();

        assert!(limiter.check(a).is_ok());
        assert!(limiter.check(a).is_ok());
        let retry = limiter.check(a).unwrap_err();
        assert!(retry <= 60);
        assert!(limiter.check(b).is_ok());
    }

    #[test]
    fn action_window_resets() {
        let limiter = ActionRateLimiter::new(1, Duration::from_millis(20));
        let id = Uuid::now_v7();
        assert!(limiter.check(id).is_ok());
        assert!(limiter.check(id).is_err());
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.check(id).is_ok());
    }

    #[test]
    fn login_failures_lock_out_case_insensitively() {
        let limiter = LoginRateLimiter::new();
        for _ in 0..5 {
            assert!(limiter.check("Owner@Example.com").is_ok());
            limiter.record_failure("owner@example.com");
        }
        assert!(limiter.check("OWNER@example.com").is_err());
        assert!(limiter.check("someone@example.com").is_ok());
    }
}
