use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const MAX_FAILED_ATTEMPTS: usize = 5;
pub const FAILURE_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Tracked emails beyond which expired entries are swept on every failure.
const SWEEP_THRESHOLD: usize = 1024;

/// Sliding-window counter of failed logins per normalised email.
pub struct LoginThrottle {
    failures: HashMap<String, Vec<Instant>>,
    max_failures: usize,
    window: Duration,
}

impl LoginThrottle {
    pub fn new() -> Self {
        Self::with_limits(MAX_FAILED_ATTEMPTS, FAILURE_WINDOW)
    }

    pub fn with_limits(max_failures: usize, window: Duration) -> Self {
        Self {
            failures: HashMap::new(),
            max_failures,
            window,
        }
    }

    /// `Err(retry_after_secs)` while the email is locked out.
    pub fn check(&mut self, email: &str) -> Result<(), u64> {
        self.check_at(email, Instant::now())
    }

    pub fn record_failure(&mut self, email: &str) {
        self.record_failure_at(email, Instant::now());
    }

    /// A successful login clears the history.
    pub fn reset(&mut self, email: &str) {
        self.failures.remove(email);
    }

    fn check_at(&mut self, email: &str, now: Instant) -> Result<(), u64> {
        let window = self.window;
        let Some(entries) = self.failures.get_mut(email) else {
            return Ok(());
        };
        entries.retain(|ts| now.duration_since(*ts) < window);
        if entries.is_empty() {
            self.failures.remove(email);
            return Ok(());
        }
        if entries.len() >= self.max_failures {
            let oldest = entries[0];
            let remaining = window.saturating_sub(now.duration_since(oldest));
            return Err(remaining.as_secs().max(1));
        }
        Ok(())
    }

    fn record_failure_at(&mut self, email: &str, now: Instant) {
        let window = self.window;
        if self.failures.len() >= SWEEP_THRESHOLD {
            self.failures.retain(|_, entries| {
                entries.retain(|ts| now.duration_since(*ts) < window);
                !entries.is_empty()
            });
        }
        let entries = self.failures.entry(email.to_string()).or_default();
        entries.retain(|ts| now.duration_since(*ts) < window);
        entries.push(now);
    }
}

impl Default for LoginThrottle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locks_after_max_failures() {
        let mut throttle = LoginThrottle::new();
        let start = Instant::now();
        for _ in 0..MAX_FAILED_ATTEMPTS - 1 {
            throttle.record_failure_at("ana@example.com", start);
            assert!(throttle.check_at("ana@example.com", start).is_ok());
        }
        throttle.record_failure_at("ana@example.com", start);
        let retry = throttle.check_at("ana@example.com", start).unwrap_err();
        assert_eq!(retry, FAILURE_WINDOW.as_secs());
        assert!(throttle.check_at("bob@example.com", start).is_ok());
    }

    #[test]
    fn window_expiry_unlocks() {
        let mut throttle = LoginThrottle::with_limits(2, Duration::from_secs(10));
        let start = Instant::now();
        throttle.record_failure_at("ana@example.com", start);
        throttle.record_failure_at("ana@example.com", start);
        assert!(throttle.check_at("ana@example.com", start + Duration::from_secs(3)).is_err());
        assert!(throttle.check_at("ana@example.com", start + Duration::from_secs(11)).is_ok());
    }

    #[test]
    fn expired_emails_are_swept() {
        let mut throttle = LoginThrottle::with_limits(5, Duration::from_secs(10));
        let start = Instant::now();
        for i in 0..SWEEP_THRESHOLD * 2 {
            throttle.record_failure_at(&format!("user{i}@example.com"), start);
        }
        assert_eq!(throttle.failures.len(), SWEEP_THRESHOLD * 2);

        throttle.record_failure_at("ana@example.com", start + Duration::from_secs(11));
        assert_eq!(throttle.failures.len(), 1);
        assert!(throttle.failures.contains_key("ana@example.com"));
    }

    #[test]
    fn sweep_keeps_live_lockouts() {
        let mut throttle = LoginThrottle::with_limits(1, Duration::from_secs(60));
        let start = Instant::now();
        throttle.record_failure_at("ana@example.com", start + Duration::from_secs(30));
        for i in 0..SWEEP_THRESHOLD {
            throttle.record_failure_at(&format!("user{i}@example.com"), start);
        }
        let later = start + Duration::from_secs(61);
        throttle.record_failure_at("bob@example.com", later);
        assert!(throttle.check_at("ana@example.com", later).is_err());
        assert_eq!(throttle.failures.len(), 2);
    }

    #[test]
    fn reset_clears_failures() {
        let mut throttle = LoginThrottle::with_limits(1, Duration::from_secs(60));
        throttle.record_failure("ana@example.com");
        assert!(throttle.check("ana@example.com").is_err());
        throttle.reset("ana@example.com");
        assert!(throttle.check("ana@example.com").is_ok());
    }
}
