use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use super::AuthError;

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window RPM limiter keyed by `api_key.id`. In-process only (per
/// spec.md §9, acceptable for the single-writer deployment this core
/// targets); multi-process would need a shared counter table or Redis.
#[derive(Default)]
pub struct RateLimiter {
    windows: DashMap<Uuid, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, key: Uuid, rate_limit_rpm: i32) -> Result<(), AuthError> {
        let now = Instant::now();
        let mut window = self.windows.entry(key).or_default();

        while let Some(&oldest) = window.front() {
            if now.duration_since(oldest) >= WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() as i32 >= rate_limit_rpm {
            let oldest = *window.front().expect("window non-empty when at capacity");
            let remaining = WINDOW.saturating_sub(now.duration_since(oldest));
            let retry_after_secs = remaining.as_secs_f64().ceil() as i64;
            return Err(AuthError::RateLimited {
                retry_after_secs: retry_after_secs.max(1),
            });
        }

        window.push_back(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_requests_under_the_limit() {
        let limiter = RateLimiter::new();
        let key = Uuid::new_v4();
        for _ in 0..5 {
            assert!(limiter.check(key, 5).is_ok());
        }
    }

    #[test]
    fn rejects_the_request_that_exceeds_the_limit() {
        let limiter = RateLimiter::new();
        let key = Uuid::new_v4();
        for _ in 0..3 {
            assert!(limiter.check(key, 3).is_ok());
        }
        let err = limiter.check(key, 3).unwrap_err();
        matches!(err, AuthError::RateLimited { .. });
    }

    #[test]
    fn separate_keys_have_independent_windows() {
        let limiter = RateLimiter::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        for _ in 0..2 {
            assert!(limiter.check(a, 2).is_ok());
        }
        assert!(limiter.check(a, 2).is_err());
        assert!(limiter.check(b, 2).is_ok());
    }
}
