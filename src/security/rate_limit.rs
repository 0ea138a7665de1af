use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::ExecError;

/// Per-key sliding-window rate limiter.
///
/// A rejected check does not consume a slot; only admitted executions are
/// recorded against the window.
pub struct SlidingWindowRateLimiter {
    max: usize,
    window: Duration,
    hits: DashMap<String, Mutex<VecDeque<Instant>>>,
}

impl SlidingWindowRateLimiter {
    pub fn new(max: usize, window: Duration) -> Self {
        Self {
            max,
            window,
            hits: DashMap::new(),
        }
    }

    /// Admit one execution for `key`, or reject without consuming a slot.
    pub fn check_and_record(&self, key: &str) -> Result<(), ExecError> {
        let now = Instant::now();
        let entry = self
            .hits
            .entry(key.to_string())
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut window = entry.lock();
        while let Some(front) = window.front() {
            if now.duration_since(*front) >= self.window {
                window.pop_front();
            } else {
                break;
            }
        }
        if window.len() >= self.max {
            return Err(ExecError::RateLimit {
                variable: key.to_string(),
                max: self.max,
                window_secs: self.window.as_secs(),
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
    fn test_admits_up_to_max() {
        let limiter = SlidingWindowRateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.check_and_record("a").is_ok());
        assert!(limiter.check_and_record("a").is_ok());
        assert!(limiter.check_and_record("a").is_ok());
        let err = limiter.check_and_record("a").unwrap_err();
        assert_eq!(err.kind(), "rate_limit_error");
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = SlidingWindowRateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check_and_record("a").is_ok());
        assert!(limiter.check_and_record("b").is_ok());
        assert!(limiter.check_and_record("a").is_err());
    }

    #[test]
    fn test_rejection_does_not_consume() {
        let limiter = SlidingWindowRateLimiter::new(2, Duration::from_millis(100));
        assert!(limiter.check_and_record("a").is_ok());
        assert!(limiter.check_and_record("a").is_ok());
        // rejections while the window is full
        for _ in 0..10 {
            assert!(limiter.check_and_record("a").is_err());
        }
        // after the window slides, exactly the original two expire, so two
        // slots open; the rejected attempts left no trace
        std::thread::sleep(Duration::from_millis(120));
        assert!(limiter.check_and_record("a").is_ok());
        assert!(limiter.check_and_record("a").is_ok());
        assert!(limiter.check_and_record("a").is_err());
    }

    #[test]
    fn test_window_slides() {
        let limiter = SlidingWindowRateLimiter::new(1, Duration::from_millis(50));
        assert!(limiter.check_and_record("a").is_ok());
        assert!(limiter.check_and_record("a").is_err());
        std::thread::sleep(Duration::from_millis(70));
        assert!(limiter.check_and_record("a").is_ok());
    }
}
