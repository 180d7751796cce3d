//! Fixed-window rate limiting keyed by client address.
//!
//! Best-effort only: counters live in process memory, are not shared between
//! instances and reset on restart.

use crate::config::RateLimitConfig;
use crate::utils::error::{RelayError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    count: u32,
}

#[derive(Debug, Default)]
struct WindowTable {
    windows: HashMap<String, Window>,
    last_purge: Option<Instant>,
}

impl WindowTable {
    /// Drops expired keys once the table is large, at most once per window.
    fn purge_stale(&mut self, now: Instant, window: Duration, threshold: usize) {
        if self.windows.len() < threshold {
            return;
        }
        if let Some(last) = self.last_purge {
            if now.saturating_duration_since(last) < window {
                return;
            }
        }

        self.windows
            .retain(|_, w| now.saturating_duration_since(w.started_at) < window);
        self.last_purge = Some(now);
    }
}

#[derive(Clone)]
pub struct FixedWindowLimiter {
    enabled: bool,
    max_requests: u32,
    window: Duration,
    purge_threshold: usize,
    table: Arc<Mutex<WindowTable>>,
}

impl FixedWindowLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_requests: config.max_requests,
            window: Duration::from_secs(config.window_seconds.max(1)),
            purge_threshold: config.purge_threshold.max(1),
            table: Arc::new(Mutex::new(WindowTable::default())),
        }
    }

    /// Records a request for `key` and rejects it once the window is full.
    pub fn check(&self, key: &str) -> Result<()> {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        // counters stay valid after a poisoned lock
        let mut table = self
            .table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        table.purge_stale(now, self.window, self.purge_threshold);

        let entry = table.windows.entry(key.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });

        if now.saturating_duration_since(entry.started_at) >= self.window {
            entry.started_at = now;
            entry.count = 0;
        }

        if entry.count >= self.max_requests {
            let elapsed = now.saturating_duration_since(entry.started_at);
            let remaining = self.window.saturating_sub(elapsed);
            // round up so clients never retry inside the same window
            let retry_after_secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
            return Err(RelayError::RateLimited {
                retry_after_secs: retry_after_secs.max(1),
            });
        }

        entry.count += 1;
        Ok(())
    }

    pub fn tracked_keys(&self) -> usize {
        self.table
            .lock()
            .map(|t| t.windows.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().windows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_seconds: u64) -> FixedWindowLimiter {
        FixedWindowLimiter::new(&RateLimitConfig {
            enabled: true,
            max_requests,
            window_seconds,
            purge_threshold: 100,
        })
    }

    #[test]
    fn test_ratelimit_allows_up_to_max() {
        let limiter = limiter(3, 60);
        let now = Instant::now();
        assert!(limiter.check_at("10.0.0.1", now).is_ok());
        assert!(limiter.check_at("10.0.0.1", now).is_ok());
        assert!(limiter.check_at("10.0.0.1", now).is_ok());

        let err = limiter.check_at("10.0.0.1", now).unwrap_err();
        match err {
            RelayError::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, 60),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_ratelimit_different_keys_independent() {
        let limiter = limiter(1, 60);
        let now = Instant::now();
        assert!(limiter.check_at("key_a", now).is_ok());
        assert!(limiter.check_at("key_b", now).is_ok());
        assert!(limiter.check_at("key_a", now).is_err());
        assert!(limiter.check_at("key_b", now).is_err());
    }

    #[test]
    fn test_ratelimit_resets_after_window() {
        let limiter = limiter(1, 10);
        let start = Instant::now();
        assert!(limiter.check_at("client", start).is_ok());
        assert!(limiter
            .check_at("client", start + Duration::from_secs(9))
            .is_err());
        assert!(limiter
            .check_at("client", start + Duration::from_secs(10))
            .is_ok());
    }

    #[test]
    fn test_retry_after_counts_remaining_time() {
        let limiter = limiter(1, 10);
        let start = Instant::now();
        limiter.check_at("client", start).unwrap();
        let err = limiter
            .check_at("client", start + Duration::from_millis(7_500))
            .unwrap_err();
        assert!(matches!(err, RelayError::RateLimited { retry_after_secs: 3 }));
    }

    #[test]
    fn test_disabled_limiter_admits_everything() {
        let limiter = FixedWindowLimiter::new(&RateLimitConfig {
            enabled: false,
            max_requests: 1,
            window_seconds: 60,
            purge_threshold: 10,
        });
        for _ in 0..10 {
            assert!(limiter.check("client").is_ok());
        }
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_stale_entries_are_purged() {
        let limiter = FixedWindowLimiter::new(&RateLimitConfig {
            enabled: true,
            max_requests: 5,
            window_seconds: 1,
            purge_threshold: 2,
        });
        let start = Instant::now();
        limiter.check_at("a", start).unwrap();
        limiter.check_at("b", start).unwrap();
        assert_eq!(limiter.tracked_keys(), 2);

        limiter
            .check_at("c", start + Duration::from_secs(2))
            .unwrap();
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn test_purge_runs_at_most_once_per_window() {
        let limiter = FixedWindowLimiter::new(&RateLimitConfig {
            enabled: true,
            max_requests: 5,
            window_seconds: 10,
            purge_threshold: 2,
        });
        let start = Instant::now();
        limiter.check_at("a", start).unwrap();
        limiter.check_at("b", start + Duration::from_secs(9)).unwrap();

        // "a" expired and is dropped
        limiter.check_at("c", start + Duration::from_secs(10)).unwrap();
        assert_eq!(limiter.tracked_keys(), 2);

        // "b" has expired too, but the last purge was less than a window ago
        limiter.check_at("d", start + Duration::from_secs(19)).unwrap();
        assert_eq!(limiter.tracked_keys(), 3);

        limiter.check_at("e", start + Duration::from_secs(20)).unwrap();
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn test_clones_share_counters() {
        let limiter1 = limiter(1, 60);
        let limiter2 = limiter1.clone();
        let now = Instant::now();
        assert!(limiter1.check_at("shared", now).is_ok());
        assert!(limiter2.check_at("shared", now).is_err());
    }
}
