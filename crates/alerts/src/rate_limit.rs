//! In-memory alert rate limiting.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{debug, warn};
use treasury_core::AlertType;

/// Rate limit thresholds.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Minimum spacing between alerts sharing (type, entity).
    pub min_spacing: Duration,
    /// Cap on alerts per rolling hour, all types combined.
    pub hourly_cap: usize,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            min_spacing: Duration::seconds(30),
            hourly_cap: 20,
        }
    }
}

/// Sliding-window rate limiter.
///
/// Alerts over either limit are dropped, not queued: the caller gets a
/// plain refusal and nothing is retried later. State is in-memory and
/// owned by the dispatcher, not process-global.
pub struct RateLimiter {
    config: RateLimiterConfig,
    last_by_key: DashMap<(AlertType, String), DateTime<Utc>>,
    history: Mutex<VecDeque<DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            last_by_key: DashMap::new(),
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Whether an alert may go out now. Records the send when allowed.
    pub fn check_and_record(
        &self,
        alert_type: AlertType,
        entity: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let key = (alert_type, entity.to_string());
        if let Some(last) = self.last_by_key.get(&key) {
            if now - *last < self.config.min_spacing {
                debug!("Rate limited: {} for {}", alert_type.as_str(), entity);
                return false;
            }
        }

        let mut history = self.history.lock().unwrap();
        let hour_ago = now - Duration::hours(1);
        while history.front().is_some_and(|t| *t <= hour_ago) {
            history.pop_front();
        }
        if history.len() >= self.config.hourly_cap {
            warn!(
                "Hourly alert limit reached ({}), dropping {} for {}",
                self.config.hourly_cap,
                alert_type.as_str(),
                entity
            );
            return false;
        }

        history.push_back(now);
        drop(history);
        self.last_by_key.insert(key, now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_per_key_spacing() {
        let limiter = RateLimiter::new(RateLimiterConfig::default());
        let now = Utc::now();

        assert!(limiter.check_and_record(AlertType::WhaleTransfer, "VitaDAO", now));
        // Same key 10s later: blocked
        assert!(!limiter.check_and_record(
            AlertType::WhaleTransfer,
            "VitaDAO",
            now + Duration::seconds(10)
        ));
        // Different type or entity is a different key
        assert!(limiter.check_and_record(
            AlertType::PriceDrop,
            "VitaDAO",
            now + Duration::seconds(10)
        ));
        assert!(limiter.check_and_record(
            AlertType::WhaleTransfer,
            "BIO Protocol",
            now + Duration::seconds(11)
        ));
        // Same key again after the spacing elapsed
        assert!(limiter.check_and_record(
            AlertType::WhaleTransfer,
            "VitaDAO",
            now + Duration::seconds(31)
        ));
    }

    #[test]
    fn test_hourly_cap_drops_twenty_first() {
        let limiter = RateLimiter::new(RateLimiterConfig::default());
        let now = Utc::now();

        let mut allowed = 0;
        for i in 0..21 {
            // Distinct entities so per-key spacing never interferes
            if limiter.check_and_record(
                AlertType::PriceDrop,
                &format!("dao-{i}"),
                now + Duration::seconds(i),
            ) {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 20);
    }

    #[test]
    fn test_hourly_window_slides() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            hourly_cap: 2,
            ..Default::default()
        });
        let now = Utc::now();

        assert!(limiter.check_and_record(AlertType::PriceDrop, "a", now));
        assert!(limiter.check_and_record(AlertType::PriceDrop, "b", now + Duration::seconds(1)));
        assert!(!limiter.check_and_record(AlertType::PriceDrop, "c", now + Duration::seconds(2)));

        // An hour later the early entries have left the window
        assert!(limiter.check_and_record(
            AlertType::PriceDrop,
            "d",
            now + Duration::minutes(61)
        ));
    }
}
