//! Alert dispatch logic.

use crate::rate_limit::RateLimiter;
use crate::telegram::{format_alert_message, TelegramBot};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use treasury_core::Alert;
use treasury_store::{Store, StoreError};

#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("Database error: {0}")]
    Store(#[from] StoreError),
    #[error("Telegram error: {0}")]
    Telegram(#[from] crate::telegram::TelegramError),
}

/// Rate-limited alert dispatcher.
///
/// Every alert is persisted first; delivery is best-effort on top of the
/// record. Rate-limited alerts are dropped (logged, never queued or
/// retried), and a delivery failure is recorded on the alert row without
/// blocking subsequent alerts. With no bot configured the dispatcher runs
/// in record-only mode.
pub struct Notifier {
    store: Store,
    bot: Option<Arc<TelegramBot>>,
    limiter: RateLimiter,
}

impl Notifier {
    pub fn new(store: Store, bot: Option<Arc<TelegramBot>>, limiter: RateLimiter) -> Self {
        if bot.is_none() {
            info!("Telegram credentials not provided - running in record-only mode");
        }
        Self { store, bot, limiter }
    }

    /// Whether an outbound channel is configured.
    pub fn is_enabled(&self) -> bool {
        self.bot.is_some()
    }

    /// Persist and deliver an alert. Returns whether it was delivered.
    pub async fn dispatch(&self, alert: &mut Alert) -> Result<bool, NotifierError> {
        self.dispatch_at(alert, Utc::now()).await
    }

    /// [`Notifier::dispatch`] with an explicit rate-limit clock.
    pub async fn dispatch_at(
        &self,
        alert: &mut Alert,
        now: DateTime<Utc>,
    ) -> Result<bool, NotifierError> {
        alert.id = self.store.save_alert(alert).await?;

        if !self
            .limiter
            .check_and_record(alert.alert_type, &alert.entity, now)
        {
            warn!(
                "Dropped rate-limited alert: {} - {}",
                alert.alert_type.as_str(),
                alert.entity
            );
            return Ok(false);
        }

        let Some(bot) = &self.bot else {
            debug!("No outbound channel, alert {} recorded only", alert.id);
            return Ok(false);
        };

        match bot.send_alert(&format_alert_message(alert)).await {
            Ok(()) => {
                self.store.mark_alert_delivered(alert.id, true).await?;
                alert.delivered = true;
                info!(
                    "Alert delivered: {} - {}",
                    alert.alert_type.as_str(),
                    alert.entity
                );
                Ok(true)
            }
            Err(e) => {
                // Logged and recorded; never blocks the next alert
                error!("Alert delivery failed: {}", e);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::RateLimiterConfig;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use treasury_core::{AlertType, Severity};

    fn alert(entity: &str) -> Alert {
        Alert::new(
            AlertType::PriceDrop,
            entity,
            Severity::Medium,
            "Price Drop Alert",
            "test",
            Utc::now(),
        )
    }

    async fn notifier() -> Notifier {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        Notifier::new(store, None, RateLimiter::new(RateLimiterConfig::default()))
    }

    #[tokio::test]
    async fn test_record_only_mode_persists_without_delivery() {
        let notifier = notifier().await;
        let mut a = alert("VitaDAO");

        let delivered = notifier.dispatch(&mut a).await.unwrap();
        assert!(!delivered);
        assert!(a.id > 0);
        assert!(!a.delivered);
        assert_eq!(notifier.store.recent_alert_count(1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_alert_is_still_recorded() {
        let notifier = notifier().await;
        let now = Utc::now();

        let mut first = alert("VitaDAO");
        let mut second = alert("VitaDAO");
        notifier.dispatch_at(&mut first, now).await.unwrap();
        // Within min spacing for the same (type, entity)
        let delivered = notifier
            .dispatch_at(&mut second, now + Duration::seconds(5))
            .await
            .unwrap();

        assert!(!delivered);
        // Both alerts exist in the log; the second was just not sent
        assert_eq!(notifier.store.recent_alert_count(1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_hourly_cap_consumed_by_dispatches() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let notifier = Notifier::new(
            store,
            None,
            RateLimiter::new(RateLimiterConfig {
                hourly_cap: 2,
                ..Default::default()
            }),
        );
        let now = Utc::now();

        for i in 0..2 {
            let mut a = alert(&format!("dao-{i}"));
            notifier
                .dispatch_at(&mut a, now + Duration::seconds(i))
                .await
                .unwrap();
        }
        // The dispatches above consumed the whole hourly allowance
        assert!(!notifier
            .limiter
            .check_and_record(AlertType::WhaleTransfer, "probe", now + Duration::minutes(1)));
    }
}
