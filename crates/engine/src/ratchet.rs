//! Price-threshold ratchet state machine.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{debug, info};
use treasury_core::{format_price, Alert, AlertType, Severity, TrackedToken};
use treasury_store::{Store, StoreError};

/// Ratchet tuning knobs.
#[derive(Debug, Clone)]
pub struct RatchetConfig {
    /// Drop ladder in percent, least negative first. Each level arms and
    /// cools down independently.
    pub levels: Vec<f64>,
    /// Minimum time between two alerts on the same (token, level).
    pub cooldown: Duration,
    /// Window for the first level's drop-from-recent-peak reference.
    pub peak_lookback: Duration,
    /// Rise in percent that triggers a spike alert.
    pub spike_threshold: f64,
    /// Historical sample the spike rule compares against.
    pub spike_lookback: Duration,
}

impl Default for RatchetConfig {
    fn default() -> Self {
        Self {
            levels: vec![
                -5.0, -10.0, -15.0, -20.0, -25.0, -30.0, -40.0, -50.0, -60.0, -70.0, -80.0,
                -90.0,
            ],
            cooldown: Duration::minutes(30),
            peak_lookback: Duration::hours(24),
            spike_threshold: 10.0,
            spike_lookback: Duration::hours(1),
        }
    }
}

#[derive(Debug, Clone)]
struct LevelState {
    reference_price: f64,
    last_alert: Option<DateTime<Utc>>,
}

/// Per-token multi-level drop/spike state machine.
///
/// State lives in memory only. After a restart it is rebuilt from the
/// incoming price stream, at the cost of re-triggering already-seen levels
/// once; the dispatcher's rate limits absorb that burst.
///
/// Each ladder level keeps its own reference price. A level fires when the
/// price has dropped past it relative to that reference; the deepest
/// crossed level wins, its reference ratchets down to the trigger price,
/// and no further level fires the same cycle.
pub struct ThresholdRatchet {
    config: RatchetConfig,
    levels: HashMap<(String, usize), LevelState>,
    spike_last_alert: HashMap<String, DateTime<Utc>>,
}

impl ThresholdRatchet {
    pub fn new(config: RatchetConfig) -> Self {
        Self {
            config,
            levels: HashMap::new(),
            spike_last_alert: HashMap::new(),
        }
    }

    /// Evaluate one token for the cycle. Runs the drop ladder first, then
    /// the spike rule; at most one alert per token per cycle.
    pub async fn evaluate(
        &mut self,
        store: &Store,
        token: &TrackedToken,
        price: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError> {
        if price <= 0.0 {
            debug!("Skipping ratchet for {}: no price", token.symbol);
            return Ok(None);
        }

        if let Some(alert) = self.evaluate_drop(store, token, price, now).await? {
            return Ok(Some(alert));
        }
        self.evaluate_spike(store, token, price, now).await
    }

    /// Walk the drop ladder. Levels are checked deepest first so a single
    /// large move fires the furthest crossed level, not every level above
    /// it.
    async fn evaluate_drop(
        &mut self,
        store: &Store,
        token: &TrackedToken,
        price: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError> {
        self.arm_levels(store, token, price, now).await?;

        for idx in (0..self.config.levels.len()).rev() {
            let level = self.config.levels[idx];
            let key = (token.address.clone(), idx);
            let Some(state) = self.levels.get_mut(&key) else {
                continue;
            };
            if state.reference_price <= 0.0 {
                continue;
            }

            let change = (price - state.reference_price) / state.reference_price * 100.0;
            if change > level {
                continue;
            }
            let cooled = state
                .last_alert
                .map_or(true, |last| now - last >= self.config.cooldown);
            if !cooled {
                debug!(
                    "{} crossed {:.0}% but is cooling down",
                    token.symbol, level
                );
                continue;
            }

            let reference = state.reference_price;
            state.reference_price = price;
            state.last_alert = Some(now);

            info!(
                "Price threshold alert: {} {:.0}% ({:.2}% from {})",
                token.symbol,
                level,
                change,
                format_price(reference)
            );
            return Ok(Some(
                Alert::new(
                    AlertType::PriceDrop,
                    &token.entity,
                    Severity::for_price_drop(change),
                    format!("Price Drop Alert - {} ({:.0}%)", token.symbol, level),
                    format!(
                        "{} price dropped {:.2}%\n📉 {} → {}",
                        token.symbol,
                        change.abs(),
                        format_price(reference),
                        format_price(price)
                    ),
                    now,
                ),
            ));
        }
        Ok(None)
    }

    /// Establish reference prices for levels seen for the first time. The
    /// least-negative level arms from the lookback peak so the ratchet
    /// measures drop-from-recent-peak rather than drop-from-arbitrary-start;
    /// deeper levels arm from the first observed price.
    async fn arm_levels(
        &mut self,
        store: &Store,
        token: &TrackedToken,
        price: f64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        for idx in 0..self.config.levels.len() {
            let key = (token.address.clone(), idx);
            if self.levels.contains_key(&key) {
                continue;
            }
            let reference_price = if idx == 0 {
                store
                    .max_price_since(&token.address, now - self.config.peak_lookback)
                    .await?
                    .map(|peak| peak.max(price))
                    .unwrap_or(price)
            } else {
                price
            };
            self.levels.insert(
                key,
                LevelState {
                    reference_price,
                    last_alert: None,
                },
            );
        }
        Ok(())
    }

    /// Single-rule spike check against the lookback sample. A missing
    /// historical sample aborts evaluation for the cycle.
    async fn evaluate_spike(
        &mut self,
        store: &Store,
        token: &TrackedToken,
        price: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError> {
        let Some(past) = store
            .price_at(&token.address, now - self.config.spike_lookback)
            .await?
        else {
            return Ok(None);
        };
        if past.price_usd <= 0.0 {
            return Ok(None);
        }

        let change = (price - past.price_usd) / past.price_usd * 100.0;
        if change < self.config.spike_threshold {
            return Ok(None);
        }
        let cooled = self
            .spike_last_alert
            .get(&token.address)
            .map_or(true, |last| now - *last >= self.config.cooldown);
        if !cooled {
            return Ok(None);
        }
        self.spike_last_alert.insert(token.address.clone(), now);

        Ok(Some(
            Alert::new(
                AlertType::PriceSpike,
                &token.entity,
                Severity::Low,
                format!("Price Spike Alert - {}", token.symbol),
                format!(
                    "{} price increased {:.2}%\n📈 {} → {}",
                    token.symbol,
                    change,
                    format_price(past.price_usd),
                    format_price(price)
                ),
                now,
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use treasury_core::{Chain, PriceSample};

    fn token() -> TrackedToken {
        TrackedToken {
            address: "0x81f8f0bb1cb2a06649e51913a151f0e7ef6fa321".to_string(),
            symbol: "VITA".into(),
            chain: Chain::Ethereum,
            entity: "VitaDAO".to_string(),
        }
    }

    async fn store() -> Store {
        Store::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_ratchet_monotonic_descent() {
        let store = store().await;
        let token = token();
        let mut ratchet = ThresholdRatchet::new(RatchetConfig::default());
        let start = Utc::now();

        // Strictly decreasing sequence, cycles one minute apart (inside
        // the cooldown window)
        let mut alerts = Vec::new();
        for (minute, price) in [(0, 1.00), (1, 0.95), (2, 0.88), (3, 0.78)] {
            let now = start + Duration::minutes(minute);
            if let Some(alert) = ratchet.evaluate(&store, &token, price, now).await.unwrap() {
                alerts.push(alert);
            }
        }

        // Exactly three alerts, at the -5, -10, and -20 levels
        assert_eq!(alerts.len(), 3);
        assert!(alerts[0].title.contains("(-5%)"));
        assert!(alerts[1].title.contains("(-10%)"));
        assert!(alerts[2].title.contains("(-20%)"));

        // -12% and -5% are medium; -22% is high
        assert_eq!(alerts[0].severity, Severity::Medium);
        assert_eq!(alerts[1].severity, Severity::Medium);
        assert_eq!(alerts[2].severity, Severity::High);
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_repeat_crossings() {
        let store = store().await;
        let token = token();
        let config = RatchetConfig {
            levels: vec![-5.0],
            ..Default::default()
        };
        let mut ratchet = ThresholdRatchet::new(config);
        let start = Utc::now();

        assert!(ratchet.evaluate(&store, &token, 1.00, start).await.unwrap().is_none());

        let first = ratchet
            .evaluate(&store, &token, 0.94, start + Duration::minutes(1))
            .await
            .unwrap();
        assert!(first.is_some());

        // Crosses -5% again (vs the new 0.94 reference) within cooldown
        let second = ratchet
            .evaluate(&store, &token, 0.85, start + Duration::minutes(5))
            .await
            .unwrap();
        assert!(second.is_none());

        // After the cooldown the ratchet fires from the 0.94 reference
        let third = ratchet
            .evaluate(&store, &token, 0.85, start + Duration::minutes(40))
            .await
            .unwrap();
        let alert = third.unwrap();
        assert!(alert.message.contains("9.57"));
    }

    #[tokio::test]
    async fn test_first_level_arms_from_lookback_peak() {
        let store = store().await;
        let token = token();
        let now = Utc::now();

        // Peak of 1.40 observed 3 hours ago
        store
            .save_price_sample(&PriceSample::new(&token, 1.40, now - Duration::hours(3)))
            .await
            .unwrap();

        let mut ratchet = ThresholdRatchet::new(RatchetConfig::default());
        let alert = ratchet.evaluate(&store, &token, 1.00, now).await.unwrap();

        // Already 28.6% below the recent peak: fires immediately at -5
        // (deeper levels armed from the current price, so only the first
        // level has crossed)
        let alert = alert.unwrap();
        assert!(alert.title.contains("(-5%)"));
        assert_eq!(alert.severity, Severity::High);
        assert!(alert.message.contains("28.57"));
    }

    #[tokio::test]
    async fn test_zero_price_is_skipped_without_state_change() {
        let store = store().await;
        let token = token();
        let mut ratchet = ThresholdRatchet::new(RatchetConfig::default());
        let start = Utc::now();

        assert!(ratchet.evaluate(&store, &token, 0.0, start).await.unwrap().is_none());
        assert!(ratchet.levels.is_empty());

        // A later real price arms normally and does not alert
        assert!(ratchet
            .evaluate(&store, &token, 1.0, start + Duration::minutes(1))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_spike_requires_history_and_cooldown() {
        let store = store().await;
        let token = token();
        let mut ratchet = ThresholdRatchet::new(RatchetConfig::default());
        let now = Utc::now();

        // No historical sample: no evaluation, no alert
        assert!(ratchet.evaluate(&store, &token, 1.15, now).await.unwrap().is_none());

        store
            .save_price_sample(&PriceSample::new(&token, 1.00, now - Duration::hours(2)))
            .await
            .unwrap();

        let alert = ratchet.evaluate(&store, &token, 1.15, now).await.unwrap().unwrap();
        assert_eq!(alert.alert_type, AlertType::PriceSpike);
        assert_eq!(alert.severity, Severity::Low);
        assert!(alert.message.contains("15.00"));

        // Second spike within the cooldown is suppressed
        let again = ratchet
            .evaluate(&store, &token, 1.20, now + Duration::minutes(5))
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_small_move_fires_nothing() {
        let store = store().await;
        let token = token();
        let mut ratchet = ThresholdRatchet::new(RatchetConfig::default());
        let start = Utc::now();

        ratchet.evaluate(&store, &token, 1.00, start).await.unwrap();
        let alert = ratchet
            .evaluate(&store, &token, 0.97, start + Duration::minutes(1))
            .await
            .unwrap();
        assert!(alert.is_none());
    }
}
