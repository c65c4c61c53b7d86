//! Application configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::info;
use treasury_alerts::RateLimiterConfig;
use treasury_core::{Chain, TrackedToken, WatchedAddress};
use treasury_engine::{RatchetConfig, WhaleConfig};
use treasury_scanner::ScannerConfig;

/// Wrapped-native token used to price ETH transfers by default.
const WETH_ADDRESS: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";

/// Application configuration. Loaded from a JSON file; every field has a
/// default so a missing file still yields a runnable (if empty) monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite database URL.
    pub database_url: String,
    /// Port for the health/status endpoints.
    pub port: u16,
    /// Chains to scan.
    pub chains: Vec<ChainSettings>,
    /// Treasury/whale addresses to watch.
    pub watchlist: Vec<WatchedAddress>,
    /// Tokens the price tracker follows.
    pub tracked_tokens: Vec<TrackedToken>,
    pub whale: WhaleSettings,
    pub ratchet: RatchetSettings,
    pub notifications: NotificationSettings,
    /// Seconds between price-tracking cycles.
    pub price_check_interval_secs: u64,
    /// Days of price history kept by the retention cycle.
    pub price_retention_days: i64,
    /// Daily per-entity outflow ceiling for the daily-limit checker.
    pub daily_limit_usd: f64,
    /// Backoff after a failed cycle iteration.
    pub error_backoff_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://treasury_monitor.db".to_string(),
            port: 8080,
            chains: vec![
                ChainSettings::new(Chain::Ethereum, 30),
                ChainSettings::new(Chain::Solana, 60),
            ],
            watchlist: Vec::new(),
            tracked_tokens: Vec::new(),
            whale: WhaleSettings::default(),
            ratchet: RatchetSettings::default(),
            notifications: NotificationSettings::default(),
            price_check_interval_secs: 300,
            price_retention_days: 30,
            daily_limit_usd: 500_000.0,
            error_backoff_secs: 60,
        }
    }
}

impl AppConfig {
    /// Load from a JSON file, falling back to defaults when it is absent.
    pub fn load(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded configuration from {}", path);
                    config
                }
                Err(e) => {
                    tracing::error!("Invalid config file {}: {} - using defaults", path, e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("No config file at {}, using defaults", path);
                Self::default()
            }
        }
    }
}

/// Per-chain scan settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSettings {
    pub chain: Chain,
    pub enabled: bool,
    /// RPC endpoint. Falls back to the `<CHAIN>_RPC_URL` environment
    /// variable when unset.
    pub rpc_url: Option<String>,
    pub scan_interval_secs: u64,
    pub max_blocks_per_cycle: u64,
    pub initial_lookback: u64,
    /// Token address used to price native transfers.
    pub native_price_token: Option<String>,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self::new(Chain::Ethereum, 30)
    }
}

impl ChainSettings {
    pub fn new(chain: Chain, scan_interval_secs: u64) -> Self {
        Self {
            chain,
            enabled: true,
            rpc_url: None,
            scan_interval_secs,
            max_blocks_per_cycle: 100,
            initial_lookback: 10,
            native_price_token: match chain {
                Chain::Ethereum => Some(WETH_ADDRESS.to_string()),
                _ => None,
            },
        }
    }

    /// Resolve the RPC endpoint from config or environment.
    pub fn resolve_rpc_url(&self) -> Option<String> {
        self.rpc_url.clone().or_else(|| {
            std::env::var(format!("{}_RPC_URL", self.chain.as_str().to_uppercase())).ok()
        })
    }
}

impl From<&ChainSettings> for ScannerConfig {
    fn from(settings: &ChainSettings) -> Self {
        ScannerConfig {
            max_blocks_per_cycle: settings.max_blocks_per_cycle,
            initial_lookback: settings.initial_lookback,
            native_price_token: settings.native_price_token.clone(),
            ..Default::default()
        }
    }
}

/// Whale / large-transaction thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhaleSettings {
    pub token_amount_threshold: f64,
    pub usd_threshold: f64,
    pub large_tx_usd_threshold: f64,
}

impl Default for WhaleSettings {
    fn default() -> Self {
        let defaults = WhaleConfig::default();
        Self {
            token_amount_threshold: defaults.token_amount_threshold,
            usd_threshold: defaults.usd_threshold,
            large_tx_usd_threshold: defaults.large_tx_usd_threshold,
        }
    }
}

impl From<&WhaleSettings> for WhaleConfig {
    fn from(settings: &WhaleSettings) -> Self {
        WhaleConfig {
            token_amount_threshold: settings.token_amount_threshold,
            usd_threshold: settings.usd_threshold,
            large_tx_usd_threshold: settings.large_tx_usd_threshold,
        }
    }
}

/// Threshold-ratchet settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RatchetSettings {
    pub levels: Vec<f64>,
    pub cooldown_minutes: i64,
    pub peak_lookback_hours: i64,
    pub spike_threshold: f64,
    pub spike_lookback_hours: i64,
}

impl Default for RatchetSettings {
    fn default() -> Self {
        let defaults = RatchetConfig::default();
        Self {
            levels: defaults.levels,
            cooldown_minutes: 30,
            peak_lookback_hours: 24,
            spike_threshold: defaults.spike_threshold,
            spike_lookback_hours: 1,
        }
    }
}

impl From<&RatchetSettings> for RatchetConfig {
    fn from(settings: &RatchetSettings) -> Self {
        RatchetConfig {
            levels: settings.levels.clone(),
            cooldown: Duration::minutes(settings.cooldown_minutes),
            peak_lookback: Duration::hours(settings.peak_lookback_hours),
            spike_threshold: settings.spike_threshold,
            spike_lookback: Duration::hours(settings.spike_lookback_hours),
        }
    }
}

/// Dispatcher rate-limit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub min_spacing_secs: i64,
    pub hourly_cap: usize,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            min_spacing_secs: 30,
            hourly_cap: 20,
        }
    }
}

impl From<&NotificationSettings> for RateLimiterConfig {
    fn from(settings: &NotificationSettings) -> Self {
        RateLimiterConfig {
            min_spacing: Duration::seconds(settings.min_spacing_secs),
            hourly_cap: settings.hourly_cap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.chains.len(), 2);
        assert_eq!(config.price_check_interval_secs, 300);
        assert_eq!(config.whale.usd_threshold, 100_000.0);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.whale.usd_threshold, config.whale.usd_threshold);
        assert_eq!(parsed.chains[0].chain, Chain::Ethereum);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{ "port": 9000, "daily_limit_usd": 1000.0 }"#).unwrap();
        assert_eq!(parsed.port, 9000);
        assert_eq!(parsed.daily_limit_usd, 1000.0);
        // Unspecified fields take defaults
        assert_eq!(parsed.price_retention_days, 30);
        assert_eq!(parsed.ratchet.levels.len(), 12);
    }

    #[test]
    fn test_ratchet_settings_conversion() {
        let settings = RatchetSettings::default();
        let config: RatchetConfig = (&settings).into();
        assert_eq!(config.cooldown, Duration::minutes(30));
        assert_eq!(config.peak_lookback, Duration::hours(24));
    }

    #[test]
    fn test_chain_settings_defaults() {
        let eth = ChainSettings::new(Chain::Ethereum, 30);
        assert!(eth.enabled);
        assert_eq!(eth.native_price_token.as_deref(), Some(WETH_ADDRESS));

        let sol = ChainSettings::new(Chain::Solana, 60);
        assert_eq!(sol.native_price_token, None);
    }
}
