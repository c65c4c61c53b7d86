//! Upstream price provider clients.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use treasury_core::Chain;

const COINGECKO_ENDPOINT: &str = "https://pro-api.coingecko.com/api/v3";
const GECKOTERMINAL_ENDPOINT: &str = "https://api.geckoterminal.com/api/v2";

/// Provider request timeout. Bounded so a stuck provider call cannot block
/// shutdown.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Provider rate limit exceeded")]
    RateLimited,
    #[error("Unexpected provider response: {0}")]
    BadResponse(String),
}

/// A source of token USD prices. Implementations batch where the upstream
/// API allows it; tokens missing from the result simply have no price.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Fetch prices for a batch of token addresses on one chain.
    /// Tokens without a known price are absent from the map.
    async fn fetch_prices(
        &self,
        token_ids: &[String],
        chain: Chain,
    ) -> Result<HashMap<String, f64>, ProviderError>;

    /// Fetch a single token price. Default delegates to the batch call.
    async fn fetch_price(&self, token_id: &str, chain: Chain) -> Result<f64, ProviderError> {
        let ids = [token_id.to_string()];
        let prices = self.fetch_prices(&ids, chain).await?;
        Ok(prices.get(token_id).copied().unwrap_or(0.0))
    }
}

/// CoinGecko token price API. Supports batched contract-address lookups on
/// EVM platforms.
pub struct CoinGeckoProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl CoinGeckoProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key,
            base_url: COINGECKO_ENDPOINT.to_string(),
        }
    }

    fn platform(chain: Chain) -> Option<&'static str> {
        match chain {
            Chain::Ethereum => Some("ethereum"),
            Chain::Arbitrum => Some("arbitrum-one"),
            Chain::Base => Some("base"),
            Chain::Polygon => Some("polygon-pos"),
            Chain::Solana => Some("solana"),
        }
    }
}

#[async_trait]
impl PriceProvider for CoinGeckoProvider {
    async fn fetch_prices(
        &self,
        token_ids: &[String],
        chain: Chain,
    ) -> Result<HashMap<String, f64>, ProviderError> {
        if token_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let platform = Self::platform(chain)
            .ok_or_else(|| ProviderError::BadResponse(format!("unsupported chain {chain:?}")))?;

        let addresses = token_ids
            .iter()
            .map(|t| chain.normalize_address(t))
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/simple/token_price/{}", self.base_url, platform);

        let mut request = self
            .client
            .get(&url)
            .query(&[("contract_addresses", addresses.as_str()), ("vs_currencies", "usd")]);
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-pro-api-key", key);
        }

        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        let response = response.error_for_status()?;
        let body: serde_json::Value = response.json().await?;

        let mut prices = HashMap::new();
        for token_id in token_ids {
            let normalized = chain.normalize_address(token_id);
            if let Some(price) = body
                .get(&normalized)
                .and_then(|entry| entry.get("usd"))
                .and_then(|v| v.as_f64())
            {
                if price > 0.0 {
                    prices.insert(token_id.clone(), price);
                }
            }
        }
        debug!(
            "CoinGecko returned {}/{} prices for {}",
            prices.len(),
            token_ids.len(),
            chain.as_str()
        );
        Ok(prices)
    }
}

/// GeckoTerminal token API. No batch endpoint, so prices are fetched one
/// token at a time; used for Solana mints that CoinGecko does not index.
pub struct GeckoTerminalProvider {
    client: reqwest::Client,
    base_url: String,
}

impl GeckoTerminalProvider {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: GECKOTERMINAL_ENDPOINT.to_string(),
        }
    }

    fn network(chain: Chain) -> &'static str {
        match chain {
            Chain::Solana => "solana",
            Chain::Ethereum => "eth",
            Chain::Arbitrum => "arbitrum",
            Chain::Base => "base",
            Chain::Polygon => "polygon_pos",
        }
    }
}

impl Default for GeckoTerminalProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceProvider for GeckoTerminalProvider {
    async fn fetch_prices(
        &self,
        token_ids: &[String],
        chain: Chain,
    ) -> Result<HashMap<String, f64>, ProviderError> {
        let mut prices = HashMap::new();
        for token_id in token_ids {
            match self.fetch_price(token_id, chain).await {
                Ok(price) if price > 0.0 => {
                    prices.insert(token_id.clone(), price);
                }
                Ok(_) => {}
                // A rate limit mid-batch would only repeat for the rest
                Err(ProviderError::RateLimited) => return Err(ProviderError::RateLimited),
                Err(e) => {
                    warn!("GeckoTerminal lookup failed for {}: {}", token_id, e);
                }
            }
        }
        Ok(prices)
    }

    async fn fetch_price(&self, token_id: &str, chain: Chain) -> Result<f64, ProviderError> {
        let url = format!(
            "{}/networks/{}/tokens/{}",
            self.base_url,
            Self::network(chain),
            token_id
        );

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if !response.status().is_success() {
            debug!(
                "GeckoTerminal: no price for {} (status {})",
                token_id,
                response.status()
            );
            return Ok(0.0);
        }

        let body: serde_json::Value = response.json().await?;
        // price_usd arrives as a string, e.g. "0.03512"
        let price = body["data"]["attributes"]["price_usd"]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0);
        Ok(price)
    }
}
