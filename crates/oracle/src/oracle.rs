//! TTL-cached price lookup over the providers.

use crate::providers::{PriceProvider, ProviderError};
use moka::future::Cache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use treasury_core::Chain;

/// Oracle tuning knobs.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// How long a fetched price stays fresh.
    pub cache_ttl: Duration,
    /// Upper bound on cached (chain, token) entries.
    pub cache_capacity: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 10_000,
        }
    }
}

/// Cached token→USD price lookup.
///
/// Routes to a per-chain provider (EVM chains batch through one provider,
/// Solana through another) with an individual-lookup fallback when a batch
/// call fails or comes back partial. Missing prices are 0.0, never an
/// error, so callers can proceed without a price rather than abort.
///
/// The cache is shared and read-mostly; two near-simultaneous refreshes of
/// the same token are harmless.
pub struct PriceOracle {
    evm_provider: Arc<dyn PriceProvider>,
    solana_provider: Arc<dyn PriceProvider>,
    cache: Cache<(Chain, String), f64>,
}

impl PriceOracle {
    pub fn new(
        evm_provider: Arc<dyn PriceProvider>,
        solana_provider: Arc<dyn PriceProvider>,
        config: OracleConfig,
    ) -> Self {
        Self {
            evm_provider,
            solana_provider,
            cache: Cache::builder()
                .max_capacity(config.cache_capacity)
                .time_to_live(config.cache_ttl)
                .build(),
        }
    }

    fn provider_for(&self, chain: Chain) -> &Arc<dyn PriceProvider> {
        if chain.is_evm() {
            &self.evm_provider
        } else {
            &self.solana_provider
        }
    }

    /// USD prices for a set of tokens on one chain. Every requested token
    /// is present in the result; unknown prices are 0.0.
    pub async fn prices(&self, token_ids: &[String], chain: Chain) -> HashMap<String, f64> {
        let mut result = HashMap::with_capacity(token_ids.len());
        let mut misses = Vec::new();

        for token_id in token_ids {
            let key = (chain, chain.normalize_address(token_id));
            match self.cache.get(&key).await {
                Some(price) => {
                    result.insert(token_id.clone(), price);
                }
                None => misses.push(token_id.clone()),
            }
        }

        if misses.is_empty() {
            return result;
        }

        let provider = self.provider_for(chain);
        match provider.fetch_prices(&misses, chain).await {
            Ok(fetched) => {
                for token_id in &misses {
                    let price = fetched.get(token_id).copied().unwrap_or(0.0);
                    if price > 0.0 {
                        let key = (chain, chain.normalize_address(token_id));
                        self.cache.insert(key, price).await;
                    }
                    result.insert(token_id.clone(), price);
                }
            }
            Err(ProviderError::RateLimited) => {
                // Soft failure: report zero for the misses, no retry here
                warn!("Price provider rate limited on {}", chain.as_str());
                for token_id in misses {
                    result.insert(token_id, 0.0);
                }
            }
            Err(e) => {
                // Batch failed outright: fall back to individual lookups
                debug!("Batch price fetch failed ({}), trying individually", e);
                for token_id in misses {
                    let price = self.single_price(&token_id, chain).await;
                    result.insert(token_id, price);
                }
            }
        }

        result
    }

    /// Single-token lookup, cache-aware. Returns 0.0 on any failure.
    pub async fn single_price(&self, token_id: &str, chain: Chain) -> f64 {
        let key = (chain, chain.normalize_address(token_id));
        if let Some(price) = self.cache.get(&key).await {
            return price;
        }

        match self.provider_for(chain).fetch_price(token_id, chain).await {
            Ok(price) if price > 0.0 => {
                self.cache.insert(key, price).await;
                price
            }
            Ok(_) => 0.0,
            Err(e) => {
                warn!("Price lookup failed for {} on {}: {}", token_id, chain.as_str(), e);
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider serving a fixed price map, counting calls.
    struct StaticProvider {
        prices: HashMap<String, f64>,
        batch_calls: AtomicUsize,
        single_calls: AtomicUsize,
        fail_batch: bool,
        rate_limited: bool,
    }

    impl StaticProvider {
        fn new(prices: &[(&str, f64)]) -> Self {
            Self {
                prices: prices.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                batch_calls: AtomicUsize::new(0),
                single_calls: AtomicUsize::new(0),
                fail_batch: false,
                rate_limited: false,
            }
        }
    }

    #[async_trait]
    impl PriceProvider for StaticProvider {
        async fn fetch_prices(
            &self,
            token_ids: &[String],
            _chain: Chain,
        ) -> Result<HashMap<String, f64>, ProviderError> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            if self.rate_limited {
                return Err(ProviderError::RateLimited);
            }
            if self.fail_batch {
                return Err(ProviderError::BadResponse("batch down".to_string()));
            }
            Ok(token_ids
                .iter()
                .filter_map(|t| self.prices.get(t).map(|p| (t.clone(), *p)))
                .collect())
        }

        async fn fetch_price(&self, token_id: &str, _chain: Chain) -> Result<f64, ProviderError> {
            self.single_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.prices.get(token_id).copied().unwrap_or(0.0))
        }
    }

    fn oracle_with(provider: StaticProvider) -> (PriceOracle, Arc<StaticProvider>) {
        let provider = Arc::new(provider);
        let oracle = PriceOracle::new(
            provider.clone(),
            provider.clone(),
            OracleConfig::default(),
        );
        (oracle, provider)
    }

    #[tokio::test]
    async fn test_missing_price_is_zero_not_error() {
        let (oracle, _) = oracle_with(StaticProvider::new(&[("0xbio", 0.035)]));

        let prices = oracle
            .prices(&["0xbio".to_string(), "0xunknown".to_string()], Chain::Ethereum)
            .await;
        assert_eq!(prices["0xbio"], 0.035);
        assert_eq!(prices["0xunknown"], 0.0);
    }

    #[tokio::test]
    async fn test_cache_avoids_second_fetch() {
        let (oracle, provider) = oracle_with(StaticProvider::new(&[("0xbio", 0.035)]));

        oracle.prices(&["0xbio".to_string()], Chain::Ethereum).await;
        oracle.prices(&["0xbio".to_string()], Chain::Ethereum).await;

        assert_eq!(provider.batch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_prices_are_not_cached() {
        let (oracle, provider) = oracle_with(StaticProvider::new(&[]));

        oracle.prices(&["0xbio".to_string()], Chain::Ethereum).await;
        oracle.prices(&["0xbio".to_string()], Chain::Ethereum).await;

        // Unknown token is re-requested each cycle
        assert_eq!(provider.batch_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_batch_failure_falls_back_to_individual() {
        let mut provider = StaticProvider::new(&[("0xvita", 1.25)]);
        provider.fail_batch = true;
        let (oracle, provider) = oracle_with(provider);

        let prices = oracle.prices(&["0xvita".to_string()], Chain::Ethereum).await;
        assert_eq!(prices["0xvita"], 1.25);
        assert_eq!(provider.single_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_returns_zero_without_retry() {
        let mut provider = StaticProvider::new(&[("0xvita", 1.25)]);
        provider.rate_limited = true;
        let (oracle, provider) = oracle_with(provider);

        let prices = oracle.prices(&["0xvita".to_string()], Chain::Ethereum).await;
        assert_eq!(prices["0xvita"], 0.0);
        // No fallback attempt after a rate limit
        assert_eq!(provider.batch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.single_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_evm_address_case_hits_same_cache_entry() {
        let (oracle, provider) = oracle_with(StaticProvider::new(&[("0xAbC", 2.0)]));

        oracle.prices(&["0xAbC".to_string()], Chain::Ethereum).await;
        let prices = oracle.prices(&["0xabc".to_string()], Chain::Ethereum).await;

        assert_eq!(prices["0xabc"], 2.0);
        assert_eq!(provider.batch_calls.load(Ordering::SeqCst), 1);
    }
}
