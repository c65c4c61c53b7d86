//! Cached, batched token price lookup with per-chain providers.
//!
//! This crate provides:
//! - A TTL cache over batched provider requests
//! - Provider fallback to individual lookups on partial batch failure
//! - Soft handling of provider rate limits (zero price, never an error)

mod oracle;
mod providers;

pub use oracle::{OracleConfig, PriceOracle};
pub use providers::{CoinGeckoProvider, GeckoTerminalProvider, PriceProvider, ProviderError};
