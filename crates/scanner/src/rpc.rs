//! Chain RPC abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("RPC error: {0}")]
    Rpc(String),
}

/// A raw transfer extracted from chain data, before watch-list filtering
/// and USD resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTransfer {
    /// Transaction hash (EVM) or signature (Solana).
    pub tx_hash: String,
    /// Block height or slot the transfer landed in.
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
    pub from_address: String,
    pub to_address: String,
    /// Token contract/mint address; None for the native asset.
    pub token_id: Option<String>,
    /// Amount in whole token units.
    pub amount: f64,
}

/// Read access to a chain's transaction stream.
///
/// Implementations extract native and token transfers for a cursor range.
/// A single malformed transaction or log must be skipped, not abort the
/// range; only transport-level failures surface as errors. Implementations
/// may pre-filter by the watch-list where the upstream API requires it
/// (per-address queries on Solana); the scanner filters again regardless.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Current chain head (block height or slot).
    async fn latest_height(&self) -> Result<u64, ScanError>;

    /// All transfers in the inclusive cursor range.
    async fn transfers_in_range(&self, from: u64, to: u64)
        -> Result<Vec<RawTransfer>, ScanError>;
}
