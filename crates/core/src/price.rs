//! Price samples and tracked tokens.

use crate::Chain;
use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// A token whose price the tracker follows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedToken {
    /// Contract address (mint address on Solana).
    pub address: String,
    pub symbol: CompactString,
    pub chain: Chain,
    /// Entity the token belongs to, e.g. the issuing DAO.
    pub entity: String,
}

/// One point of the append-only token price time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub token_id: String,
    pub token_symbol: CompactString,
    pub chain: Chain,
    pub price_usd: f64,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl PriceSample {
    pub fn new(token: &TrackedToken, price_usd: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            token_id: token.address.clone(),
            token_symbol: token.symbol.clone(),
            chain: token.chain,
            price_usd,
            timestamp,
            metadata: serde_json::json!({ "entity": token.entity }),
        }
    }
}

/// Format a USD price with precision appropriate to its magnitude.
pub fn format_price(price: f64) -> String {
    if price == 0.0 {
        return "$0".to_string();
    }
    let abs_price = price.abs();
    if abs_price >= 1000.0 {
        format!("${:.2}", price)
    } else if abs_price >= 1.0 {
        format!("${:.4}", price)
    } else if abs_price >= 0.01 {
        format!("${:.6}", price)
    } else {
        format!("${:.8}", price)
    }
}
