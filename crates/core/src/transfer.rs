//! Normalized transfer events emitted by the chain scanners.

use crate::Chain;
use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Token identifier for native transfers. Native assets have no contract
/// address, so a sentinel keeps the (chain, token_id) key uniform.
pub const NATIVE_TOKEN_ID: &str = "native";

/// Transfers below this amount are considered dust and discarded.
pub const DUST_AMOUNT: f64 = 0.001;

/// Direction of a transfer relative to the watched address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    /// Identifier stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Incoming => "in",
            Direction::Outgoing => "out",
        }
    }

    /// Parse from the database identifier.
    pub fn from_str_id(s: &str) -> Option<Self> {
        match s {
            "in" => Some(Direction::Incoming),
            "out" => Some(Direction::Outgoing),
            _ => None,
        }
    }
}

/// A normalized native or token transfer touching the watch-list.
///
/// Created once by a chain scanner on first sighting. `tx_hash` is the
/// dedup key within a chain; the store's uniqueness constraint guarantees
/// a transfer is recorded at most once no matter how often the scanner
/// re-observes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferEvent {
    /// Transaction hash (EVM) or signature (Solana).
    pub tx_hash: String,
    pub chain: Chain,
    /// Block timestamp of the transfer.
    pub timestamp: DateTime<Utc>,
    pub from_address: String,
    pub to_address: String,
    /// Token contract address, or [`NATIVE_TOKEN_ID`] for the native asset.
    pub token_id: String,
    pub token_symbol: CompactString,
    /// Amount in whole token units (decimals already applied).
    pub amount: f64,
    /// USD value at scan time; 0.0 when no price was available.
    pub amount_usd: f64,
    pub direction: Direction,
    /// Label of the watched address this transfer touched.
    pub entity: String,
    /// Whether any alert has been raised for this transfer.
    pub alert_triggered: bool,
    /// Scanner-specific extras (block number, log index, ...).
    pub metadata: serde_json::Value,
}

impl TransferEvent {
    /// Whether the transfer is below the dust cutoff.
    #[inline]
    pub fn is_dust(&self) -> bool {
        self.amount < DUST_AMOUNT
    }

    /// Whether this is a native-asset transfer.
    #[inline]
    pub fn is_native(&self) -> bool {
        self.token_id == NATIVE_TOKEN_ID
    }

    /// Shortened hash for log lines and alert messages.
    pub fn short_hash(&self) -> &str {
        let len = self.tx_hash.len().min(16);
        &self.tx_hash[..len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(amount: f64) -> TransferEvent {
        TransferEvent {
            tx_hash: "0xabc123def4567890aabbccdd".to_string(),
            chain: Chain::Ethereum,
            timestamp: Utc::now(),
            from_address: "0xf5307a74d1550739ef81c6488dc5c7a6a53e5ac2".to_string(),
            to_address: "0x1234567890abcdef1234567890abcdef12345678".to_string(),
            token_id: NATIVE_TOKEN_ID.to_string(),
            token_symbol: "ETH".into(),
            amount,
            amount_usd: 0.0,
            direction: Direction::Outgoing,
            entity: "VitaDAO".to_string(),
            alert_triggered: false,
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn test_direction_roundtrip() {
        assert_eq!(Direction::from_str_id("in"), Some(Direction::Incoming));
        assert_eq!(Direction::from_str_id("out"), Some(Direction::Outgoing));
        assert_eq!(Direction::from_str_id("sideways"), None);
        assert_eq!(Direction::Outgoing.as_str(), "out");
    }

    #[test]
    fn test_dust_cutoff() {
        assert!(event(0.0001).is_dust());
        assert!(!event(0.001).is_dust());
        assert!(!event(5.0).is_dust());
    }

    #[test]
    fn test_short_hash() {
        let ev = event(1.0);
        assert_eq!(ev.short_hash(), "0xabc123def45678");
        assert_eq!(ev.short_hash().len(), 16);
    }
}
