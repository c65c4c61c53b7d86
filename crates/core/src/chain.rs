//! Blockchain chain identifiers and utilities.

use serde::{Deserialize, Serialize};

/// Blockchain network identifier.
/// Uses u8 representation for compact serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Chain {
    // EVM chains (1-9)
    Ethereum = 1,
    Arbitrum = 2,
    Base = 3,
    Polygon = 4,

    // Non-EVM chains (10+)
    Solana = 10,
}

impl Chain {
    /// Create Chain from u8 ID.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Chain::Ethereum),
            2 => Some(Chain::Arbitrum),
            3 => Some(Chain::Base),
            4 => Some(Chain::Polygon),
            10 => Some(Chain::Solana),
            _ => None,
        }
    }

    /// Get u8 ID of this chain.
    #[inline]
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Check if this chain is EVM-compatible.
    #[inline]
    pub fn is_evm(self) -> bool {
        matches!(
            self,
            Chain::Ethereum | Chain::Arbitrum | Chain::Base | Chain::Polygon
        )
    }

    /// Lowercase identifier used in the database and config files.
    pub fn as_str(self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Arbitrum => "arbitrum",
            Chain::Base => "base",
            Chain::Polygon => "polygon",
            Chain::Solana => "solana",
        }
    }

    /// Parse from the lowercase identifier.
    pub fn from_str_id(s: &str) -> Option<Self> {
        match s {
            "ethereum" => Some(Chain::Ethereum),
            "arbitrum" => Some(Chain::Arbitrum),
            "base" => Some(Chain::Base),
            "polygon" => Some(Chain::Polygon),
            "solana" => Some(Chain::Solana),
            _ => None,
        }
    }

    /// Symbol of the chain's native asset.
    pub fn native_symbol(self) -> &'static str {
        match self {
            Chain::Ethereum | Chain::Arbitrum | Chain::Base => "ETH",
            Chain::Polygon => "MATIC",
            Chain::Solana => "SOL",
        }
    }

    /// Block explorer URL for a transaction hash.
    pub fn explorer_tx_url(self, tx_hash: &str) -> String {
        match self {
            Chain::Ethereum => format!("https://etherscan.io/tx/{tx_hash}"),
            Chain::Arbitrum => format!("https://arbiscan.io/tx/{tx_hash}"),
            Chain::Base => format!("https://basescan.org/tx/{tx_hash}"),
            Chain::Polygon => format!("https://polygonscan.com/tx/{tx_hash}"),
            Chain::Solana => format!("https://solscan.io/tx/{tx_hash}"),
        }
    }

    /// Normalize an on-chain address for identity comparisons.
    /// EVM addresses are case-insensitive hex; Solana addresses are
    /// case-sensitive base58 and pass through unchanged.
    pub fn normalize_address(self, address: &str) -> String {
        if self.is_evm() {
            address.to_lowercase()
        } else {
            address.to_string()
        }
    }

    /// Get all chain variants.
    pub fn all() -> &'static [Chain] {
        &[
            Chain::Ethereum,
            Chain::Arbitrum,
            Chain::Base,
            Chain::Polygon,
            Chain::Solana,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_from_id() {
        assert_eq!(Chain::from_id(1), Some(Chain::Ethereum));
        assert_eq!(Chain::from_id(10), Some(Chain::Solana));
        assert_eq!(Chain::from_id(255), None);
    }

    #[test]
    fn test_chain_str_roundtrip() {
        for &chain in Chain::all() {
            assert_eq!(Chain::from_str_id(chain.as_str()), Some(chain));
        }
        assert_eq!(Chain::from_str_id("dogecoin"), None);
    }

    #[test]
    fn test_chain_is_evm() {
        assert!(Chain::Ethereum.is_evm());
        assert!(Chain::Base.is_evm());
        assert!(!Chain::Solana.is_evm());
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(
            Chain::Ethereum.normalize_address("0xAbCdEf1234"),
            "0xabcdef1234"
        );
        // Solana base58 is case-sensitive and must not be lowercased
        assert_eq!(
            Chain::Solana.normalize_address("GTuVLSN4cKvrWnWFbyyQX6VW14SLhfu7sjM4MrzFoj3s"),
            "GTuVLSN4cKvrWnWFbyyQX6VW14SLhfu7sjM4MrzFoj3s"
        );
    }

    #[test]
    fn test_explorer_url() {
        let url = Chain::Ethereum.explorer_tx_url("0xdeadbeef");
        assert_eq!(url, "https://etherscan.io/tx/0xdeadbeef");
        assert!(Chain::Solana.explorer_tx_url("abc").contains("solscan"));
    }
}
