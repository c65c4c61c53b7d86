//! Watch-list of treasury and whale addresses.

use crate::Chain;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A monitored address. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedAddress {
    pub address: String,
    pub chain: Chain,
    /// Human-readable entity label, e.g. the DAO name.
    pub label: String,
}

/// The set of addresses the scanners filter against.
///
/// Addresses are normalized per chain on insert; lookups must go through
/// [`WatchList::lookup`] so EVM case differences never cause a miss.
/// Uniqueness is (chain, normalized address) — the first label wins.
#[derive(Debug, Clone, Default)]
pub struct WatchList {
    entries: HashMap<(Chain, String), String>,
}

impl WatchList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from configured addresses, dropping duplicates.
    pub fn from_addresses(addresses: &[WatchedAddress]) -> Self {
        let mut list = Self::new();
        for entry in addresses {
            list.insert(entry.chain, &entry.address, &entry.label);
        }
        list
    }

    /// Insert an address. Returns false if it was already present.
    pub fn insert(&mut self, chain: Chain, address: &str, label: &str) -> bool {
        let key = (chain, chain.normalize_address(address));
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, label.to_string());
        true
    }

    /// Label of a watched address, or None if it is not on the list.
    pub fn lookup(&self, chain: Chain, address: &str) -> Option<&str> {
        self.entries
            .get(&(chain, chain.normalize_address(address)))
            .map(String::as_str)
    }

    /// Whether the address is watched.
    pub fn contains(&self, chain: Chain, address: &str) -> bool {
        self.lookup(chain, address).is_some()
    }

    /// All watched addresses (normalized) for a chain.
    pub fn addresses_for(&self, chain: Chain) -> Vec<String> {
        self.entries
            .keys()
            .filter(|(c, _)| *c == chain)
            .map(|(_, addr)| addr.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
