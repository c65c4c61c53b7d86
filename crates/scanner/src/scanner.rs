//! Cursor-driven scan cycle over a chain RPC.

use crate::rpc::{ChainRpc, RawTransfer, ScanError};
use compact_str::CompactString;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use treasury_core::{Chain, Direction, TransferEvent, WatchList, DUST_AMOUNT, NATIVE_TOKEN_ID};
use treasury_oracle::PriceOracle;

/// Scanner tuning knobs.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Upper bound on blocks processed per cycle, to bound cycle latency.
    pub max_blocks_per_cycle: u64,
    /// How far behind the head the first cycle starts.
    pub initial_lookback: u64,
    /// Transfers below this amount are discarded.
    pub dust_amount: f64,
    /// Token address used to price the native asset (e.g. the wrapped
    /// native token). None leaves native transfers unpriced.
    pub native_price_token: Option<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_blocks_per_cycle: 100,
            initial_lookback: 10,
            dust_amount: DUST_AMOUNT,
            native_price_token: None,
        }
    }
}

/// One chain's scanner.
///
/// Each cycle processes an increasing, bounded cursor range. The cursor
/// only advances after the cycle succeeds end to end, so an RPC failure
/// means the same range is retried next cycle; the store's hash dedup
/// absorbs the resulting re-observations.
pub struct Scanner {
    chain: Chain,
    rpc: Arc<dyn ChainRpc>,
    oracle: Arc<PriceOracle>,
    watchlist: Arc<WatchList>,
    /// Known token symbols by normalized contract address.
    token_symbols: HashMap<String, CompactString>,
    config: ScannerConfig,
    cursor: Option<u64>,
}

impl Scanner {
    pub fn new(
        chain: Chain,
        rpc: Arc<dyn ChainRpc>,
        oracle: Arc<PriceOracle>,
        watchlist: Arc<WatchList>,
        token_symbols: HashMap<String, CompactString>,
        config: ScannerConfig,
    ) -> Self {
        Self {
            chain,
            rpc,
            oracle,
            watchlist,
            token_symbols,
            config,
            cursor: None,
        }
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    /// Last successfully processed height, if any cycle has completed.
    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }

    /// Run one scan cycle: fetch the next cursor window, filter to the
    /// watch-list, resolve USD values, and return normalized events.
    pub async fn scan_once(&mut self) -> Result<Vec<TransferEvent>, ScanError> {
        let latest = self.rpc.latest_height().await?;
        let from = match self.cursor {
            Some(cursor) => cursor + 1,
            None => latest.saturating_sub(self.config.initial_lookback),
        };
        if from > latest {
            debug!("{}: no new blocks (head {})", self.chain.as_str(), latest);
            return Ok(Vec::new());
        }
        let to = latest.min(from + self.config.max_blocks_per_cycle - 1);

        debug!("{}: scanning blocks {}..={}", self.chain.as_str(), from, to);
        let raw = self.rpc.transfers_in_range(from, to).await?;
        let events = self.normalize(raw).await;

        if !events.is_empty() {
            info!(
                "{}: {} watched transfers in blocks {}..={}",
                self.chain.as_str(),
                events.len(),
                from,
                to
            );
        }
        // Only now, with the whole window processed, is it safe to advance
        self.cursor = Some(to);
        Ok(events)
    }

    async fn normalize(&self, raw: Vec<RawTransfer>) -> Vec<TransferEvent> {
        let mut events = Vec::new();
        for transfer in raw {
            let (direction, entity) = if let Some(label) =
                self.watchlist.lookup(self.chain, &transfer.from_address)
            {
                (Direction::Outgoing, label.to_string())
            } else if let Some(label) = self.watchlist.lookup(self.chain, &transfer.to_address) {
                (Direction::Incoming, label.to_string())
            } else {
                continue;
            };

            if transfer.amount < self.config.dust_amount {
                continue;
            }

            let (token_id, token_symbol) = match &transfer.token_id {
                Some(address) => {
                    let normalized = self.chain.normalize_address(address);
                    let symbol = self
                        .token_symbols
                        .get(&normalized)
                        .cloned()
                        .unwrap_or_else(|| CompactString::new("UNKNOWN"));
                    (normalized, symbol)
                }
                None => (
                    NATIVE_TOKEN_ID.to_string(),
                    CompactString::new(self.chain.native_symbol()),
                ),
            };

            events.push(TransferEvent {
                tx_hash: transfer.tx_hash,
                chain: self.chain,
                timestamp: transfer.timestamp,
                from_address: transfer.from_address,
                to_address: transfer.to_address,
                token_id,
                token_symbol,
                amount: transfer.amount,
                amount_usd: 0.0,
                direction,
                entity,
                alert_triggered: false,
                metadata: json!({ "block_number": transfer.block_number }),
            });
        }

        self.resolve_usd(&mut events).await;
        events
    }

    async fn resolve_usd(&self, events: &mut [TransferEvent]) {
        let mut token_ids: Vec<String> = events
            .iter()
            .filter_map(|e| {
                if e.is_native() {
                    self.config.native_price_token.clone()
                } else {
                    Some(e.token_id.clone())
                }
            })
            .collect();
        token_ids.sort();
        token_ids.dedup();
        if token_ids.is_empty() {
            return;
        }

        let prices = self.oracle.prices(&token_ids, self.chain).await;
        for event in events {
            let price = if event.is_native() {
                self.config
                    .native_price_token
                    .as_ref()
                    .and_then(|t| prices.get(t))
                    .copied()
                    .unwrap_or(0.0)
            } else {
                prices.get(&event.token_id).copied().unwrap_or(0.0)
            };
            event.amount_usd = event.amount * price;
        }
    }
}
