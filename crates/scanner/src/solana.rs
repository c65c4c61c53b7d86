//! Solana chain RPC client.

use crate::rpc::{ChainRpc, RawTransfer, ScanError};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const LAMPORTS_PER_SOL: f64 = 1e9;

const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum signatures requested per watched address per cycle.
const SIGNATURE_BATCH_LIMIT: u64 = 200;

/// JSON-RPC client for a Solana endpoint (Helius-compatible).
///
/// Solana has no address-indexed log filter, so transfers are discovered
/// per watched address via `getSignaturesForAddress` and reconstructed from
/// pre/post balance deltas of each confirmed transaction. Slots play the
/// role of block heights for the cursor.
pub struct SolanaRpc {
    client: reqwest::Client,
    url: String,
    watch_addresses: Vec<String>,
}

impl SolanaRpc {
    pub fn new(url: impl Into<String>, watch_addresses: Vec<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(RPC_TIMEOUT)
                .build()
                .unwrap_or_default(),
            url: url.into(),
            watch_addresses,
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ScanError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response: Value = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.get("error") {
            return Err(ScanError::Rpc(format!("{method}: {error}")));
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Confirmed signatures for one address within the slot range.
    async fn signatures_in_range(
        &self,
        address: &str,
        from: u64,
        to: u64,
    ) -> Result<Vec<String>, ScanError> {
        let result = self
            .call(
                "getSignaturesForAddress",
                json!([address, { "limit": SIGNATURE_BATCH_LIMIT }]),
            )
            .await?;

        let signatures = result
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| {
                        let slot = entry.get("slot").and_then(Value::as_u64).unwrap_or(0);
                        let failed = entry.get("err").map(|e| !e.is_null()).unwrap_or(false);
                        slot >= from && slot <= to && !failed
                    })
                    .filter_map(|entry| entry.get("signature")?.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        Ok(signatures)
    }

    async fn transaction(&self, signature: &str) -> Result<Value, ScanError> {
        self.call(
            "getTransaction",
            json!([signature, {
                "encoding": "json",
                "commitment": "confirmed",
                "maxSupportedTransactionVersion": 0,
            }]),
        )
        .await
    }
}

#[async_trait]
impl ChainRpc for SolanaRpc {
    async fn latest_height(&self) -> Result<u64, ScanError> {
        let result = self.call("getSlot", json!([])).await?;
        result
            .as_u64()
            .ok_or_else(|| ScanError::Rpc(format!("bad getSlot result: {result}")))
    }

    async fn transfers_in_range(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<RawTransfer>, ScanError> {
        let mut transfers = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for address in &self.watch_addresses {
            let signatures = self.signatures_in_range(address, from, to).await?;
            for signature in signatures {
                if !seen.insert(signature.clone()) {
                    continue;
                }
                let tx = self.transaction(&signature).await?;
                if tx.is_null() {
                    debug!("No transaction data for signature {signature}");
                    continue;
                }
                transfers.extend(parse_balance_deltas(&tx, &signature, address));
            }
        }
        Ok(transfers)
    }
}

/// Reconstruct the watched address's transfers from a transaction's
/// pre/post balances. Token transfers come from the token-balance deltas,
/// native SOL from the lamport delta of the address's account. Malformed
/// entries yield nothing rather than an error.
fn parse_balance_deltas(tx: &Value, signature: &str, address: &str) -> Vec<RawTransfer> {
    let mut transfers = Vec::new();

    let slot = tx.get("slot").and_then(Value::as_u64).unwrap_or(0);
    let timestamp = tx
        .get("blockTime")
        .and_then(Value::as_i64)
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Utc::now);
    let Some(meta) = tx.get("meta") else {
        return transfers;
    };

    // Token balances: delta per (owner, mint)
    let mut changes: HashMap<String, (f64, f64)> = HashMap::new();
    for (field, is_pre) in [("preTokenBalances", true), ("postTokenBalances", false)] {
        for balance in meta.get(field).and_then(Value::as_array).into_iter().flatten() {
            let owner = balance.get("owner").and_then(Value::as_str).unwrap_or("");
            if owner != address {
                continue;
            }
            let mint = balance.get("mint").and_then(Value::as_str).unwrap_or("");
            let amount = balance
                .pointer("/uiTokenAmount/uiAmount")
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            let entry = changes.entry(mint.to_string()).or_insert((0.0, 0.0));
            if is_pre {
                entry.0 = amount;
            } else {
                entry.1 = amount;
            }
        }
    }

    for (mint, (pre, post)) in changes {
        let delta = post - pre;
        if delta == 0.0 || mint.is_empty() {
            continue;
        }
        let outgoing = delta < 0.0;
        transfers.push(RawTransfer {
            tx_hash: signature.to_string(),
            block_number: slot,
            timestamp,
            // Counterparties are not identified from balance deltas alone
            from_address: if outgoing { address.to_string() } else { "unknown".to_string() },
            to_address: if outgoing { "unknown".to_string() } else { address.to_string() },
            token_id: Some(mint),
            amount: delta.abs(),
        });
    }

    // Native SOL: lamport delta at the address's account index
    let account_keys = tx
        .pointer("/transaction/message/accountKeys")
        .and_then(Value::as_array);
    if let Some(keys) = account_keys {
        let index = keys
            .iter()
            .position(|key| key.as_str() == Some(address));
        if let Some(index) = index {
            let pre = meta
                .pointer(&format!("/preBalances/{index}"))
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            let post = meta
                .pointer(&format!("/postBalances/{index}"))
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            let delta = (post - pre) / LAMPORTS_PER_SOL;
            if delta != 0.0 {
                let outgoing = delta < 0.0;
                transfers.push(RawTransfer {
                    tx_hash: signature.to_string(),
                    block_number: slot,
                    timestamp,
                    from_address: if outgoing { address.to_string() } else { "unknown".to_string() },
                    to_address: if outgoing { "unknown".to_string() } else { address.to_string() },
                    token_id: None,
                    amount: delta.abs(),
                });
            }
        }
    }

    transfers
}
