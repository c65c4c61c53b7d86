//! EVM chain RPC client.

use crate::rpc::{ChainRpc, RawTransfer, ScanError};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use treasury_core::Chain;

/// ERC-20 Transfer(address,address,uint256) event signature.
const TRANSFER_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// ERC-20 decimals() function selector.
const DECIMALS_SELECTOR: &str = "0x313ce567";

const WEI_PER_ETH: f64 = 1e18;

const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON-RPC client for an EVM endpoint.
///
/// Token transfers come from `eth_getLogs` filtered to the Transfer topic
/// with the watch-list addresses in the from/to topic positions; native
/// transfers from full-transaction block bodies. Token decimals are read
/// once per contract and cached.
pub struct EvmRpc {
    client: reqwest::Client,
    url: String,
    /// Watched addresses as padded 32-byte topics, for log filters.
    watch_topics: Vec<String>,
    decimals_cache: DashMap<String, u8>,
}

impl EvmRpc {
    pub fn new(url: impl Into<String>, chain: Chain, watch_addresses: &[String]) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(RPC_TIMEOUT)
                .build()
                .unwrap_or_default(),
            url: url.into(),
            watch_topics: watch_addresses
                .iter()
                .map(|a| address_to_topic(&chain.normalize_address(a)))
                .collect(),
            decimals_cache: DashMap::new(),
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

    /// Token decimals via eth_call, cached per contract. Defaults to 18
    /// when the contract does not answer.
    async fn decimals(&self, token: &str) -> u8 {
        if let Some(cached) = self.decimals_cache.get(token) {
            return *cached;
        }

        let result = self
            .call(
                "eth_call",
                json!([{ "to": token, "data": DECIMALS_SELECTOR }, "latest"]),
            )
            .await;

        let decimals = match result {
            Ok(Value::String(hex)) => parse_hex_u64(&hex).map(|d| d as u8).unwrap_or(18),
            _ => 18,
        };
        self.decimals_cache.insert(token.to_string(), decimals);
        decimals
    }

    /// Fetch one block with full transactions. Returns (timestamp, txs).
    async fn block_with_transactions(
        &self,
        number: u64,
    ) -> Result<Option<(DateTime<Utc>, Vec<Value>)>, ScanError> {
        let result = self
            .call(
                "eth_getBlockByNumber",
                json!([format!("0x{number:x}"), true]),
            )
            .await?;
        if result.is_null() {
            return Ok(None);
        }

        let timestamp = result
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(parse_hex_u64)
            .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single())
            .unwrap_or_else(Utc::now);
        let txs = result
            .get("transactions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(Some((timestamp, txs)))
    }

    async fn token_transfers(
        &self,
        from: u64,
        to: u64,
        timestamps: &HashMap<u64, DateTime<Utc>>,
    ) -> Result<Vec<RawTransfer>, ScanError> {
        let mut logs: Vec<Value> = Vec::new();
        // eth_getLogs cannot OR across topic positions, so the watched
        // addresses are queried once as sender and once as recipient.
        for topic_position in [1usize, 2] {
            let mut topics = vec![json!(TRANSFER_TOPIC), Value::Null, Value::Null];
            topics[topic_position] = json!(self.watch_topics);
            let result = self
                .call(
                    "eth_getLogs",
                    json!([{
                        "fromBlock": format!("0x{from:x}"),
                        "toBlock": format!("0x{to:x}"),
                        "topics": topics,
                    }]),
                )
                .await?;
            if let Some(batch) = result.as_array() {
                logs.extend(batch.iter().cloned());
            }
        }

        let mut transfers = Vec::with_capacity(logs.len());
        let mut seen = std::collections::HashSet::new();
        for log in &logs {
            // A malformed log is skipped; it must not abort the scan
            let Some(decoded) = decode_transfer_log(log) else {
                debug!("Skipping undecodable transfer log");
                continue;
            };
            // The two topic queries overlap for self-transfers
            if !seen.insert((decoded.tx_hash.clone(), decoded.log_index)) {
                continue;
            }

            let decimals = self.decimals(&decoded.token).await;
            let timestamp = timestamps
                .get(&decoded.block_number)
                .copied()
                .unwrap_or_else(Utc::now);
            transfers.push(RawTransfer {
                tx_hash: decoded.tx_hash,
                block_number: decoded.block_number,
                timestamp,
                from_address: decoded.from,
                to_address: decoded.to,
                token_id: Some(decoded.token),
                amount: decoded.raw_amount / 10f64.powi(decimals as i32),
            });
        }
        Ok(transfers)
    }
}

#[async_trait]
impl ChainRpc for EvmRpc {
    async fn latest_height(&self) -> Result<u64, ScanError> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        result
            .as_str()
            .and_then(parse_hex_u64)
            .ok_or_else(|| ScanError::Rpc(format!("bad eth_blockNumber result: {result}")))
    }

    async fn transfers_in_range(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<RawTransfer>, ScanError> {
        let mut transfers = Vec::new();
        let mut timestamps = HashMap::new();

        for number in from..=to {
            let Some((timestamp, txs)) = self.block_with_transactions(number).await? else {
                warn!("Block {number} not available yet");
                continue;
            };
            timestamps.insert(number, timestamp);

            for tx in &txs {
                if let Some(transfer) = decode_native_tx(tx, number, timestamp) {
                    transfers.push(transfer);
                }
            }
        }

        transfers.extend(self.token_transfers(from, to, &timestamps).await?);
        Ok(transfers)
    }
}

struct DecodedLog {
    tx_hash: String,
    log_index: u64,
    block_number: u64,
    token: String,
    from: String,
    to: String,
    raw_amount: f64,
}

/// Decode an ERC-20 Transfer log. Returns None for anything malformed.
fn decode_transfer_log(log: &Value) -> Option<DecodedLog> {
    let topics = log.get("topics")?.as_array()?;
    if topics.len() < 3 || topics[0].as_str()? != TRANSFER_TOPIC {
        return None;
    }

    Some(DecodedLog {
        tx_hash: log.get("transactionHash")?.as_str()?.to_string(),
        log_index: parse_hex_u64(log.get("logIndex")?.as_str()?)?,
        block_number: parse_hex_u64(log.get("blockNumber")?.as_str()?)?,
        token: log.get("address")?.as_str()?.to_lowercase(),
        from: topic_to_address(topics[1].as_str()?)?,
        to: topic_to_address(topics[2].as_str()?)?,
        raw_amount: parse_hex_amount(log.get("data")?.as_str()?)?,
    })
}

/// Decode a native-value transaction from a full block body.
fn decode_native_tx(tx: &Value, block_number: u64, timestamp: DateTime<Utc>) -> Option<RawTransfer> {
    let value = parse_hex_amount(tx.get("value")?.as_str()?)?;
    if value <= 0.0 {
        return None;
    }

    Some(RawTransfer {
        tx_hash: tx.get("hash")?.as_str()?.to_string(),
        block_number,
        timestamp,
        from_address: tx.get("from")?.as_str()?.to_lowercase(),
        // Contract creations have no recipient
        to_address: tx.get("to")?.as_str()?.to_lowercase(),
        token_id: None,
        amount: value / WEI_PER_ETH,
    })
}

/// Pad an address into a 32-byte log topic.
fn address_to_topic(address: &str) -> String {
    let bare = address.strip_prefix("0x").unwrap_or(address);
    format!("0x{:0>64}", bare)
}

/// Extract the address from a 32-byte log topic.
fn topic_to_address(topic: &str) -> Option<String> {
    let bare = topic.strip_prefix("0x")?;
    if bare.len() != 64 {
        return None;
    }
    Some(format!("0x{}", &bare[24..].to_lowercase()))
}

fn parse_hex_u64(hex: &str) -> Option<u64> {
    let bare = hex.strip_prefix("0x").unwrap_or(hex);
    u64::from_str_radix(bare, 16).ok()
}

/// Parse an arbitrary-width hex quantity into f64. uint256 values exceed
/// u128, so the digits are folded in floating point; monitoring thresholds
/// tolerate the precision loss.
fn parse_hex_amount(hex: &str) -> Option<f64> {
    let bare = hex.strip_prefix("0x").unwrap_or(hex);
    if bare.is_empty() {
        return None;
    }
    let mut value = 0.0f64;
    for c in bare.chars() {
        value = value * 16.0 + c.to_digit(16)? as f64;
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn transfer_log(tx_hash: &str, log_index: u64, raw_amount_hex: &str) -> Value {
        json!({
            "address": "0x81F8f0bb1cB2A06649E51913A151F0E7Ef6FA321",
            "topics": [
                TRANSFER_TOPIC,
                "0x000000000000000000000000f5307a74d1550739ef81c6488dc5c7a6a53e5ac2",
                "0x0000000000000000000000001234567890abcdef1234567890abcdef12345678",
            ],
            "data": raw_amount_hex,
            "blockNumber": "0x121eac0",
            "transactionHash": tx_hash,
            "logIndex": format!("0x{log_index:x}"),
        })
    }

    #[test]
    fn test_decode_transfer_log() {
        // 1000 tokens with 18 decimals = 0x3635c9adc5dea00000
        let log = transfer_log("0xaaa", 0, "0x00000000000000000000000000000000000000000000003635c9adc5dea00000");
        let decoded = decode_transfer_log(&log).unwrap();

        assert_eq!(decoded.token, "0x81f8f0bb1cb2a06649e51913a151f0e7ef6fa321");
        assert_eq!(decoded.from, "0xf5307a74d1550739ef81c6488dc5c7a6a53e5ac2");
        assert_eq!(decoded.to, "0x1234567890abcdef1234567890abcdef12345678");
        assert_eq!(decoded.block_number, 0x121eac0);
        let amount = decoded.raw_amount / 1e18;
        assert!((amount - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_one_malformed_log_does_not_poison_the_batch() {
        let mut logs: Vec<Value> = (0..50)
            .map(|i| {
                transfer_log(
                    &format!("0x{i:064x}"),
                    i,
                    "0x0000000000000000000000000000000000000000000000000de0b6b3a7640000",
                )
            })
            .collect();
        // Missing topics entirely
        logs.push(json!({ "data": "0xgarbage", "blockNumber": "0x1" }));

        let decoded: Vec<_> = logs.iter().filter_map(decode_transfer_log).collect();
        assert_eq!(decoded.len(), 50);
    }

    #[test]
    fn test_decode_native_tx() {
        let timestamp = Utc::now();
        let tx = json!({
            "hash": "0xbbb",
            "from": "0xF5307a74d1550739ef81c6488DC5C7a6a53e5Ac2",
            "to": "0x1234567890abcdef1234567890abcdef12345678",
            "value": "0xde0b6b3a7640000",
        });

        let transfer = decode_native_tx(&tx, 100, timestamp).unwrap();
        assert_eq!(transfer.token_id, None);
        assert!((transfer.amount - 1.0).abs() < 1e-9);
        assert_eq!(transfer.from_address, "0xf5307a74d1550739ef81c6488dc5c7a6a53e5ac2");

        // Zero-value and contract-creation transactions are skipped
        let zero = json!({ "hash": "0xccc", "from": "0xaa", "to": "0xbb", "value": "0x0" });
        assert!(decode_native_tx(&zero, 100, timestamp).is_none());
        let creation = json!({ "hash": "0xddd", "from": "0xaa", "to": null, "value": "0x1" });
        assert!(decode_native_tx(&creation, 100, timestamp).is_none());
    }

    #[test]
    fn test_topic_address_roundtrip() {
        let topic = address_to_topic("0xf5307a74d1550739ef81c6488dc5c7a6a53e5ac2");
        assert_eq!(topic.len(), 66);
        assert_eq!(
            topic_to_address(&topic).unwrap(),
            "0xf5307a74d1550739ef81c6488dc5c7a6a53e5ac2"
        );
        assert_eq!(topic_to_address("0xshort"), None);
    }

    #[test]
    fn test_parse_hex_amount() {
        assert_eq!(parse_hex_amount("0x0"), Some(0.0));
        assert_eq!(parse_hex_amount("0xff"), Some(255.0));
        assert_eq!(parse_hex_amount("0xzz"), None);
        assert_eq!(parse_hex_amount("0x"), None);
        // A uint256-scale value parses without overflow
        let big = parse_hex_amount(
            "0xffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
        .unwrap();
        assert!(big > 1e70);
    }
}
