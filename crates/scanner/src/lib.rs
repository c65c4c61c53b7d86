//! Per-chain transaction scanners.
//!
//! This crate provides:
//! - A chain-RPC abstraction over JSON-RPC endpoints
//! - EVM and Solana implementations (block/log scans, balance deltas)
//! - The cursor-driven scanner that turns raw chain activity into
//!   normalized transfer events for the store

mod evm;
mod rpc;
mod scanner;
mod solana;

pub use evm::EvmRpc;
pub use rpc::{ChainRpc, RawTransfer, ScanError};
pub use scanner::{Scanner, ScannerConfig};
pub use solana::SolanaRpc;
