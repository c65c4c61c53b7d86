//! SQLite persistence for transactions, price samples, and alerts.
//!
//! This crate provides:
//! - Idempotent transaction recording (dedup by unique tx hash)
//! - An append-only token price time series with windowed lookups
//! - Alert records with delivery outcome tracking

mod db;
mod summary;

pub use db::{Store, StoreError, StoreStats};
pub use summary::{DailySummary, EntityActivity};
