//! Alert detectors.
//!
//! This crate provides:
//! - The stateless whale / large-transaction rules
//! - The per-token price-threshold ratchet state machine

mod ratchet;
mod whale;

pub use ratchet::{RatchetConfig, ThresholdRatchet};
pub use whale::{WhaleConfig, WhaleDetector};
