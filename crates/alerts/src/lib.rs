//! Alert dispatch: rate limiting, formatting, and Telegram delivery.
//!
//! This crate provides:
//! - In-memory sliding-window rate limits (per alert key and global)
//! - Channel-specific message formatting
//! - Best-effort delivery with outcome recording

mod notifier;
mod rate_limit;
mod telegram;

pub use notifier::{Notifier, NotifierError};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use telegram::{format_alert_message, TelegramBot, TelegramError};
