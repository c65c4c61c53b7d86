//! Telegram delivery and message formatting.

use teloxide::prelude::*;
use teloxide::types::ParseMode;
use thiserror::Error;
use treasury_core::Alert;

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("Telegram API error: {0}")]
    Api(#[from] teloxide::RequestError),
}

/// Telegram bot wrapper bound to a single alert chat.
pub struct TelegramBot {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramBot {
    /// Create a new bot with the given token and target chat.
    pub fn new(token: &str, chat_id: i64) -> Self {
        Self {
            bot: Bot::new(token),
            chat_id: ChatId(chat_id),
        }
    }

    /// Send an alert message to the configured chat.
    pub async fn send_alert(&self, message: &str) -> Result<(), TelegramError> {
        self.bot
            .send_message(self.chat_id, message)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }
}

/// Format an alert as an HTML Telegram message.
pub fn format_alert_message(alert: &Alert) -> String {
    let mut msg = format!(
        "{} <b>{}</b>\n\n{}",
        alert.severity.marker(),
        alert.title,
        alert.message
    );

    if let Some(amount_usd) = alert.amount_usd {
        msg.push_str(&format!("\n\n💵 <b>Value:</b> ${:.2}", amount_usd));
    }
    if let Some(tx_hash) = &alert.tx_hash {
        msg.push_str(&format!(
            "\n🔗 <b>Tx:</b> <code>{}</code>",
            truncate_hash(tx_hash)
        ));
    }
    msg.push_str(&format!(
        "\n\n⏰ {}",
        alert.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    msg
}

/// Shorten a transaction hash for display.
fn truncate_hash(hash: &str) -> String {
    if hash.len() <= 20 {
        hash.to_string()
    } else {
        format!("{}...{}", &hash[..10], &hash[hash.len() - 6..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use treasury_core::{AlertType, Severity};

    #[test]
    fn test_truncate_hash() {
        assert_eq!(truncate_hash("0xshort"), "0xshort");
        let long = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";
        let truncated = truncate_hash(long);
        assert_eq!(truncated, "0xddf252ad...23b3ef");
    }

    #[test]
    fn test_format_alert_message() {
        let timestamp = Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap();
        let alert = Alert::new(
            AlertType::WhaleTransfer,
            "BIO Protocol",
            Severity::High,
            "🐋 BIO Whale Alert",
            "Large BIO transfer: 1500000.00 tokens ($52500.00)",
            timestamp,
        )
        .with_tx_hash("0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef")
        .with_amount_usd(52_500.0);

        let msg = format_alert_message(&alert);
        assert!(msg.starts_with("🚨 <b>🐋 BIO Whale Alert</b>"));
        assert!(msg.contains("💵 <b>Value:</b> $52500.00"));
        assert!(msg.contains("<code>0xddf252ad...23b3ef</code>"));
        assert!(msg.contains("2025-03-01 12:30:00 UTC"));
    }

    #[test]
    fn test_format_without_transaction_fields() {
        let alert = Alert::new(
            AlertType::PriceDrop,
            "VitaDAO",
            Severity::Medium,
            "Price Drop Alert - VITA (-5%)",
            "VITA price dropped 6.00%",
            Utc::now(),
        );

        let msg = format_alert_message(&alert);
        assert!(msg.starts_with("⚠️"));
        assert!(!msg.contains("Value:"));
        assert!(!msg.contains("Tx:"));
    }
}
