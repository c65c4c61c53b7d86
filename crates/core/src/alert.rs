//! Alert records raised by the detectors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of condition that raised an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertType {
    LargeTransaction,
    PriceDrop,
    PriceSpike,
    WhaleTransfer,
    DailyLimit,
}

impl AlertType {
    /// Identifier stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            AlertType::LargeTransaction => "large_transaction",
            AlertType::PriceDrop => "price_drop",
            AlertType::PriceSpike => "price_spike",
            AlertType::WhaleTransfer => "whale_transfer",
            AlertType::DailyLimit => "daily_limit",
        }
    }

    /// Parse from the database identifier.
    pub fn from_str_id(s: &str) -> Option<Self> {
        match s {
            "large_transaction" => Some(AlertType::LargeTransaction),
            "price_drop" => Some(AlertType::PriceDrop),
            "price_spike" => Some(AlertType::PriceSpike),
            "whale_transfer" => Some(AlertType::WhaleTransfer),
            "daily_limit" => Some(AlertType::DailyLimit),
            _ => None,
        }
    }
}

/// Alert severity, also drives the marker in outbound messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn from_str_id(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }

    /// Visual marker used by the notification channel.
    pub fn marker(self) -> &'static str {
        match self {
            Severity::Low => "ℹ️",
            Severity::Medium => "⚠️",
            Severity::High => "🚨",
            Severity::Critical => "🔴",
        }
    }

    /// Severity tier for a transaction by USD value.
    pub fn for_transaction_usd(amount_usd: f64) -> Self {
        if amount_usd >= 100_000.0 {
            Severity::Critical
        } else if amount_usd >= 50_000.0 {
            Severity::High
        } else if amount_usd >= 25_000.0 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    /// Severity tier for a price drop. Drops of 20% or more are high.
    pub fn for_price_drop(change_pct: f64) -> Self {
        if change_pct <= -20.0 {
            Severity::High
        } else {
            Severity::Medium
        }
    }
}

/// An alert raised by a detector. `id` is 0 until the store assigns one;
/// `delivered` is recorded by the dispatcher after the send attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub alert_type: AlertType,
    /// DAO, token, or wallet the alert concerns.
    pub entity: String,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Related transaction, for transfer-based alerts.
    pub tx_hash: Option<String>,
    pub amount_usd: Option<f64>,
    pub delivered: bool,
}

impl Alert {
    pub fn new(
        alert_type: AlertType,
        entity: impl Into<String>,
        severity: Severity,
        title: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            alert_type,
            entity: entity.into(),
            severity,
            title: title.into(),
            message: message.into(),
            timestamp,
            tx_hash: None,
            amount_usd: None,
            delivered: false,
        }
    }

    /// Attach the related transaction hash.
    pub fn with_tx_hash(mut self, tx_hash: impl Into<String>) -> Self {
        self.tx_hash = Some(tx_hash.into());
        self
    }

    /// Attach the USD amount involved.
    pub fn with_amount_usd(mut self, amount_usd: f64) -> Self {
        self.amount_usd = Some(amount_usd);
        self
    }
}
