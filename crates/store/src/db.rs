//! SQLite database access.

use crate::summary::{DailySummary, EntityActivity};
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};
use treasury_core::{Alert, AlertType, Chain, Direction, PriceSample, TransferEvent};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Corrupt row: {0}")]
    Decode(String),
}

/// Counts exposed on the health/status surface.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub transactions: i64,
    pub price_samples: i64,
    pub alerts: i64,
    pub database_size_bytes: i64,
}

/// Database connection for the monitor.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect to the SQLite database at the given URL and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("Store initialized: {}", database_url);
        Ok(store)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tx_hash TEXT NOT NULL,
                chain TEXT NOT NULL,
                timestamp DATETIME NOT NULL,
                from_address TEXT NOT NULL,
                to_address TEXT NOT NULL,
                token_id TEXT NOT NULL,
                token_symbol TEXT NOT NULL,
                amount REAL NOT NULL,
                amount_usd REAL NOT NULL,
                direction TEXT NOT NULL,
                entity TEXT NOT NULL,
                alert_triggered INTEGER NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(chain, tx_hash)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_samples (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                token_id TEXT NOT NULL,
                token_symbol TEXT NOT NULL,
                chain TEXT NOT NULL,
                price_usd REAL NOT NULL,
                timestamp DATETIME NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                alert_type TEXT NOT NULL,
                entity TEXT NOT NULL,
                severity TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                tx_hash TEXT,
                amount_usd REAL,
                delivered INTEGER NOT NULL DEFAULT 0,
                timestamp DATETIME NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_transactions_entity_timestamp
             ON transactions(entity, timestamp)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_price_samples_token_timestamp
             ON price_samples(token_id, timestamp)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_alerts_tx_hash_type
             ON alerts(tx_hash, alert_type)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_alerts_timestamp
             ON alerts(timestamp)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ==================== TRANSACTIONS ====================

    /// Save a transfer. Returns true if a new row was inserted, false if the
    /// (chain, tx_hash) pair already existed. The uniqueness constraint is
    /// the only dedup mechanism: concurrent inserts of the same hash race
    /// inside SQLite and at most one wins.
    pub async fn save_transaction(&self, event: &TransferEvent) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO transactions
            (tx_hash, chain, timestamp, from_address, to_address, token_id,
             token_symbol, amount, amount_usd, direction, entity,
             alert_triggered, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.tx_hash)
        .bind(event.chain.as_str())
        .bind(event.timestamp)
        .bind(&event.from_address)
        .bind(&event.to_address)
        .bind(&event.token_id)
        .bind(event.token_symbol.as_str())
        .bind(event.amount)
        .bind(event.amount_usd)
        .bind(event.direction.as_str())
        .bind(&event.entity)
        .bind(event.alert_triggered)
        .bind(event.metadata.to_string())
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            debug!(
                "Saved transaction {} ({}, ${:.2})",
                event.tx_hash, event.entity, event.amount_usd
            );
        }
        Ok(inserted)
    }

    /// Whether a transaction has already been recorded.
    pub async fn is_processed(&self, chain: Chain, tx_hash: &str) -> Result<bool, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM transactions WHERE chain = ? AND tx_hash = ?",
        )
        .bind(chain.as_str())
        .bind(tx_hash)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    /// Set the alert flag on a transaction. The flag only ever goes from
    /// false to true.
    pub async fn mark_alert_triggered(
        &self,
        chain: Chain,
        tx_hash: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE transactions SET alert_triggered = 1 WHERE chain = ? AND tx_hash = ?")
            .bind(chain.as_str())
            .bind(tx_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Transfers recorded within the last `hours` hours, newest first.
    pub async fn recent_transactions(
        &self,
        hours: i64,
    ) -> Result<Vec<TransferEvent>, StoreError> {
        let since = Utc::now() - Duration::hours(hours);
        let rows = sqlx::query(
            r#"
            SELECT tx_hash, chain, timestamp, from_address, to_address,
                   token_id, token_symbol, amount, amount_usd, direction,
                   entity, alert_triggered, metadata
            FROM transactions
            WHERE timestamp > ?
            ORDER BY timestamp DESC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_transfer).collect()
    }

    // ==================== PRICE SAMPLES ====================

    /// Append a price sample. No dedup by design: multiple samples per
    /// cycle are fine.
    pub async fn save_price_sample(&self, sample: &PriceSample) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO price_samples
            (token_id, token_symbol, chain, price_usd, timestamp, metadata)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&sample.token_id)
        .bind(sample.token_symbol.as_str())
        .bind(sample.chain.as_str())
        .bind(sample.price_usd)
        .bind(sample.timestamp)
        .bind(sample.metadata.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent sample for a token.
    pub async fn latest_price(&self, token_id: &str) -> Result<Option<PriceSample>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT token_id, token_symbol, chain, price_usd, timestamp, metadata
            FROM price_samples
            WHERE token_id = ?
            ORDER BY timestamp DESC
            LIMIT 1
            "#,
        )
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_sample).transpose()
    }

    /// Most recent sample at or before the cutoff. Used for
    /// percentage-change computation against a lookback window.
    pub async fn price_at(
        &self,
        token_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<PriceSample>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT token_id, token_symbol, chain, price_usd, timestamp, metadata
            FROM price_samples
            WHERE token_id = ? AND timestamp <= ?
            ORDER BY timestamp DESC
            LIMIT 1
            "#,
        )
        .bind(token_id)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_sample).transpose()
    }

    /// Maximum observed price since the cutoff. Feeds the ratchet's
    /// drop-from-recent-peak reference.
    pub async fn max_price_since(
        &self,
        token_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<f64>, StoreError> {
        let max = sqlx::query_scalar::<_, Option<f64>>(
            "SELECT MAX(price_usd) FROM price_samples WHERE token_id = ? AND timestamp >= ?",
        )
        .bind(token_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(max)
    }

    /// Delete samples older than the cutoff. Returns rows deleted.
    pub async fn cleanup_old_prices(&self, max_age_days: i64) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - Duration::days(max_age_days);
        let result = sqlx::query("DELETE FROM price_samples WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            info!("Cleaned up {} old price samples", deleted);
        }
        Ok(deleted)
    }

    // ==================== ALERTS ====================

    /// Save an alert and return its assigned id.
    pub async fn save_alert(&self, alert: &Alert) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO alerts
            (alert_type, entity, severity, title, message, tx_hash,
             amount_usd, delivered, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(alert.alert_type.as_str())
        .bind(&alert.entity)
        .bind(alert.severity.as_str())
        .bind(&alert.title)
        .bind(&alert.message)
        .bind(&alert.tx_hash)
        .bind(alert.amount_usd)
        .bind(alert.delivered)
        .bind(alert.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Whether an alert of this type was already raised for a transaction.
    pub async fn is_alert_sent(
        &self,
        tx_hash: &str,
        alert_type: AlertType,
    ) -> Result<bool, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM alerts WHERE tx_hash = ? AND alert_type = ?",
        )
        .bind(tx_hash)
        .bind(alert_type.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    /// Record the delivery outcome on an alert.
    pub async fn mark_alert_delivered(&self, id: i64, delivered: bool) -> Result<(), StoreError> {
        sqlx::query("UPDATE alerts SET delivered = ? WHERE id = ?")
            .bind(delivered)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Number of alerts raised within the last `hours` hours.
    pub async fn recent_alert_count(&self, hours: i64) -> Result<i64, StoreError> {
        let since = Utc::now() - Duration::hours(hours);
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM alerts WHERE timestamp > ?")
                .bind(since)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    // ==================== STATS & SUMMARY ====================

    /// Table counts and file size for the health surface.
    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        let transactions =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM transactions")
                .fetch_one(&self.pool)
                .await?;
        let price_samples =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM price_samples")
                .fetch_one(&self.pool)
                .await?;
        let alerts = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM alerts")
            .fetch_one(&self.pool)
            .await?;
        let page_count = sqlx::query_scalar::<_, i64>("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await?;
        let page_size = sqlx::query_scalar::<_, i64>("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreStats {
            transactions,
            price_samples,
            alerts,
            database_size_bytes: page_count * page_size,
        })
    }

    /// Per-entity activity over the last `hours` hours, plus the largest
    /// transfers. Feeds the daily-limit checker and its digest message.
    pub async fn daily_summary(&self, hours: i64) -> Result<DailySummary, StoreError> {
        let since = Utc::now() - Duration::hours(hours);

        let entity_rows = sqlx::query(
            r#"
            SELECT entity,
                   COUNT(*) AS tx_count,
                   SUM(amount_usd) AS volume_usd,
                   SUM(CASE WHEN direction = 'out' THEN amount_usd ELSE 0 END)
                       AS outgoing_volume_usd
            FROM transactions
            WHERE timestamp > ?
            GROUP BY entity
            ORDER BY volume_usd DESC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let entities: Vec<EntityActivity> = entity_rows
            .iter()
            .map(|row| EntityActivity {
                entity: row.get("entity"),
                tx_count: row.get("tx_count"),
                volume_usd: row.get::<Option<f64>, _>("volume_usd").unwrap_or(0.0),
                outgoing_volume_usd: row
                    .get::<Option<f64>, _>("outgoing_volume_usd")
                    .unwrap_or(0.0),
            })
            .collect();

        let top_rows = sqlx::query(
            r#"
            SELECT tx_hash, chain, timestamp, from_address, to_address,
                   token_id, token_symbol, amount, amount_usd, direction,
                   entity, alert_triggered, metadata
            FROM transactions
            WHERE timestamp > ?
            ORDER BY amount_usd DESC
            LIMIT 5
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let top_transfers = top_rows
            .iter()
            .map(row_to_transfer)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DailySummary {
            since,
            total_transactions: entities.iter().map(|e| e.tx_count).sum(),
            total_volume_usd: entities.iter().map(|e| e.volume_usd).sum(),
            entities,
            top_transfers,
        })
    }
}

fn row_to_transfer(row: &sqlx::sqlite::SqliteRow) -> Result<TransferEvent, StoreError> {
    let chain_str: String = row.get("chain");
    let chain = Chain::from_str_id(&chain_str)
        .ok_or_else(|| StoreError::Decode(format!("unknown chain '{chain_str}'")))?;
    let direction_str: String = row.get("direction");
    let direction = Direction::from_str_id(&direction_str)
        .ok_or_else(|| StoreError::Decode(format!("unknown direction '{direction_str}'")))?;
    let symbol: String = row.get("token_symbol");
    let metadata: String = row.get("metadata");

    Ok(TransferEvent {
        tx_hash: row.get("tx_hash"),
        chain,
        timestamp: row.get("timestamp"),
        from_address: row.get("from_address"),
        to_address: row.get("to_address"),
        token_id: row.get("token_id"),
        token_symbol: symbol.into(),
        amount: row.get("amount"),
        amount_usd: row.get("amount_usd"),
        direction,
        entity: row.get("entity"),
        alert_triggered: row.get("alert_triggered"),
        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
    })
}

fn row_to_sample(row: &sqlx::sqlite::SqliteRow) -> Result<PriceSample, StoreError> {
    let chain_str: String = row.get("chain");
    let chain = Chain::from_str_id(&chain_str)
        .ok_or_else(|| StoreError::Decode(format!("unknown chain '{chain_str}'")))?;
    let symbol: String = row.get("token_symbol");
    let metadata: String = row.get("metadata");

    Ok(PriceSample {
        token_id: row.get("token_id"),
        token_symbol: symbol.into(),
        chain,
        price_usd: row.get("price_usd"),
        timestamp: row.get("timestamp"),
        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
    })
}
