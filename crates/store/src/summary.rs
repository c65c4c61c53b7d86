//! Aggregated activity views over the transaction log.

use chrono::{DateTime, Utc};
use serde::Serialize;
use treasury_core::TransferEvent;

/// One entity's activity within the summary window.
#[derive(Debug, Clone, Serialize)]
pub struct EntityActivity {
    pub entity: String,
    pub tx_count: i64,
    /// Combined USD volume, both directions.
    pub volume_usd: f64,
    /// Outgoing USD volume only; compared against the daily limit.
    pub outgoing_volume_usd: f64,
}

/// Rolling-window activity digest, ordered by volume descending.
#[derive(Debug, Clone, Serialize)]
pub struct DailySummary {
    pub since: DateTime<Utc>,
    pub total_transactions: i64,
    pub total_volume_usd: f64,
    pub entities: Vec<EntityActivity>,
    pub top_transfers: Vec<TransferEvent>,
}

impl DailySummary {
    /// Entities whose outflow exceeded the given USD ceiling.
    pub fn entities_over_limit(&self, limit_usd: f64) -> Vec<&EntityActivity> {
        self.entities
            .iter()
            .filter(|e| e.outgoing_volume_usd >= limit_usd)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_entities_over_limit() {
        let summary = DailySummary {
            since: Utc::now(),
            total_transactions: 3,
            total_volume_usd: 900_000.0,
            entities: vec![
                EntityActivity {
                    entity: "VitaDAO".to_string(),
                    tx_count: 2,
                    volume_usd: 700_000.0,
                    outgoing_volume_usd: 600_000.0,
                },
                EntityActivity {
                    entity: "BIO Protocol".to_string(),
                    tx_count: 1,
                    volume_usd: 200_000.0,
                    outgoing_volume_usd: 100_000.0,
                },
            ],
            top_transfers: vec![],
        };

        let over = summary.entities_over_limit(500_000.0);
        assert_eq!(over.len(), 1);
        assert_eq!(over[0].entity, "VitaDAO");
        assert!(summary.entities_over_limit(1_000_000.0).is_empty());
    }
}
