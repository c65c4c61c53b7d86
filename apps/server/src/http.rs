//! Health/status HTTP surface.

use crate::state::SharedState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

/// Activity staleness after which the service reports degraded.
const STALE_ACTIVITY_SECS: u64 = 600;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Liveness probe. 200 for healthy and degraded, 503 when the database is
/// unreachable.
async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    match state.store.stats().await {
        Ok(_) => {
            let stale = state.stats.seconds_since_activity() > STALE_ACTIVITY_SECS;
            let status = if !state.is_running() || stale {
                "degraded"
            } else {
                "healthy"
            };
            (
                StatusCode::OK,
                Json(json!({
                    "status": status,
                    "service": "treasury-monitor",
                    "checks": {
                        "database": "ok",
                        "activity": if stale { "stale" } else { "ok" },
                    },
                })),
            )
        }
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "error": e.to_string(),
            })),
        ),
    }
}

/// Detailed state: runtime stats plus store contents.
async fn status(State(state): State<SharedState>) -> impl IntoResponse {
    let summary = state.stats.summary();
    let store_stats = state.store.stats().await.unwrap_or_default();
    let recent_alerts = state.store.recent_alert_count(24).await.unwrap_or(0);

    Json(json!({
        "running": state.is_running(),
        "notifications_enabled": state.notifier.is_enabled(),
        "stats": summary,
        "store": {
            "transactions": store_stats.transactions,
            "price_samples": store_stats.price_samples,
            "alerts": store_stats.alerts,
            "database_size_mb": store_stats.database_size_bytes as f64 / (1024.0 * 1024.0),
        },
        "alerts_last_24h": recent_alerts,
        "watched_addresses": state.config.watchlist.len(),
        "tracked_tokens": state.config.tracked_tokens.len(),
    }))
}

/// Bare counters for scraping.
async fn metrics(State(state): State<SharedState>) -> impl IntoResponse {
    let summary = state.stats.summary();
    Json(json!({
        "scan_cycles": summary.scan_cycles,
        "price_cycles": summary.price_cycles,
        "transfers_recorded": summary.transfers_recorded,
        "alerts_raised": summary.alerts_raised,
        "uptime_secs": summary.uptime_secs,
    }))
}
