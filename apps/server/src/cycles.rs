//! Monitoring cycles.
//!
//! Each cycle is an independent loop with its own interval and its own
//! error handling: a failed iteration logs, backs off, and retries that
//! cycle only. Sibling cycles are never affected, and every loop observes
//! the shared running flag so shutdown lets in-flight iterations finish.

use crate::state::SharedState;
use chrono::Utc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use treasury_alerts::NotifierError;
use treasury_core::{Alert, AlertType, PriceSample, Severity, TrackedToken};
use treasury_engine::{ThresholdRatchet, WhaleDetector};
use treasury_scanner::{ScanError, Scanner};
use treasury_store::StoreError;

#[derive(Error, Debug)]
pub enum CycleError {
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Notifier error: {0}")]
    Notifier(#[from] NotifierError),
}

/// Sleep in short slices so shutdown is observed promptly.
async fn sleep_while_running(state: &SharedState, duration: Duration) {
    let deadline = tokio::time::Instant::now() + duration;
    while state.is_running() {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        tokio::time::sleep(remaining.min(Duration::from_millis(250))).await;
    }
}

fn backoff(state: &SharedState) -> Duration {
    Duration::from_secs(state.config.error_backoff_secs)
}

// ==================== CHAIN SCAN ====================

/// One scan iteration: pull the next cursor window, record new transfers,
/// run the transfer detectors, dispatch their alerts.
pub async fn scan_once(
    state: &SharedState,
    scanner: &mut Scanner,
    detector: &WhaleDetector,
) -> Result<usize, CycleError> {
    let events = scanner.scan_once().await?;
    let mut recorded = 0;

    for event in events {
        // A failed write drops this record for the cycle; the cursor has
        // already advanced, but the at-least-once overlap on the next
        // range re-derives anything still unprocessed.
        let inserted = match state.store.save_transaction(&event).await {
            Ok(inserted) => inserted,
            Err(e) => {
                error!("Failed to save transfer {}: {}", event.tx_hash, e);
                continue;
            }
        };
        if !inserted {
            continue;
        }
        recorded += 1;
        state.stats.record_transfer();

        for mut alert in detector.check(&state.store, &event).await? {
            state.stats.record_alert();
            if let Err(e) = state.notifier.dispatch(&mut alert).await {
                error!("Failed to dispatch alert for {}: {}", event.tx_hash, e);
            }
        }
    }
    Ok(recorded)
}

/// Scan loop for one chain.
pub async fn run_scan_cycle(state: SharedState, mut scanner: Scanner) {
    let chain = scanner.chain();
    let interval = state
        .config
        .chains
        .iter()
        .find(|c| c.chain == chain)
        .map(|c| Duration::from_secs(c.scan_interval_secs))
        .unwrap_or(Duration::from_secs(30));
    let detector = WhaleDetector::new((&state.config.whale).into());

    info!("Starting {} scan cycle ({:?} interval)", chain.as_str(), interval);
    while state.is_running() {
        match scan_once(&state, &mut scanner, &detector).await {
            Ok(recorded) => {
                state.stats.record_scan_cycle();
                if recorded > 0 {
                    info!("{}: recorded {} new transfers", chain.as_str(), recorded);
                }
                sleep_while_running(&state, interval).await;
            }
            Err(e) => {
                error!("Error in {} scan cycle: {}", chain.as_str(), e);
                sleep_while_running(&state, backoff(&state)).await;
            }
        }
    }
    info!("{} scan cycle stopped", chain.as_str());
}

// ==================== PRICE TRACKING ====================

/// One price-tracking iteration: fetch prices for the tracked tokens,
/// append samples, run the ratchet, dispatch any alerts.
pub async fn price_once(
    state: &SharedState,
    ratchet: &mut ThresholdRatchet,
) -> Result<usize, CycleError> {
    let tokens = &state.config.tracked_tokens;
    let mut alerts_raised = 0;

    for chain in treasury_core::Chain::all() {
        let chain_tokens: Vec<&TrackedToken> =
            tokens.iter().filter(|t| t.chain == *chain).collect();
        if chain_tokens.is_empty() {
            continue;
        }

        let addresses: Vec<String> =
            chain_tokens.iter().map(|t| t.address.clone()).collect();
        let prices = state.oracle.prices(&addresses, *chain).await;

        for token in chain_tokens {
            let price = prices.get(&token.address).copied().unwrap_or(0.0);
            let now = Utc::now();

            if price > 0.0 {
                let sample = PriceSample::new(token, price, now);
                // A lost sample is not retried; the next cycle samples anew
                if let Err(e) = state.store.save_price_sample(&sample).await {
                    error!("Failed to save price for {}: {}", token.symbol, e);
                    continue;
                }
            }

            match ratchet.evaluate(&state.store, token, price, now).await {
                Ok(Some(mut alert)) => {
                    alerts_raised += 1;
                    state.stats.record_alert();
                    if let Err(e) = state.notifier.dispatch(&mut alert).await {
                        error!("Failed to dispatch price alert: {}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Ratchet evaluation failed for {}: {}", token.symbol, e);
                }
            }
        }
    }
    Ok(alerts_raised)
}

/// Price-tracking loop.
pub async fn run_price_cycle(state: SharedState, mut ratchet: ThresholdRatchet) {
    let interval = Duration::from_secs(state.config.price_check_interval_secs);

    info!(
        "Starting price tracking cycle for {} tokens ({:?} interval)",
        state.config.tracked_tokens.len(),
        interval
    );
    while state.is_running() {
        match price_once(&state, &mut ratchet).await {
            Ok(alerts) => {
                state.stats.record_price_cycle();
                if alerts > 0 {
                    info!("Price tracking generated {} alerts", alerts);
                }
                sleep_while_running(&state, interval).await;
            }
            Err(e) => {
                error!("Error in price tracking cycle: {}", e);
                sleep_while_running(&state, backoff(&state)).await;
            }
        }
    }
    info!("Price tracking cycle stopped");
}

// ==================== RETENTION ====================

/// Daily retention pass over the price history.
pub async fn run_retention_cycle(state: SharedState) {
    let interval = Duration::from_secs(24 * 3600);

    info!(
        "Starting retention cycle ({} day price history)",
        state.config.price_retention_days
    );
    while state.is_running() {
        match state
            .store
            .cleanup_old_prices(state.config.price_retention_days)
            .await
        {
            Ok(_) => sleep_while_running(&state, interval).await,
            Err(e) => {
                error!("Error in retention cycle: {}", e);
                sleep_while_running(&state, backoff(&state)).await;
            }
        }
    }
    info!("Retention cycle stopped");
}

// ==================== DAILY LIMIT ====================

/// One daily-limit iteration: flag entities whose rolling 24h outflow
/// exceeded the configured ceiling, with the activity digest attached.
pub async fn daily_limit_once(state: &SharedState) -> Result<usize, CycleError> {
    let summary = state.store.daily_summary(24).await?;
    if summary.total_transactions == 0 {
        return Ok(0);
    }

    let over_limit = summary.entities_over_limit(state.config.daily_limit_usd);
    let mut raised = 0;
    for entity in over_limit {
        warn!(
            "Daily outflow limit exceeded: {} (${:.2})",
            entity.entity, entity.outgoing_volume_usd
        );
        let mut alert = Alert::new(
            AlertType::DailyLimit,
            &entity.entity,
            Severity::High,
            format!("Daily Outflow Limit - {}", entity.entity),
            format!(
                "{} moved ${:.2} out in 24h across {} transfers (limit ${:.2}).\n\
                 Total activity: {} transfers, ${:.2} volume",
                entity.entity,
                entity.outgoing_volume_usd,
                entity.tx_count,
                state.config.daily_limit_usd,
                summary.total_transactions,
                summary.total_volume_usd
            ),
            Utc::now(),
        )
        .with_amount_usd(entity.outgoing_volume_usd);

        raised += 1;
        state.stats.record_alert();
        if let Err(e) = state.notifier.dispatch(&mut alert).await {
            error!("Failed to dispatch daily-limit alert: {}", e);
        }
    }
    Ok(raised)
}

/// Daily-limit loop. Runs once per day after an initial full window.
pub async fn run_daily_limit_cycle(state: SharedState) {
    let interval = Duration::from_secs(24 * 3600);

    info!("Starting daily-limit cycle (${:.0} ceiling)", state.config.daily_limit_usd);
    while state.is_running() {
        sleep_while_running(&state, interval).await;
        if !state.is_running() {
            break;
        }
        if let Err(e) = daily_limit_once(&state).await {
            error!("Error in daily-limit cycle: {}", e);
            sleep_while_running(&state, backoff(&state)).await;
        }
    }
    info!("Daily-limit cycle stopped");
}
