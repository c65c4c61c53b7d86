//! Application state management.

use crate::config::AppConfig;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use treasury_alerts::Notifier;
use treasury_oracle::PriceOracle;
use treasury_store::Store;

/// Statistics for the monitor.
#[derive(Debug, Default)]
pub struct MonitorStats {
    /// Completed scan cycles across all chains.
    pub scan_cycles: AtomicU64,
    /// Completed price-tracking cycles.
    pub price_cycles: AtomicU64,
    /// New transfers recorded.
    pub transfers_recorded: AtomicU64,
    /// Alerts raised by the detectors.
    pub alerts_raised: AtomicU64,
    /// Start time in milliseconds.
    pub started_at_ms: AtomicU64,
    /// Last successful cycle activity, for the health check.
    pub last_activity_ms: AtomicU64,
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

impl MonitorStats {
    pub fn new() -> Self {
        let now = now_ms();
        let stats = Self::default();
        stats.started_at_ms.store(now, Ordering::Relaxed);
        stats.last_activity_ms.store(now, Ordering::Relaxed);
        stats
    }

    pub fn record_scan_cycle(&self) {
        self.scan_cycles.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    pub fn record_price_cycle(&self) {
        self.price_cycles.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    pub fn record_transfer(&self) {
        self.transfers_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert(&self) {
        self.alerts_raised.fetch_add(1, Ordering::Relaxed);
    }

    /// Refresh the activity timestamp.
    pub fn touch(&self) {
        self.last_activity_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        (now_ms().saturating_sub(self.started_at_ms.load(Ordering::Relaxed))) / 1000
    }

    pub fn seconds_since_activity(&self) -> u64 {
        (now_ms().saturating_sub(self.last_activity_ms.load(Ordering::Relaxed))) / 1000
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            scan_cycles: self.scan_cycles.load(Ordering::Relaxed),
            price_cycles: self.price_cycles.load(Ordering::Relaxed),
            transfers_recorded: self.transfers_recorded.load(Ordering::Relaxed),
            alerts_raised: self.alerts_raised.load(Ordering::Relaxed),
            uptime_secs: self.uptime_secs(),
        }
    }
}

/// Summary of statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub scan_cycles: u64,
    pub price_cycles: u64,
    pub transfers_recorded: u64,
    pub alerts_raised: u64,
    pub uptime_secs: u64,
}

/// Application state shared across cycles and the HTTP surface.
pub struct AppState {
    pub config: AppConfig,
    pub store: Store,
    pub oracle: Arc<PriceOracle>,
    pub notifier: Notifier,
    pub stats: MonitorStats,
    running: AtomicBool,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Store,
        oracle: Arc<PriceOracle>,
        notifier: Notifier,
    ) -> SharedState {
        Arc::new(Self {
            config,
            store,
            oracle,
            notifier,
            stats: MonitorStats::new(),
            running: AtomicBool::new(false),
        })
    }

    /// Start the monitor.
    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    /// Request cooperative shutdown. In-flight cycle iterations finish.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
