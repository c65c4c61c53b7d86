//! Treasury Monitor - Headless Server
//!
//! Watches treasury and whale addresses for transfers and token-price
//! moves, raising deduplicated, rate-limited alerts to Telegram.

mod config;
mod cycles;
mod http;
mod state;

use clap::Parser;
use config::AppConfig;
use state::{AppState, SharedState};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use compact_str::CompactString;
use treasury_alerts::{Notifier, RateLimiter, TelegramBot};
use treasury_core::WatchList;
use treasury_engine::ThresholdRatchet;
use treasury_oracle::{CoinGeckoProvider, GeckoTerminalProvider, OracleConfig, PriceOracle};
use treasury_scanner::{ChainRpc, EvmRpc, Scanner, SolanaRpc};
use treasury_store::Store;

/// Treasury Monitor CLI
#[derive(Parser, Debug)]
#[command(name = "treasury-monitor")]
#[command(about = "Treasury and whale transfer monitor", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.json")]
    config: String,

    /// Mode: monitor, status
    #[arg(short, long, default_value = "monitor")]
    mode: String,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Database URL override
    #[arg(long)]
    database_url: Option<String>,

    /// Health endpoint port override
    #[arg(long)]
    port: Option<u16>,
}

fn init_logging(level: &str) {
    let level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// Build the notifier from environment credentials. Missing credentials
/// leave the dispatcher in record-only mode; the rest of the system keeps
/// operating.
fn build_notifier(store: Store, config: &AppConfig) -> Notifier {
    let bot = match (
        std::env::var("TELEGRAM_BOT_TOKEN"),
        std::env::var("TELEGRAM_CHAT_ID"),
    ) {
        (Ok(token), Ok(chat_id)) => match chat_id.parse::<i64>() {
            Ok(chat_id) => Some(Arc::new(TelegramBot::new(&token, chat_id))),
            Err(_) => {
                warn!("Invalid TELEGRAM_CHAT_ID, notifications disabled");
                None
            }
        },
        _ => None,
    };

    Notifier::new(
        store,
        bot,
        RateLimiter::new((&config.notifications).into()),
    )
}

/// Build one chain's scanner, or None when its RPC endpoint is not
/// configured (that chain's cycle is disabled; siblings run degraded).
fn build_scanner(
    state: &SharedState,
    settings: &config::ChainSettings,
    watchlist: &Arc<WatchList>,
) -> Option<Scanner> {
    let Some(rpc_url) = settings.resolve_rpc_url() else {
        warn!(
            "{}_RPC_URL not set - {} scanning disabled",
            settings.chain.as_str().to_uppercase(),
            settings.chain.as_str()
        );
        return None;
    };

    let addresses = watchlist.addresses_for(settings.chain);
    if addresses.is_empty() {
        warn!("No watched addresses on {} - scanning disabled", settings.chain.as_str());
        return None;
    }

    let rpc: Arc<dyn ChainRpc> = if settings.chain.is_evm() {
        Arc::new(EvmRpc::new(rpc_url, settings.chain, &addresses))
    } else {
        Arc::new(SolanaRpc::new(rpc_url, addresses))
    };

    let token_symbols: HashMap<String, CompactString> = state
        .config
        .tracked_tokens
        .iter()
        .filter(|t| t.chain == settings.chain)
        .map(|t| (settings.chain.normalize_address(&t.address), t.symbol.clone()))
        .collect();

    Some(Scanner::new(
        settings.chain,
        rpc,
        state.oracle.clone(),
        watchlist.clone(),
        token_symbols,
        settings.into(),
    ))
}

async fn show_status(state: &SharedState) {
    let stats = match state.store.stats().await {
        Ok(stats) => stats,
        Err(e) => {
            error!("Failed to read store stats: {}", e);
            return;
        }
    };

    println!("=== TREASURY MONITOR STATUS ===");
    println!("Database:");
    println!("  Transactions: {}", stats.transactions);
    println!("  Price samples: {}", stats.price_samples);
    println!("  Alerts: {}", stats.alerts);
    println!(
        "  Size: {:.2} MB",
        stats.database_size_bytes as f64 / (1024.0 * 1024.0)
    );
    println!("Configuration:");
    println!("  Watched addresses: {}", state.config.watchlist.len());
    println!("  Tracked tokens: {}", state.config.tracked_tokens.len());
    println!("  Notifications: {}", if state.notifier.is_enabled() { "enabled" } else { "disabled" });
}

async fn run_monitor(state: SharedState) {
    state.start();

    // Environment diagnostics, so a degraded deployment is obvious in logs
    info!("Environment:");
    for chain_settings in &state.config.chains {
        info!(
            "  {} RPC: {}",
            chain_settings.chain.as_str(),
            if chain_settings.resolve_rpc_url().is_some() { "✅ set" } else { "❌ not set" }
        );
    }
    info!(
        "  Telegram: {}",
        if state.notifier.is_enabled() { "✅ configured" } else { "❌ not configured" }
    );

    let watchlist = Arc::new(WatchList::from_addresses(&state.config.watchlist));
    info!(
        "Watching {} addresses, tracking {} tokens",
        watchlist.len(),
        state.config.tracked_tokens.len()
    );

    let mut handles = Vec::new();

    // One scan cycle per configured chain
    for chain_settings in state.config.chains.clone() {
        if !chain_settings.enabled {
            continue;
        }
        if let Some(scanner) = build_scanner(&state, &chain_settings, &watchlist) {
            let scan_state = state.clone();
            handles.push(tokio::spawn(async move {
                cycles::run_scan_cycle(scan_state, scanner).await;
            }));
        }
    }

    // Price tracking
    if state.config.tracked_tokens.is_empty() {
        warn!("No tracked tokens - price tracking disabled");
    } else {
        let price_state = state.clone();
        let ratchet = ThresholdRatchet::new((&state.config.ratchet).into());
        handles.push(tokio::spawn(async move {
            cycles::run_price_cycle(price_state, ratchet).await;
        }));
    }

    // Retention and daily-limit cycles
    let retention_state = state.clone();
    handles.push(tokio::spawn(async move {
        cycles::run_retention_cycle(retention_state).await;
    }));
    let daily_state = state.clone();
    handles.push(tokio::spawn(async move {
        cycles::run_daily_limit_cycle(daily_state).await;
    }));

    if handles.is_empty() {
        error!("No monitoring cycles could be started");
    }

    // Health/status surface
    let http_handle = {
        let addr = format!("0.0.0.0:{}", state.config.port);
        let router = http::router(state.clone());
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => {
                info!("Health endpoints on {}", addr);
                Some(tokio::spawn(async move {
                    if let Err(e) = axum::serve(listener, router).await {
                        error!("HTTP server error: {}", e);
                    }
                }))
            }
            Err(e) => {
                error!("Failed to bind {}: {}", addr, e);
                None
            }
        }
    };

    info!("Press Ctrl+C to stop...");
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for Ctrl+C");

    warn!("Shutdown signal received");
    state.stop();

    // Let in-flight iterations finish, then stop waiting
    for handle in handles {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
    if let Some(handle) = http_handle {
        handle.abort();
    }

    let summary = state.stats.summary();
    info!("Final stats:");
    info!("  Uptime: {}s", summary.uptime_secs);
    info!("  Scan cycles: {}", summary.scan_cycles);
    info!("  Price cycles: {}", summary.price_cycles);
    info!("  Transfers recorded: {}", summary.transfers_recorded);
    info!("  Alerts raised: {}", summary.alerts_raised);
    info!("Treasury monitor stopped");
}

#[tokio::main]
async fn main() {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_logging(&args.log_level);

    info!("🚀 Treasury Monitor starting...");
    info!("  Mode: {}", args.mode);

    let mut config = AppConfig::load(&args.config);
    if let Some(database_url) = args.database_url {
        config.database_url = database_url;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    // The store is the one hard dependency: without it nothing can
    // dedup or record, so a connection failure is fatal at startup
    let store = match Store::connect(&config.database_url).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let oracle = Arc::new(PriceOracle::new(
        Arc::new(CoinGeckoProvider::new(std::env::var("COINGECKO_API_KEY").ok())),
        Arc::new(GeckoTerminalProvider::new()),
        OracleConfig::default(),
    ));
    let notifier = build_notifier(store.clone(), &config);
    let state = AppState::new(config, store, oracle, notifier);

    match args.mode.as_str() {
        "status" => show_status(&state).await,
        _ => run_monitor(state).await,
    }
}
