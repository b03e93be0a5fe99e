// =============================================================================
// Aurora Futures Nexus — Main Entry Point
// =============================================================================
//
// The engine loads persisted config (falling back to safe defaults), builds
// the exchange client and risk/engine stack, then runs until Ctrl+C. Startup
// always forces Demo + Paused regardless of what was persisted — switching to
// Live trading is an explicit operator action, never a config-file default.
// =============================================================================

mod config;
mod engine;
mod error;
mod events;
mod exchange;
mod indicators;
mod market_data;
mod position_manager;
mod price_fetcher;
mod risk;
mod risk_calculator;
mod scheduler;
mod signal_grader;
mod strategy;
mod trade_gate;
mod types;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;
use crate::exchange::auth::EnvAuthProvider;
use crate::exchange::binance_futures::BinanceFuturesClient;
use crate::exchange::{AuthProvider, CorrelationManager, ExchangeClient, PermissiveCorrelationManager};
use crate::types::{AccountMode, TradingMode};

const CONFIG_PATH: &str = "engine_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Aurora Futures Nexus — Starting Up                ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut cfg = EngineConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load engine config, using defaults");
        EngineConfig::default()
    });

    // SAFETY: force Demo + Paused on startup regardless of what was persisted.
    cfg.trading_mode = TradingMode::Paused;
    cfg.account_mode = AccountMode::Demo;

    if let Ok(syms) = std::env::var("AURORA_SYMBOLS") {
        cfg.symbols = syms
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }

    if let Err(e) = cfg.validate() {
        error!(error = %e, "engine config failed validation, aborting startup");
        return Err(anyhow::anyhow!(e));
    }

    info!(
        symbols = ?cfg.symbols,
        timeframes = ?cfg.timeframes,
        strategy = %cfg.strategy,
        trading_mode = %cfg.trading_mode,
        account_mode = %cfg.account_mode,
        "engine starting in SAFE mode (Demo + Paused)"
    );

    let auth = EnvAuthProvider::from_env();
    if !auth.is_ready() {
        warn!("exchange credentials not configured — engine will run in Demo mode only");
    } else if let Err(e) = auth.test_connection().await {
        warn!(error = %e, "exchange connectivity check failed");
    }

    let api_key = std::env::var("BINANCE_API_KEY").unwrap_or_default();
    let api_secret = std::env::var("BINANCE_API_SECRET").unwrap_or_default();
    let exchange: Arc<dyn ExchangeClient> = Arc::new(BinanceFuturesClient::new(api_key, api_secret));
    let correlation: Arc<dyn CorrelationManager> = Arc::new(PermissiveCorrelationManager);

    let starting_capital = match exchange.get_account_balance().await {
        Ok(balance) => balance.total_equity,
        Err(e) => {
            warn!(error = %e, "failed to fetch account balance, defaulting starting capital to 10,000");
            10_000.0
        }
    };

    let engine = Arc::new(crate::engine::Engine::new(cfg.clone(), exchange, correlation, starting_capital));

    let run_handle = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.start().await })
    };

    info!("engine running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received — stopping gracefully");

    engine.shutdown();
    let _ = run_handle.await;

    if let Err(e) = cfg.save(CONFIG_PATH) {
        error!(error = %e, "failed to save engine config on shutdown");
    }

    info!("Aurora Futures Nexus shut down complete.");
    Ok(())
}
