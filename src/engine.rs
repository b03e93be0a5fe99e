// =============================================================================
// Engine — owned, constructor-injected wiring of every collaborator
// =============================================================================
//
// Replaces the teacher's `app_state.rs` mutable-singleton `AppState`: instead
// of a God struct handed around as `Arc<AppState>` and mutated from a dozen
// loops, each collaborator (Scheduler, PriceFetcher, TradeGate,
// PositionManager, RiskEngine, EventHub) is built once here and owns its own
// concurrency primitives. `Engine::start` spawns exactly two long-running
// loops — the scheduler's analysis cycle and the position reconciliation
// poll — and returns a shutdown handle the caller can drive from `ctrl_c`.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::{EngineConfig, StrategyKind};
use crate::exchange::{CorrelationManager, ExchangeClient};
use crate::events::EventHub;
use crate::position_manager::PositionManager;
use crate::price_fetcher::PriceFetcher;
use crate::risk::RiskEngine;
use crate::scheduler::Scheduler;
use crate::strategy::{BollingerSqueezeStrategy, IchimokuStrategy, SmcStrategy, Strategy};
use crate::trade_gate::TradeGate;

const POSITION_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// The scheduler's tick rate: the fastest `analysisIntervalMs` among the
/// configured timeframes' presets, so the cycle keeps up with whichever
/// timeframe demands the most frequent scan. Falls back to the 15m preset's
/// interval when no timeframe is configured.
fn analysis_interval(cfg: &EngineConfig) -> Duration {
    let ms = cfg
        .timeframes
        .iter()
        .map(|tf| tf.preset().analysis_interval_ms)
        .min()
        .unwrap_or_else(|| crate::config::Timeframe::M15.preset().analysis_interval_ms);
    Duration::from_millis(ms)
}

/// Everything the running engine needs, built once and shared by `Arc`.
pub struct Engine {
    cfg: Arc<RwLock<EngineConfig>>,
    scheduler: Arc<Scheduler>,
    position_manager: Arc<PositionManager>,
    trade_gate: Arc<TradeGate>,
    risk_engine: Arc<RiskEngine>,
    exchange: Arc<dyn ExchangeClient>,
    events: Arc<EventHub>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Engine {
    /// Wire every collaborator. `starting_capital` seeds the risk engine's
    /// percentage baselines — normally the account's current equity, fetched
    /// by the caller via `ExchangeClient::get_account_balance` before
    /// construction so a single failed balance call aborts startup cleanly
    /// rather than mid-wiring.
    pub fn new(
        cfg: EngineConfig,
        exchange: Arc<dyn ExchangeClient>,
        correlation: Arc<dyn CorrelationManager>,
        starting_capital: f64,
    ) -> Self {
        let cfg = Arc::new(RwLock::new(cfg));
        let snapshot = cfg.read().clone();

        let price_fetcher = Arc::new(PriceFetcher::new(exchange.clone()));
        let position_manager = Arc::new(PositionManager::new());
        let trade_gate = Arc::new(TradeGate::new(position_manager.clone()));
        let risk_engine = Arc::new(RiskEngine::new(
            starting_capital,
            snapshot.max_daily_loss_pct,
            snapshot.max_consecutive_losses,
            snapshot.max_drawdown_pct,
            snapshot.max_trades_per_day,
        ));
        let events = Arc::new(EventHub::new());

        let mut strategies: std::collections::HashMap<StrategyKind, Arc<dyn Strategy>> =
            std::collections::HashMap::new();
        strategies.insert(StrategyKind::Ichimoku, Arc::new(IchimokuStrategy));
        strategies.insert(StrategyKind::Smc, Arc::new(SmcStrategy));
        strategies.insert(StrategyKind::Bollinger, Arc::new(BollingerSqueezeStrategy));

        let scheduler = Arc::new(Scheduler::new(
            cfg.clone(),
            price_fetcher,
            strategies,
            trade_gate.clone(),
            exchange.clone(),
            correlation,
            risk_engine.clone(),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            cfg,
            scheduler,
            position_manager,
            trade_gate,
            risk_engine,
            exchange,
            events,
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn events(&self) -> Arc<EventHub> {
        self.events.clone()
    }

    pub fn config_snapshot(&self) -> EngineConfig {
        self.cfg.read().clone()
    }

    /// Spawns the scheduler's analysis loop and the position-reconciliation
    /// poll, then blocks until `shutdown` is signalled. Both loops share the
    /// same `watch::Receiver` so a single `shutdown()` call stops everything.
    pub async fn start(self: Arc<Self>) {
        let scheduler_handle = {
            let scheduler = self.scheduler.clone();
            let shutdown = self.shutdown_rx.clone();
            let interval = analysis_interval(&self.cfg.read());
            tokio::spawn(async move {
                scheduler.start(interval, shutdown).await;
            })
        };

        let reconcile_handle = {
            let engine = self.clone();
            let mut shutdown = self.shutdown_rx.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(POSITION_POLL_INTERVAL);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            engine.reconcile_positions().await;
                        }
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                info!("position reconciliation loop shutting down");
                                break;
                            }
                        }
                    }
                }
            })
        };

        let _ = tokio::join!(scheduler_handle, reconcile_handle);
    }

    /// Signals every spawned loop to stop after its current iteration.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    async fn reconcile_positions(&self) {
        if let Err(e) = self
            .position_manager
            .poll(self.exchange.as_ref(), self.trade_gate.as_ref())
            .await
        {
            warn!(error = %e, "position reconciliation failed");
            return;
        }
        let cfg = self.cfg.read().clone();
        self.trade_gate.apply_loss_pause_policy(&cfg);
    }
}
