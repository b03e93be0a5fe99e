// =============================================================================
// Trade Gate — admission state machine and anti-overtrading guardrails
// =============================================================================
//
// States: `Idle -> Scanning -> Evaluating(symbol) -> Executing(symbol) -> Idle`.
// At most one scan runs at a time (`is_processing`); per-symbol exclusion is
// a scoped lock released on every exit path via `SymbolLockGuard`'s `Drop`.
//
// Twelve ordered admission checks gate each candidate (spec order preserved
// below); the first failure rejects that candidate and the gate moves on to
// the next-ranked one. Grounded on `trade_insurance::InsuranceGate`'s
// first-failure-blocks gate-chain idiom.
// =============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::{EngineConfig, Timeframe};
use crate::error::GateRejection;
use crate::exchange::{CorrelationManager, ExchangeClient, OrderRequest};
use crate::position_manager::{CloseReason, Position, PositionCloseHandler, PositionManager};
use crate::risk::RiskEngine;
use crate::risk_calculator::{RiskCalculator, SltpContext};
use crate::types::{Direction, GradedSignal};

/// One graded opportunity ranked by the scheduler, ready for gate evaluation.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub graded: GradedSignal,
    pub entry_price: f64,
    pub rsi: Option<f64>,
    pub atr: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub size: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub rrr: f64,
}

/// Per-symbol and global anti-overtrading bookkeeping.
#[derive(Debug, Default)]
struct OvertradingState {
    last_trade_time_by_symbol: HashMap<String, i64>,
    last_global_trade_ms: i64,
    consecutive_longs: u32,
    consecutive_shorts: u32,
    consecutive_losses: u32,
    paused_until_ms: i64,
}

pub struct TradeGate {
    state: Mutex<OvertradingState>,
    locks: Mutex<HashSet<String>>,
    is_processing: AtomicBool,
    position_manager: Arc<PositionManager>,
}

/// Releases a symbol's lock on drop, regardless of which admission check
/// exits the evaluation.
struct SymbolLockGuard<'a> {
    locks: &'a Mutex<HashSet<String>>,
    symbol: String,
}

impl<'a> Drop for SymbolLockGuard<'a> {
    fn drop(&mut self) {
        self.locks.lock().remove(&self.symbol);
    }
}

impl TradeGate {
    pub fn new(position_manager: Arc<PositionManager>) -> Self {
        Self {
            state: Mutex::new(OvertradingState::default()),
            locks: Mutex::new(HashSet::new()),
            is_processing: AtomicBool::new(false),
            position_manager,
        }
    }

    pub fn is_paused(&self) -> bool {
        Utc::now().timestamp_millis() < self.state.lock().paused_until_ms
    }

    /// Evaluate a cycle's ranked candidates and execute at most one. Returns
    /// `Ok(None)` when the cycle is skipped or no candidate survives every
    /// gate, `Ok(Some(outcome))` on a successful execution.
    #[allow(clippy::too_many_arguments)]
    pub async fn run_cycle(
        &self,
        candidates: &[Candidate],
        exchange: &dyn ExchangeClient,
        correlation: &dyn CorrelationManager,
        risk_engine: &RiskEngine,
        cfg: &EngineConfig,
    ) -> Result<Option<ExecutionOutcome>, GateRejection> {
        // Check 1: non-reentrancy.
        if self
            .is_processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(GateRejection::new("isProcessing", "cycle already in progress, skipping"));
        }
        let _processing_guard = scopeguard(&self.is_processing);

        // Check 2: cooling-off pause.
        if self.is_paused() {
            return Err(GateRejection::new("pausedUntilMs", "loss-streak pause active"));
        }

        // Check 3: reconcile and cap concurrent positions.
        let real_positions = exchange
            .get_positions()
            .await
            .map_err(|e| GateRejection::new("reconcile", e.to_string()))?;
        if real_positions.len() as u32 >= cfg.max_concurrent_trades {
            return Err(GateRejection::new(
                "maxConcurrentTrades",
                format!("{} active >= {} max", real_positions.len(), cfg.max_concurrent_trades),
            ));
        }

        for candidate in candidates {
            match self
                .try_admit(candidate, exchange, correlation, risk_engine, cfg, &real_positions)
                .await
            {
                Ok(outcome) => return Ok(Some(outcome)),
                Err(rejection) => {
                    info!(symbol = %candidate.symbol, stage = rejection.stage, reason = %rejection.reason, "candidate rejected");
                }
            }
        }

        Ok(None)
    }

    async fn try_admit(
        &self,
        candidate: &Candidate,
        exchange: &dyn ExchangeClient,
        correlation: &dyn CorrelationManager,
        risk_engine: &RiskEngine,
        cfg: &EngineConfig,
        real_positions: &[crate::exchange::RawPosition],
    ) -> Result<ExecutionOutcome, GateRejection> {
        let symbol = &candidate.symbol;

        // Check 4: not already held, not locked.
        if real_positions.iter().any(|p| &p.symbol == symbol) {
            return Err(GateRejection::new("duplicatePosition", "symbol already has a real position"));
        }
        if self.locks.lock().contains(symbol) {
            return Err(GateRejection::new("symbolLock", "symbol lock held by another evaluation"));
        }
        self.locks.lock().insert(symbol.clone());
        let _lock_guard = SymbolLockGuard { locks: &self.locks, symbol: symbol.clone() };

        let now = Utc::now().timestamp_millis();
        let direction = candidate.graded.raw.direction;

        // Checks 5-7: cooldowns and consecutive-direction cap.
        {
            let state = self.state.lock();
            if let Some(&last) = state.last_trade_time_by_symbol.get(symbol) {
                if now - last < cfg.symbol_cooldown_ms as i64 {
                    return Err(GateRejection::new("symbolCooldown", "symbol traded too recently"));
                }
            }
            if now - state.last_global_trade_ms < cfg.global_cooldown_ms as i64 {
                return Err(GateRejection::new("globalCooldown", "global cooldown active"));
            }
            match direction {
                Direction::Short if state.consecutive_shorts >= cfg.max_consecutive_same_direction => {
                    return Err(GateRejection::new("consecutiveDirection", "too many consecutive shorts"));
                }
                Direction::Long if state.consecutive_longs >= cfg.max_consecutive_same_direction => {
                    return Err(GateRejection::new("consecutiveDirection", "too many consecutive longs"));
                }
                _ => {}
            }
        }

        // Check 8: double-read race defeat.
        let recheck = exchange
            .get_positions()
            .await
            .map_err(|e| GateRejection::new("raceRecheck", e.to_string()))?;
        if recheck.iter().any(|p| &p.symbol == symbol) {
            return Err(GateRejection::new("raceRecheck", "symbol now present on exchange"));
        }

        // Check 9: correlation.
        let verdict = correlation.can_trade(symbol, &recheck);
        if !verdict.allowed {
            return Err(GateRejection::new("correlation", verdict.reasons.join("; ")));
        }

        // Check 10: mandatory RSI gate.
        if cfg.use_rsi_filter {
            if let Some(rsi) = candidate.rsi {
                if direction == Direction::Long && rsi >= cfg.rsi_overbought {
                    return Err(GateRejection::new("rsiGate", format!("rsi {rsi:.1} >= overbought {:.1}", cfg.rsi_overbought)));
                }
                if direction == Direction::Short && rsi <= cfg.rsi_oversold {
                    return Err(GateRejection::new("rsiGate", format!("rsi {rsi:.1} <= oversold {:.1}", cfg.rsi_oversold)));
                }
            }
        }

        // Check 11: balance.
        let balance = exchange
            .get_account_balance()
            .await
            .map_err(|e| GateRejection::new("balance", e.to_string()))?;
        if balance.total_equity < 1.0 {
            return Err(GateRejection::new("balance", "total equity below $1"));
        }
        let (risk_allowed, risk_reason) = risk_engine.can_trade();
        if !risk_allowed {
            return Err(GateRejection::new("riskEngine", risk_reason.unwrap_or_else(|| "circuit breaker tripped".to_string())));
        }

        // Check 12: SL/TP/size.
        let preset = candidate.timeframe.preset();
        let ctx = SltpContext {
            suggested_sl: candidate.graded.raw.suggested_sl,
            suggested_tp: candidate.graded.raw.suggested_tp,
            sl_source: candidate.graded.raw.sl_source,
            tp_source: candidate.graded.raw.tp_source,
            atr: candidate.atr,
        };
        let sltp = RiskCalculator::calculate_sltp(candidate.entry_price, direction, preset.default_tp_pct, preset.default_sl_pct, cfg, &ctx)
            .ok_or_else(|| GateRejection::new("riskCalculator", "no usable SL/TP for this mode"))?;
        if cfg.min_rrr > 0.0 && !sltp.meets_min_rrr {
            return Err(GateRejection::new("riskCalculator", format!("rrr {:.2} below minimum {:.2}", sltp.rrr, cfg.min_rrr)));
        }
        let size = RiskCalculator::calculate_position_size(balance.total_equity, candidate.entry_price, sltp.sl, cfg.leverage, cfg.risk_per_trade_pct);
        if size <= 0.0 {
            return Err(GateRejection::new("riskCalculator", "position size is zero"));
        }
        RiskCalculator::validate_trade(direction, candidate.entry_price, sltp.sl, sltp.tp, size, cfg.min_rrr)
            .map_err(|reason| GateRejection::new("riskCalculator", reason))?;

        // Execution.
        let order = OrderRequest {
            symbol: symbol.clone(),
            is_buy: direction == Direction::Long,
            size,
            price: candidate.entry_price,
            take_profit: sltp.tp,
            stop_loss: sltp.sl,
            leverage: cfg.leverage,
        };
        let ack = exchange
            .place_order_with_tpsl(order)
            .await
            .map_err(|e| GateRejection::new("execution", e.to_string()))?;

        self.position_manager.track(Position {
            symbol: symbol.clone(),
            direction,
            entry_price: ack.filled_price,
            size: ack.filled_size,
            stop_loss: sltp.sl,
            take_profit: sltp.tp,
            opened_at_ms: now,
            leverage: cfg.leverage,
            from_sync: false,
            analysis_snapshot: Some(format!("{:?}", candidate.graded)),
        });

        {
            let mut state = self.state.lock();
            state.last_trade_time_by_symbol.insert(symbol.clone(), now);
            state.last_global_trade_ms = now;
            match direction {
                Direction::Long => {
                    state.consecutive_longs += 1;
                    state.consecutive_shorts = 0;
                }
                Direction::Short => {
                    state.consecutive_shorts += 1;
                    state.consecutive_longs = 0;
                }
                Direction::None => {}
            }
        }

        Ok(ExecutionOutcome {
            symbol: symbol.clone(),
            direction,
            entry_price: ack.filled_price,
            size: ack.filled_size,
            stop_loss: sltp.sl,
            take_profit: sltp.tp,
            rrr: sltp.rrr,
        })
    }
}

/// Resets `is_processing` to `false` when the evaluation scope ends, no
/// matter which admission check returned early.
fn scopeguard(flag: &AtomicBool) -> impl Drop + '_ {
    struct Reset<'a>(&'a AtomicBool);
    impl<'a> Drop for Reset<'a> {
        fn drop(&mut self) {
            self.0.store(false, Ordering::SeqCst);
        }
    }
    Reset(flag)
}

impl PositionCloseHandler for TradeGate {
    /// On loss, bump the streak and trip the cooling-off pause past the
    /// configured threshold. On win, the streak resets and any pause clears.
    fn on_position_closed(&self, symbol: &str, pnl: f64, reason: CloseReason) {
        let mut state = self.state.lock();
        if pnl < 0.0 {
            state.consecutive_losses += 1;
            warn!(symbol, pnl, reason = %reason, streak = state.consecutive_losses, "position closed at a loss");
        } else {
            if state.consecutive_losses > 0 || state.paused_until_ms > 0 {
                info!(symbol, pnl, "winning close resets loss streak and clears pause");
            }
            state.consecutive_losses = 0;
            state.paused_until_ms = 0;
        }
    }
}

impl TradeGate {
    /// Applies the `maxConsecutiveLosses` / `pauseAfterLossesMs` policy once
    /// the loss streak has been updated by `on_position_closed`. Exposed
    /// separately because it needs `cfg`, which `PositionCloseHandler`
    /// doesn't carry.
    pub fn apply_loss_pause_policy(&self, cfg: &EngineConfig) {
        let mut state = self.state.lock();
        if state.consecutive_losses >= cfg.max_consecutive_losses {
            let now = Utc::now().timestamp_millis();
            state.paused_until_ms = now + cfg.pause_after_losses_ms as i64;
            warn!(
                streak = state.consecutive_losses,
                pause_ms = cfg.pause_after_losses_ms,
                "consecutive loss threshold hit, entering cooling-off pause"
            );
        }
    }
}
