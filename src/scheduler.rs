// =============================================================================
// Scheduler — the cycle loop driving analysis and trade-gate dispatch
// =============================================================================
//
// Each tick: increment the cycle counter, walk the symbols x timeframes
// product sequentially (PriceFetcher -> IndicatorKit -> StrategyEngine ->
// SignalGrader), collect every tradeable opportunity, rank them, and hand
// the ranked list to `TradeGate::run_cycle` for a single dispatch.
//
// Non-reentrant: `is_processing` is a tick-drop-on-overrun guard — if a
// cycle is still running when the next tick fires, that tick is skipped and
// logged rather than queued, mirroring the teacher's cancellable ticker
// design (no unbounded backlog of overlapping cycles).
// =============================================================================

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::config::{EngineConfig, StrategyKind};
use crate::exchange::{CorrelationManager, ExchangeClient, FundingBias, FundingInfo};
use crate::indicators::analyze_all;
use crate::indicators::ichimoku::chikou_confirmation;
use crate::indicators::supertrend::{supertrend_standard, SupertrendDirection};
use crate::price_fetcher::PriceFetcher;
use crate::risk::RiskEngine;
use crate::signal_grader::{GraderContext, SignalGrader};
use crate::strategy::Strategy;
use crate::trade_gate::{Candidate, ExecutionOutcome, TradeGate};
use crate::types::Direction;

const CANDLE_LIMIT: usize = 300;
/// Standard Ichimoku displacement, used for the opt-in Chikou filter.
const CHIKOU_DISPLACEMENT: usize = 26;
/// Quality-score gap below which two candidates are treated as tied.
const QUALITY_SCORE_TOLERANCE: f64 = 5.0;
/// Win-probability gap below which two candidates are treated as tied.
const WIN_PROBABILITY_TOLERANCE: f64 = 0.01;

pub struct Scheduler {
    cfg: Arc<RwLock<EngineConfig>>,
    price_fetcher: Arc<PriceFetcher>,
    strategies: std::collections::HashMap<StrategyKind, Arc<dyn Strategy>>,
    trade_gate: Arc<TradeGate>,
    exchange: Arc<dyn ExchangeClient>,
    correlation: Arc<dyn CorrelationManager>,
    risk_engine: Arc<RiskEngine>,
    cycle_count: AtomicU64,
    is_processing: AtomicBool,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: Arc<RwLock<EngineConfig>>,
        price_fetcher: Arc<PriceFetcher>,
        strategies: std::collections::HashMap<StrategyKind, Arc<dyn Strategy>>,
        trade_gate: Arc<TradeGate>,
        exchange: Arc<dyn ExchangeClient>,
        correlation: Arc<dyn CorrelationManager>,
        risk_engine: Arc<RiskEngine>,
    ) -> Self {
        Self {
            cfg,
            price_fetcher,
            strategies,
            trade_gate,
            exchange,
            correlation,
            risk_engine,
            cycle_count: AtomicU64::new(0),
            is_processing: AtomicBool::new(false),
        }
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count.load(Ordering::SeqCst)
    }

    /// Runs `run_cycle` on a fixed-interval ticker until `shutdown` resolves.
    pub async fn start(&self, interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One scan-evaluate-dispatch cycle. Never reentrant with itself.
    pub async fn run_cycle(&self) {
        if self
            .is_processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("scheduler tick dropped: previous cycle still running");
            return;
        }
        let cycle = self.cycle_count.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.run_cycle_inner(cycle).await;
        self.is_processing.store(false, Ordering::SeqCst);
        if let Err(e) = result {
            warn!(cycle, error = %e, "cycle ended with an unrecovered error");
        }
    }

    async fn run_cycle_inner(&self, cycle: u64) -> Result<(), String> {
        let started_at = Instant::now();
        let cfg = self.cfg.read().clone();
        let mut candidates: Vec<Candidate> = Vec::new();

        for symbol in &cfg.symbols {
            for &timeframe in &cfg.timeframes {
                match self.evaluate_pair(symbol, timeframe, &cfg).await {
                    Ok(Some(candidate)) => candidates.push(candidate),
                    Ok(None) => {}
                    Err(e) => warn!(symbol, timeframe = %timeframe, error = %e, "pair evaluation skipped"),
                }
            }
        }

        candidates.sort_by(opportunity_order);

        let symbol_count = cfg.symbols.len();
        let timeframe_count = cfg.timeframes.len();
        let elapsed_ms = started_at.elapsed().as_millis();
        let opportunity_count = candidates.len();
        info!(
            cycle,
            symbol_count,
            timeframe_count,
            elapsed_ms,
            opportunity_count,
            "Cycle {cycle} — {symbol_count} symbols × {timeframe_count} tf ({elapsed_ms} ms) — {opportunity_count} opportunities"
        );

        match self
            .trade_gate
            .run_cycle(&candidates, self.exchange.as_ref(), self.correlation.as_ref(), &self.risk_engine, &cfg)
            .await
        {
            Ok(Some(ExecutionOutcome { symbol, direction, entry_price, size, .. })) => {
                info!(cycle, symbol, ?direction, entry_price, size, "trade executed");
            }
            Ok(None) => {}
            Err(rejection) => {
                info!(cycle, stage = rejection.stage, reason = %rejection.reason, "cycle produced no trade");
            }
        }

        Ok(())
    }

    async fn evaluate_pair(&self, symbol: &str, timeframe: crate::config::Timeframe, cfg: &EngineConfig) -> Result<Option<Candidate>, String> {
        let candles = self
            .price_fetcher
            .get_candles(symbol, timeframe, CANDLE_LIMIT)
            .await
            .map_err(|e| e.to_string())?;
        if candles.is_empty() {
            return Ok(None);
        }

        let bundle = analyze_all(&candles);
        let entry_price = candles.last().map(|c| c.close).unwrap_or(0.0);

        let strategy = self
            .strategies
            .get(&cfg.strategy)
            .ok_or_else(|| format!("no strategy registered for {:?}", cfg.strategy))?;
        let raw = strategy.analyze(&candles, timeframe, cfg);
        tracing::debug!(symbol, timeframe = %timeframe, strategy = strategy.name(), "pair analyzed");

        if raw.direction == Direction::None {
            return Ok(None);
        }

        let funding_bonus = match self.exchange.get_funding_rate(symbol).await {
            Ok(info) => funding_bonus_for(raw.direction, &info),
            Err(e) => {
                warn!(symbol, error = %e, "funding rate unavailable, treating as neutral");
                0.0
            }
        };

        let chikou_ok = if cfg.enable_chikou_filter {
            chikou_confirmation(&candles, CHIKOU_DISPLACEMENT)
                .map(|bias| direction_agrees(raw.direction, bias))
                .unwrap_or(true)
        } else {
            true
        };

        let supertrend_ok = if cfg.enable_supertrend_filter {
            supertrend_standard(&candles)
                .map(|result| {
                    let bullish = result.direction == SupertrendDirection::Up;
                    (raw.direction == Direction::Long) == bullish
                })
                .unwrap_or(true)
        } else {
            true
        };

        let preset = timeframe.preset();
        let ctx = GraderContext {
            fakeout_flag: false,
            liquidity_sufficient: true,
            funding_bonus,
            mtf_consensus_bonus: 0.0,
            chikou_ok,
            supertrend_ok,
        };
        let graded = SignalGrader::grade(&raw, &bundle, &preset, &ctx);
        if !graded.tradeable {
            return Ok(None);
        }

        Ok(Some(Candidate {
            symbol: symbol.to_string(),
            timeframe,
            graded,
            entry_price,
            rsi: bundle.rsi,
            atr: bundle.atr.map(|a| a.value),
        }))
    }
}

/// Maps a funding-rate read onto the grader's `fund` term, which expects
/// roughly `-1..+2`: a signal aligned with the candidate's direction gets a
/// bonus scaled by `FundingInfo::strength`, an opposed one a smaller penalty.
fn funding_bonus_for(direction: Direction, info: &FundingInfo) -> f64 {
    match (info.signal, direction) {
        (FundingBias::Bullish, Direction::Long) => 2.0 * info.strength,
        (FundingBias::Bullish, Direction::Short) => -info.strength,
        (FundingBias::Bearish, Direction::Short) => 2.0 * info.strength,
        (FundingBias::Bearish, Direction::Long) => -info.strength,
        (FundingBias::Neutral, _) | (_, Direction::None) => 0.0,
    }
}

/// `true` when a Chikou-span bias (positive = bullish) agrees with `direction`.
fn direction_agrees(direction: Direction, bias: f64) -> bool {
    match direction {
        Direction::Long => bias > 0.0,
        Direction::Short => bias < 0.0,
        Direction::None => true,
    }
}

/// Deterministic opportunity ranking: grade (A>B>C>D) first, then
/// `quality_score` (only decisive past a 5-point gap), then `win_probability`
/// (only decisive past a 0.01 gap), then confluence, then `|score|`. Every key
/// falls through to the next on a tie/near-tie so the order is total.
fn opportunity_order(a: &Candidate, b: &Candidate) -> CmpOrdering {
    let grade_cmp = b.graded.grade.cmp(&a.graded.grade);
    if grade_cmp != CmpOrdering::Equal {
        return grade_cmp;
    }

    let quality_gap = a.graded.quality_score - b.graded.quality_score;
    if quality_gap.abs() >= QUALITY_SCORE_TOLERANCE {
        return if quality_gap > 0.0 { CmpOrdering::Less } else { CmpOrdering::Greater };
    }

    let win_prob_gap = a.graded.win_probability - b.graded.win_probability;
    if win_prob_gap.abs() > WIN_PROBABILITY_TOLERANCE {
        return if win_prob_gap > 0.0 { CmpOrdering::Less } else { CmpOrdering::Greater };
    }

    let confluence_cmp = b.graded.raw.confluence.cmp(&a.graded.raw.confluence);
    if confluence_cmp != CmpOrdering::Equal {
        return confluence_cmp;
    }

    b.graded.raw.abs_score.cmp(&a.graded.raw.abs_score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timeframe;
    use crate::exchange::{AccountBalance, CloseAck, FundingInfo, OrderAck, OrderRequest, PermissiveCorrelationManager, RawPosition};
    use crate::position_manager::PositionManager;
    use crate::strategy::IchimokuStrategy;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct EmptyExchange;

    #[async_trait]
    impl ExchangeClient for EmptyExchange {
        async fn get_candles(&self, _symbol: &str, _timeframe: &str, _limit: u32) -> anyhow::Result<Vec<crate::market_data::Candle>> {
            Ok(vec![])
        }
        async fn get_price(&self, _symbol: &str) -> anyhow::Result<f64> {
            Ok(0.0)
        }
        async fn get_all_mids(&self) -> anyhow::Result<HashMap<String, f64>> {
            Ok(HashMap::new())
        }
        async fn get_account_balance(&self) -> anyhow::Result<AccountBalance> {
            Ok(AccountBalance { total_equity: 0.0, free_margin: 0.0, unrealised_pnl: 0.0 })
        }
        async fn get_positions(&self) -> anyhow::Result<Vec<RawPosition>> {
            Ok(vec![])
        }
        async fn get_funding_rate(&self, _symbol: &str) -> anyhow::Result<FundingInfo> {
            anyhow::bail!("not implemented")
        }
        async fn place_order_with_tpsl(&self, _req: OrderRequest) -> anyhow::Result<OrderAck> {
            anyhow::bail!("not implemented")
        }
        async fn close_position(&self, _symbol: &str) -> anyhow::Result<CloseAck> {
            anyhow::bail!("not implemented")
        }
    }

    #[tokio::test]
    async fn cycle_with_no_candles_produces_no_trade_and_does_not_panic() {
        let cfg = Arc::new(RwLock::new(EngineConfig::default()));
        let exchange: Arc<dyn ExchangeClient> = Arc::new(EmptyExchange);
        let price_fetcher = Arc::new(PriceFetcher::new(exchange.clone()));
        let position_manager = Arc::new(PositionManager::new());
        let trade_gate = Arc::new(TradeGate::new(position_manager));
        let correlation: Arc<dyn CorrelationManager> = Arc::new(PermissiveCorrelationManager);
        let risk_engine = Arc::new(RiskEngine::new(10_000.0, 0.03, 5, 0.06, 50));

        let scheduler = Scheduler::new(
            cfg,
            price_fetcher,
            {
                let mut m: std::collections::HashMap<crate::config::StrategyKind, Arc<dyn Strategy>> = std::collections::HashMap::new();
                m.insert(crate::config::StrategyKind::Ichimoku, Arc::new(IchimokuStrategy));
                m
            },
            trade_gate,
            exchange,
            correlation,
            risk_engine,
        );

        scheduler.run_cycle().await;
        assert_eq!(scheduler.cycle_count(), 1);
    }

    struct DelayedExchange;

    #[async_trait]
    impl ExchangeClient for DelayedExchange {
        async fn get_candles(&self, _symbol: &str, _timeframe: &str, _limit: u32) -> anyhow::Result<Vec<crate::market_data::Candle>> {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(vec![])
        }
        async fn get_price(&self, _symbol: &str) -> anyhow::Result<f64> {
            Ok(0.0)
        }
        async fn get_all_mids(&self) -> anyhow::Result<HashMap<String, f64>> {
            Ok(HashMap::new())
        }
        async fn get_account_balance(&self) -> anyhow::Result<AccountBalance> {
            Ok(AccountBalance { total_equity: 0.0, free_margin: 0.0, unrealised_pnl: 0.0 })
        }
        async fn get_positions(&self) -> anyhow::Result<Vec<RawPosition>> {
            Ok(vec![])
        }
        async fn get_funding_rate(&self, _symbol: &str) -> anyhow::Result<FundingInfo> {
            anyhow::bail!("not implemented")
        }
        async fn place_order_with_tpsl(&self, _req: OrderRequest) -> anyhow::Result<OrderAck> {
            anyhow::bail!("not implemented")
        }
        async fn close_position(&self, _symbol: &str) -> anyhow::Result<CloseAck> {
            anyhow::bail!("not implemented")
        }
    }

    #[tokio::test]
    async fn concurrent_run_cycle_calls_do_not_double_count() {
        let cfg = Arc::new(RwLock::new(EngineConfig::default()));
        // A real suspension point (unlike `EmptyExchange`, which resolves
        // synchronously and lets the first call finish before the second
        // starts) is needed so the two `run_cycle` calls genuinely overlap.
        let exchange: Arc<dyn ExchangeClient> = Arc::new(DelayedExchange);
        let price_fetcher = Arc::new(PriceFetcher::new(exchange.clone()));
        let position_manager = Arc::new(PositionManager::new());
        let trade_gate = Arc::new(TradeGate::new(position_manager));
        let correlation: Arc<dyn CorrelationManager> = Arc::new(PermissiveCorrelationManager);
        let risk_engine = Arc::new(RiskEngine::new(10_000.0, 0.03, 5, 0.06, 50));

        let scheduler = Arc::new(Scheduler::new(
            cfg,
            price_fetcher,
            {
                let mut m: std::collections::HashMap<crate::config::StrategyKind, Arc<dyn Strategy>> = std::collections::HashMap::new();
                m.insert(crate::config::StrategyKind::Ichimoku, Arc::new(IchimokuStrategy));
                m
            },
            trade_gate,
            exchange,
            correlation,
            risk_engine,
        ));

        let a = scheduler.clone();
        let b = scheduler.clone();
        let (r1, r2) = tokio::join!(a.run_cycle(), b.run_cycle());
        let _ = (r1, r2);
        // Exactly one of the two concurrent calls increments the counter;
        // the other observes is_processing already set and drops its tick.
        assert_eq!(scheduler.cycle_count(), 1);
    }

    fn candidate(grade: crate::types::Grade, quality_score: f64, win_probability: f64, confluence: i32, abs_score: i32) -> Candidate {
        Candidate {
            symbol: "BTCUSDT".to_string(),
            timeframe: Timeframe::M15,
            graded: crate::types::GradedSignal {
                raw: crate::types::RawSignal {
                    direction: crate::types::Direction::Long,
                    score: abs_score,
                    abs_score,
                    confluence,
                    suggested_sl: None,
                    suggested_tp: None,
                    sl_source: None,
                    tp_source: None,
                    reasons: vec![],
                },
                grade,
                quality_score,
                win_probability,
                tradeable: true,
                reject_reason: None,
            },
            entry_price: 100.0,
            rsi: None,
            atr: None,
        }
    }

    #[test]
    fn opportunity_order_ranks_grade_above_everything_else() {
        use crate::types::Grade;
        let a = candidate(Grade::A, 10.0, 0.5, 0, 0);
        let b = candidate(Grade::B, 90.0, 0.9, 5, 7);
        let mut candidates = [b, a];
        candidates.sort_by(opportunity_order);
        assert_eq!(candidates[0].graded.grade, Grade::A);
    }

    #[test]
    fn opportunity_order_falls_through_quality_score_within_tolerance() {
        use crate::types::Grade;
        // Same grade, quality scores 3 points apart (< 5 tolerance) — must
        // fall through to win_probability, not stop at quality_score.
        let higher_quality_lower_win_prob = candidate(Grade::B, 62.0, 0.60, 2, 3);
        let lower_quality_higher_win_prob = candidate(Grade::B, 59.0, 0.70, 2, 3);
        let mut candidates = [higher_quality_lower_win_prob.clone(), lower_quality_higher_win_prob.clone()];
        candidates.sort_by(opportunity_order);
        assert_eq!(candidates[0].graded.win_probability, 0.70);
    }

    #[test]
    fn opportunity_order_decisive_quality_score_gap_skips_win_probability() {
        use crate::types::Grade;
        let higher_quality = candidate(Grade::B, 70.0, 0.55, 2, 3);
        let lower_quality_higher_win_prob = candidate(Grade::B, 60.0, 0.90, 2, 3);
        let mut candidates = [lower_quality_higher_win_prob, higher_quality];
        candidates.sort_by(opportunity_order);
        assert_eq!(candidates[0].graded.quality_score, 70.0);
    }

    #[test]
    fn opportunity_order_ties_fall_through_to_confluence_then_abs_score() {
        use crate::types::Grade;
        let low_confluence = candidate(Grade::C, 50.0, 0.65, 1, 4);
        let high_confluence = candidate(Grade::C, 50.0, 0.65, 3, 4);
        let mut candidates = [low_confluence, high_confluence];
        candidates.sort_by(opportunity_order);
        assert_eq!(candidates[0].graded.raw.confluence, 3);
    }

    #[test]
    fn funding_bonus_rewards_alignment_and_penalizes_opposition() {
        let bullish = FundingInfo { rate: -0.001, signal: FundingBias::Bullish, strength: 0.5 };
        assert_eq!(funding_bonus_for(Direction::Long, &bullish), 1.0);
        assert_eq!(funding_bonus_for(Direction::Short, &bullish), -0.5);

        let neutral = FundingInfo { rate: 0.0, signal: FundingBias::Neutral, strength: 0.0 };
        assert_eq!(funding_bonus_for(Direction::Long, &neutral), 0.0);
    }

    #[test]
    fn chikou_direction_agreement() {
        assert!(direction_agrees(Direction::Long, 1.5));
        assert!(!direction_agrees(Direction::Long, -1.5));
        assert!(direction_agrees(Direction::Short, -1.5));
        assert!(!direction_agrees(Direction::Short, 1.5));
    }
}
