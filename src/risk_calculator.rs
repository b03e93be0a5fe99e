// =============================================================================
// Risk Calculator — SL/TP derivation, position sizing, trade validation
// =============================================================================
//
// Four `TpslMode` variants decide where stop-loss/take-profit sit:
//
//   - `Ichimoku` — use the strategy's own suggested levels verbatim.
//   - `Atr`      — entry ± `atr_mult_{sl,tp} * ATR`, grounded on
//                  `exit::triple_barrier::BarrierConfig::from_atr`'s
//                  multiplier/floor pattern.
//   - `Percent`  — entry ± the timeframe preset's default percentages.
//   - `Auto`     — prefer the strategy's suggested levels, fall back to
//                  percent when the strategy offered none.
//
// Position sizing risks a fixed percentage of equity against the SL
// distance, capped by the leverage-implied notional ceiling.
// =============================================================================

use crate::config::{EngineConfig, TpslMode};
use crate::types::{Direction, LevelSource};

/// Inputs the strategy/indicator layer contributes toward SL/TP selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct SltpContext {
    pub suggested_sl: Option<f64>,
    pub suggested_tp: Option<f64>,
    pub sl_source: Option<LevelSource>,
    pub tp_source: Option<LevelSource>,
    pub atr: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct SltpResult {
    pub sl: f64,
    pub tp: f64,
    pub risk_percent: f64,
    pub reward_percent: f64,
    pub rrr: f64,
    pub meets_min_rrr: bool,
    pub sl_source: LevelSource,
    pub tp_source: LevelSource,
}

pub struct RiskCalculator;

impl RiskCalculator {
    /// Derive stop-loss/take-profit for `entry` under `cfg.tpsl_mode`.
    ///
    /// `default_tp_pct`/`default_sl_pct` come from the timeframe preset in
    /// effect for this signal. Returns `None` when the selected mode can't
    /// produce a usable pair (e.g. `Ichimoku` mode with no suggested levels,
    /// or `Atr` mode with no ATR reading).
    pub fn calculate_sltp(
        entry: f64,
        direction: Direction,
        default_tp_pct: f64,
        default_sl_pct: f64,
        cfg: &EngineConfig,
        ctx: &SltpContext,
    ) -> Option<SltpResult> {
        if entry <= 0.0 || direction == Direction::None {
            return None;
        }
        let is_long = direction == Direction::Long;

        let (sl, sl_source, tp, tp_source) = match cfg.tpsl_mode {
            TpslMode::Ichimoku => (
                ctx.suggested_sl?,
                ctx.sl_source.unwrap_or(LevelSource::Strategy),
                ctx.suggested_tp?,
                ctx.tp_source.unwrap_or(LevelSource::Strategy),
            ),
            TpslMode::Atr => {
                let atr = ctx.atr?;
                if atr <= 0.0 {
                    return None;
                }
                let sl = if is_long {
                    entry - cfg.atr_mult_sl * atr
                } else {
                    entry + cfg.atr_mult_sl * atr
                };
                let tp = if is_long {
                    entry + cfg.atr_mult_tp * atr
                } else {
                    entry - cfg.atr_mult_tp * atr
                };
                (sl, LevelSource::Atr, tp, LevelSource::Atr)
            }
            TpslMode::Percent => (
                percent_sl(entry, is_long, default_sl_pct),
                LevelSource::Percent,
                percent_tp(entry, is_long, default_tp_pct),
                LevelSource::Percent,
            ),
            TpslMode::Auto => {
                let (sl, sl_source) = match ctx.suggested_sl {
                    Some(sl) => (sl, ctx.sl_source.unwrap_or(LevelSource::Strategy)),
                    None => (percent_sl(entry, is_long, default_sl_pct), LevelSource::Percent),
                };
                let (tp, tp_source) = match ctx.suggested_tp {
                    Some(tp) => (tp, ctx.tp_source.unwrap_or(LevelSource::Strategy)),
                    None => (percent_tp(entry, is_long, default_tp_pct), LevelSource::Percent),
                };
                (sl, sl_source, tp, tp_source)
            }
        };

        let risk = (entry - sl).abs();
        let reward = (tp - entry).abs();
        if risk <= 0.0 {
            return None;
        }

        let rrr = reward / risk;
        Some(SltpResult {
            sl,
            tp,
            risk_percent: risk / entry * 100.0,
            reward_percent: reward / entry * 100.0,
            rrr,
            meets_min_rrr: rrr >= cfg.min_rrr,
            sl_source,
            tp_source,
        })
    }

    /// Size a position so the SL distance risks `risk_per_trade_pct` of
    /// equity, capped by what `leverage` allows to be opened at all.
    pub fn calculate_position_size(equity: f64, entry: f64, sl: f64, leverage: u32, risk_per_trade_pct: f64) -> f64 {
        if equity <= 0.0 || entry <= 0.0 || risk_per_trade_pct <= 0.0 {
            return 0.0;
        }
        let distance = (entry - sl).abs();
        if distance <= 0.0 {
            return 0.0;
        }

        let risk_amount = equity * (risk_per_trade_pct / 100.0);
        let size = risk_amount / distance;
        let max_notional_size = (equity * leverage as f64) / entry;
        let size = size.min(max_notional_size);

        if !size.is_finite() || size <= 0.0 {
            0.0
        } else {
            size
        }
    }

    /// Reject trades whose SL/TP orientation, RRR, or size are unusable
    /// before they ever reach the exchange.
    pub fn validate_trade(
        direction: Direction,
        entry: f64,
        sl: f64,
        tp: f64,
        size: f64,
        min_rrr: f64,
    ) -> Result<(), String> {
        if size <= 0.0 || !size.is_finite() {
            return Err("position size must be positive".to_string());
        }
        if entry <= 0.0 {
            return Err("entry price must be positive".to_string());
        }

        match direction {
            Direction::Long => {
                if !(sl < entry && entry < tp) {
                    return Err("long SL/TP orientation invalid: expected sl < entry < tp".to_string());
                }
            }
            Direction::Short => {
                if !(tp < entry && entry < sl) {
                    return Err("short SL/TP orientation invalid: expected tp < entry < sl".to_string());
                }
            }
            Direction::None => return Err("direction must be long or short".to_string()),
        }

        let risk = (entry - sl).abs();
        let reward = (tp - entry).abs();
        if risk <= 0.0 {
            return Err("zero risk distance".to_string());
        }
        let rrr = reward / risk;
        if min_rrr > 0.0 && rrr < min_rrr {
            return Err(format!("RRR {rrr:.2} below minimum {min_rrr:.2}"));
        }
        Ok(())
    }
}

fn percent_sl(entry: f64, is_long: bool, sl_pct: f64) -> f64 {
    if is_long {
        entry * (1.0 - sl_pct / 100.0)
    } else {
        entry * (1.0 + sl_pct / 100.0)
    }
}

fn percent_tp(entry: f64, is_long: bool, tp_pct: f64) -> f64 {
    if is_long {
        entry * (1.0 + tp_pct / 100.0)
    } else {
        entry * (1.0 - tp_pct / 100.0)
    }
}
