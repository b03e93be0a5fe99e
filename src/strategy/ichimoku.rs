// =============================================================================
// Ichimoku strategy variant
// =============================================================================
//
// Score in [-7, +7]: ±2 price-vs-cloud, ±1 Tenkan-vs-Kijun, ±1 cloud colour,
// ±2 Chikou confirmation, ±1 price-vs-Kijun. Confluence over
// {rsi, macd, adx, vwap, cvd}. SL/TP candidates prioritised
// Ichimoku level → EMA200 → Bollinger band, bounded to 0.3%–8% of price,
// TP requiring RRR ≥ 1.0 against the chosen SL.
// =============================================================================

use crate::config::{EngineConfig, Timeframe};
use crate::indicators::{self, ichimoku::CloudPosition};
use crate::market_data::Candle;
use crate::types::{Direction, LevelSource, RawSignal};

use super::{clamp_score, Strategy};

const MIN_DISTANCE_PCT: f64 = 0.003;
const MAX_DISTANCE_PCT: f64 = 0.08;

pub struct IchimokuStrategy;

impl Strategy for IchimokuStrategy {
    fn name(&self) -> &'static str {
        "ichimoku"
    }

    fn analyze(&self, candles: &[Candle], timeframe: Timeframe, cfg: &EngineConfig) -> RawSignal {
        let ichi = match indicators::ichimoku::ichimoku_standard(candles) {
            Some(i) => i,
            None => return RawSignal::none(),
        };
        let bundle = indicators::analyze_all(candles);
        let close = match candles.last() {
            Some(c) => c.close,
            None => return RawSignal::none(),
        };

        let mut score = 0i32;
        let mut reasons = Vec::new();

        match ichi.cloud_position(close) {
            CloudPosition::Above => {
                score += 2;
                reasons.push("price above cloud".to_string());
            }
            CloudPosition::Below => {
                score -= 2;
                reasons.push("price below cloud".to_string());
            }
            CloudPosition::Inside => {}
        }

        match ichi.tk_cross_bullish() {
            Some(true) => {
                score += 1;
                reasons.push("TK cross bullish".to_string());
            }
            Some(false) => {
                score -= 1;
                reasons.push("TK cross bearish".to_string());
            }
            None => {}
        }

        if ichi.senkou_span_a > ichi.senkou_span_b {
            score += 1;
            reasons.push("bullish cloud colour".to_string());
        } else if ichi.senkou_span_a < ichi.senkou_span_b {
            score -= 1;
            reasons.push("bearish cloud colour".to_string());
        }

        // Chikou confirmation: the lagging span (current close) compared to
        // the close `displacement` bars back — confirms when it clears the
        // historical price, mirroring the visual chart convention.
        const DISPLACEMENT: usize = 26;
        if candles.len() > DISPLACEMENT {
            let past_close = candles[candles.len() - 1 - DISPLACEMENT].close;
            if ichi.chikou_span > past_close {
                score += 2;
                reasons.push("Chikou confirms bullish".to_string());
            } else if ichi.chikou_span < past_close {
                score -= 2;
                reasons.push("Chikou confirms bearish".to_string());
            }
        }

        if close > ichi.kijun_sen {
            score += 1;
        } else if close < ichi.kijun_sen {
            score -= 1;
        }

        let score = clamp_score(score);
        let abs_score = score.abs();
        let preset = timeframe.preset();

        let direction = if score >= preset.min_score {
            Direction::Long
        } else if score <= -preset.min_score {
            Direction::Short
        } else {
            Direction::None
        };

        if direction == Direction::None {
            return RawSignal {
                direction,
                score,
                abs_score,
                confluence: 0,
                suggested_sl: None,
                suggested_tp: None,
                sl_source: None,
                tp_source: None,
                reasons,
            };
        }

        let is_long = direction == Direction::Long;
        let mut confluence = 0;
        if let Some(rsi) = bundle.rsi {
            let agrees = if is_long { rsi < cfg.rsi_overbought } else { rsi > cfg.rsi_oversold };
            if agrees {
                confluence += 1;
            }
        }
        if let Some(macd) = &bundle.macd {
            let agrees = if is_long { macd.histogram > 0.0 } else { macd.histogram < 0.0 };
            if agrees {
                confluence += 1;
            }
        }
        if let Some(adx) = &bundle.adx {
            if adx.value >= preset.adx_min {
                confluence += 1;
            }
        }
        if let Some(vwap) = &bundle.vwap {
            let agrees = if is_long {
                vwap.position == indicators::VwapPosition::Above
            } else {
                vwap.position == indicators::VwapPosition::Below
            };
            if agrees {
                confluence += 1;
            }
        }
        if let Some(cvd) = &bundle.cvd {
            let agrees = if is_long {
                cvd.trend == indicators::CvdTrend::Rising
            } else {
                cvd.trend == indicators::CvdTrend::Falling
            };
            if agrees {
                confluence += 1;
            }
        }

        let (suggested_sl, sl_source) = pick_sl(close, is_long, &ichi, bundle.ema200, bundle.bollinger.as_ref());
        let (suggested_tp, tp_source) = suggested_sl.and_then(|sl| {
            pick_tp(close, is_long, sl, &ichi, bundle.ema200, bundle.bollinger.as_ref())
        }).unzip();

        RawSignal {
            direction,
            score,
            abs_score,
            confluence,
            suggested_sl,
            suggested_tp,
            sl_source,
            tp_source,
            reasons,
        }
    }
}

fn within_bounds(close: f64, level: f64) -> bool {
    let dist_pct = (level - close).abs() / close;
    dist_pct >= MIN_DISTANCE_PCT && dist_pct <= MAX_DISTANCE_PCT
}

fn pick_sl(
    close: f64,
    is_long: bool,
    ichi: &indicators::ichimoku::IchimokuResult,
    ema200: Option<f64>,
    bollinger: Option<&indicators::bollinger::BollingerResult>,
) -> (Option<f64>, Option<LevelSource>) {
    let ichi_level = if is_long { ichi.kijun_sen.min(ichi.senkou_span_a.min(ichi.senkou_span_b)) } else { ichi.kijun_sen.max(ichi.senkou_span_a.max(ichi.senkou_span_b)) };
    if within_bounds(close, ichi_level) && ((is_long && ichi_level < close) || (!is_long && ichi_level > close)) {
        return (Some(ichi_level), Some(LevelSource::Ichimoku));
    }

    if let Some(ema) = ema200 {
        if within_bounds(close, ema) && ((is_long && ema < close) || (!is_long && ema > close)) {
            return (Some(ema), Some(LevelSource::Ema200));
        }
    }

    if let Some(bb) = bollinger {
        let level = if is_long { bb.lower } else { bb.upper };
        if within_bounds(close, level) {
            return (Some(level), Some(LevelSource::Bollinger));
        }
    }

    (None, None)
}

fn pick_tp(
    close: f64,
    is_long: bool,
    sl: f64,
    ichi: &indicators::ichimoku::IchimokuResult,
    ema200: Option<f64>,
    bollinger: Option<&indicators::bollinger::BollingerResult>,
) -> Option<(f64, LevelSource)> {
    let risk = (close - sl).abs();
    if risk <= 0.0 {
        return None;
    }

    let candidates: Vec<(f64, LevelSource)> = {
        let mut v = Vec::new();
        let ichi_level = if is_long { ichi.senkou_span_a.max(ichi.senkou_span_b) } else { ichi.senkou_span_a.min(ichi.senkou_span_b) };
        v.push((ichi_level, LevelSource::Ichimoku));
        if let Some(ema) = ema200 {
            v.push((ema, LevelSource::Ema200));
        }
        if let Some(bb) = bollinger {
            v.push((if is_long { bb.upper } else { bb.lower }, LevelSource::Bollinger));
        }
        v
    };

    for (level, source) in candidates {
        if !within_bounds(close, level) {
            continue;
        }
        if (is_long && level <= close) || (!is_long && level >= close) {
            continue;
        }
        let reward = (level - close).abs();
        if reward / risk >= 1.0 {
            return Some((level, source));
        }
    }

    None
}
