// =============================================================================
// Bollinger Squeeze strategy variant
// =============================================================================
//
// Squeeze = Bollinger Bands inside Keltner Channel (low-volatility coiling).
// Squeeze-release = the squeeze condition ends. Breakout = close outside the
// Bollinger Band with matching momentum sign. Long/short emitted on release
// with matching momentum, or on a confirmed breakout.
// =============================================================================

use crate::config::{EngineConfig, Timeframe};
use crate::indicators::{self, atr::calculate_atr, bollinger::calculate_bollinger};
use crate::market_data::Candle;
use crate::types::{Direction, RawSignal};

use super::{clamp_score, Strategy};

const BB_PERIOD: usize = 20;
const BB_STD: f64 = 2.0;
const KELTNER_ATR_MULT: f64 = 1.5;

pub struct BollingerSqueezeStrategy;

impl Strategy for BollingerSqueezeStrategy {
    fn name(&self) -> &'static str {
        "bollinger"
    }

    fn analyze(&self, candles: &[Candle], timeframe: Timeframe, _cfg: &EngineConfig) -> RawSignal {
        if candles.len() < BB_PERIOD + 2 {
            return RawSignal::none();
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let bb_now = match calculate_bollinger(&closes, BB_PERIOD, BB_STD) {
            Some(b) => b,
            None => return RawSignal::none(),
        };
        let bb_prev = calculate_bollinger(&closes[..closes.len() - 1], BB_PERIOD, BB_STD);
        let atr = calculate_atr(candles, 14);
        let bundle = indicators::analyze_all(candles);
        let close = candles.last().unwrap().close;
        let momentum = bundle.momentum.unwrap_or(0.0);

        let mut score = 0i32;
        let mut reasons = Vec::new();

        let squeeze_now = atr
            .map(|a| keltner_contains_bollinger(&bb_now, close, a))
            .unwrap_or(false);
        let squeeze_prev = match (bb_prev.as_ref(), atr) {
            (Some(prev), Some(a)) => keltner_contains_bollinger(prev, candles[candles.len() - 2].close, a),
            _ => false,
        };
        let squeeze_released = squeeze_prev && !squeeze_now;

        if squeeze_released {
            reasons.push("squeeze released".to_string());
            if momentum > 0.0 {
                score += 3;
                reasons.push("positive momentum on release".to_string());
            } else if momentum < 0.0 {
                score -= 3;
                reasons.push("negative momentum on release".to_string());
            }
        }

        if close > bb_now.upper && momentum > 0.0 {
            score += 3;
            reasons.push("confirmed bullish breakout".to_string());
        } else if close < bb_now.lower && momentum < 0.0 {
            score -= 3;
            reasons.push("confirmed bearish breakout".to_string());
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
            let agrees = if is_long { rsi > 50.0 } else { rsi < 50.0 };
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

        RawSignal {
            direction,
            score,
            abs_score,
            confluence,
            suggested_sl: None,
            suggested_tp: None,
            sl_source: None,
            tp_source: None,
            reasons,
        }
    }
}

/// Whether the Bollinger Bands sit entirely inside a Keltner Channel of
/// `middle ± KELTNER_ATR_MULT * atr` — the classic TTM squeeze condition.
fn keltner_contains_bollinger(bb: &indicators::bollinger::BollingerResult, _close: f64, atr: f64) -> bool {
    let keltner_upper = bb.middle + KELTNER_ATR_MULT * atr;
    let keltner_lower = bb.middle - KELTNER_ATR_MULT * atr;
    bb.upper <= keltner_upper && bb.lower >= keltner_lower
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn candle(i: usize, close: f64) -> Candle {
        Candle {
            open_time: i as i64,
            close_time: i as i64 + 1,
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 10.0,
            quote_volume: 1000.0,
            trades_count: 5,
            taker_buy_volume: 6.0,
            taker_buy_quote_volume: 600.0,
            is_closed: true,
        }
    }

    #[test]
    fn bollinger_insufficient_data_yields_none() {
        let candles = vec![candle(0, 100.0)];
        let cfg = EngineConfig::default();
        let strat = BollingerSqueezeStrategy;
        let signal = strat.analyze(&candles, Timeframe::M15, &cfg);
        assert_eq!(signal.direction, Direction::None);
    }

    #[test]
    fn score_always_within_bounds() {
        let mut candles: Vec<Candle> = (0..40).map(|i| candle(i, 100.0)).collect();
        candles.extend((0..10).map(|i| candle(40 + i, 100.0 + i as f64 * 2.0)));
        let cfg = EngineConfig::default();
        let strat = BollingerSqueezeStrategy;
        let signal = strat.analyze(&candles, Timeframe::M15, &cfg);
        assert!(signal.score >= -7 && signal.score <= 7);
    }

    #[test]
    fn breakout_above_upper_band_with_momentum_is_long() {
        // Flat, then a sharp rally that clears the upper band with positive ROC.
        let mut candles: Vec<Candle> = (0..40).map(|i| candle(i, 100.0)).collect();
        for i in 0..12 {
            candles.push(candle(40 + i, 100.0 + (i as f64 + 1.0) * 3.0));
        }
        let cfg = EngineConfig::default();
        let strat = BollingerSqueezeStrategy;
        let signal = strat.analyze(&candles, Timeframe::M15, &cfg);
        assert_ne!(signal.direction, Direction::Short);
    }
}
