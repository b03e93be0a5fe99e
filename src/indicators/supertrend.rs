// =============================================================================
// Supertrend — ATR-banded trend-following overlay
// =============================================================================
//
// basicUpper = hl2 + multiplier * ATR
// basicLower = hl2 - multiplier * ATR
//
// The final bands trail in the direction of the prevailing trend (only
// tightening, never loosening, until price closes beyond the opposite band,
// which flips the trend).
//
// Standard period: 10, multiplier: 3.0
// =============================================================================

use crate::market_data::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupertrendDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy)]
pub struct SupertrendResult {
    pub value: f64,
    pub direction: SupertrendDirection,
}

/// Computes the Supertrend value/direction as of the most recent candle.
///
/// Returns `None` when there are fewer than `period + 1` candles or any
/// intermediate value is non-finite.
pub fn calculate_supertrend(candles: &[Candle], period: usize, multiplier: f64) -> Option<SupertrendResult> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let mut tr_values: Vec<f64> = Vec::with_capacity(candles.len() - 1);
    for i in 1..candles.len() {
        let high = candles[i].high;
        let low = candles[i].low;
        let prev_close = candles[i - 1].close;
        if !high.is_finite() || !low.is_finite() || !prev_close.is_finite() {
            return None;
        }
        let hl = high - low;
        let hc = (high - prev_close).abs();
        let lc = (low - prev_close).abs();
        tr_values.push(hl.max(hc).max(lc));
    }
    if tr_values.len() < period {
        return None;
    }

    // Wilder-smoothed ATR series; atr_values[k] lines up with candles[period + k].
    let seed: f64 = tr_values[..period].iter().sum::<f64>() / period as f64;
    if !seed.is_finite() {
        return None;
    }
    let mut atr_values: Vec<f64> = Vec::with_capacity(tr_values.len() - period + 1);
    atr_values.push(seed);
    let period_f = period as f64;
    for &tr in &tr_values[period..] {
        let prev = *atr_values.last().unwrap();
        let next = (prev * (period_f - 1.0) + tr) / period_f;
        if !next.is_finite() {
            return None;
        }
        atr_values.push(next);
    }

    let mut direction = SupertrendDirection::Up;
    let mut final_upper = f64::INFINITY;
    let mut final_lower = f64::NEG_INFINITY;
    let mut value = 0.0;

    for (k, &atr) in atr_values.iter().enumerate() {
        let idx = period + k;
        let candle = &candles[idx];
        let hl2 = (candle.high + candle.low) / 2.0;
        let basic_upper = hl2 + multiplier * atr;
        let basic_lower = hl2 - multiplier * atr;

        let upper = if k == 0 || candles[idx - 1].close > final_upper {
            basic_upper
        } else {
            basic_upper.min(final_upper)
        };
        let lower = if k == 0 || candles[idx - 1].close < final_lower {
            basic_lower
        } else {
            basic_lower.max(final_lower)
        };

        direction = if candle.close > upper {
            SupertrendDirection::Up
        } else if candle.close < lower {
            SupertrendDirection::Down
        } else {
            direction
        };

        value = match direction {
            SupertrendDirection::Up => lower,
            SupertrendDirection::Down => upper,
        };

        final_upper = upper;
        final_lower = lower;
    }

    if !value.is_finite() {
        return None;
    }

    Some(SupertrendResult { value, direction })
}

/// Convenience wrapper using the standard 10-period / 3x multiplier.
pub fn supertrend_standard(candles: &[Candle]) -> Option<SupertrendResult> {
    calculate_supertrend(candles, 10, 3.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time: 0,
            close_time: 0,
            open: close,
            high,
            low,
            close,
            volume: 1.0,
            quote_volume: 0.0,
            trades_count: 0,
            taker_buy_volume: 0.0,
            taker_buy_quote_volume: 0.0,
            is_closed: true,
        }
    }

    #[test]
    fn insufficient_data_returns_none() {
        let candles = vec![candle(101.0, 99.0, 100.0); 5];
        assert!(calculate_supertrend(&candles, 10, 3.0).is_none());
    }

    #[test]
    fn zero_period_returns_none() {
        let candles = vec![candle(101.0, 99.0, 100.0); 20];
        assert!(calculate_supertrend(&candles, 0, 3.0).is_none());
    }

    #[test]
    fn steady_uptrend_reports_up() {
        let candles: Vec<Candle> = (0..40)
            .map(|i| {
                let base = 100.0 + i as f64 * 1.5;
                candle(base + 1.0, base - 1.0, base)
            })
            .collect();
        let result = supertrend_standard(&candles).unwrap();
        assert_eq!(result.direction, SupertrendDirection::Up);
        assert!(result.value < candles.last().unwrap().close);
    }

    #[test]
    fn steady_downtrend_reports_down() {
        let candles: Vec<Candle> = (0..40)
            .map(|i| {
                let base = 200.0 - i as f64 * 1.5;
                candle(base + 1.0, base - 1.0, base)
            })
            .collect();
        let result = supertrend_standard(&candles).unwrap();
        assert_eq!(result.direction, SupertrendDirection::Down);
        assert!(result.value > candles.last().unwrap().close);
    }

    #[test]
    fn nan_input_returns_none() {
        let mut candles = vec![candle(101.0, 99.0, 100.0); 15];
        candles[5] = candle(f64::NAN, 99.0, 100.0);
        assert!(calculate_supertrend(&candles, 10, 3.0).is_none());
    }
}
