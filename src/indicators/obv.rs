// =============================================================================
// On-Balance Volume (OBV)
// =============================================================================
//
// OBV accumulates volume as a running total: add volume on an up close, sub
// volume on a down close, carry forward unchanged on a flat close.
// =============================================================================

use crate::market_data::Candle;

/// Compute the full OBV series.
///
/// Returns an empty `Vec` when fewer than 2 candles are supplied (OBV needs a
/// previous close to determine direction). The first element corresponds to
/// the second candle.
pub fn calculate_obv(candles: &[Candle]) -> Vec<f64> {
    if candles.len() < 2 {
        return Vec::new();
    }

    let mut obv = 0.0;
    let mut series = Vec::with_capacity(candles.len() - 1);
    for window in candles.windows(2) {
        let (prev, cur) = (&window[0], &window[1]);
        if cur.close > prev.close {
            obv += cur.volume;
        } else if cur.close < prev.close {
            obv -= cur.volume;
        }
        series.push(obv);
    }
    series
}

/// Whether OBV is trending the same direction as price over the trailing
/// `lookback` bars — a divergence check. Returns `None` on insufficient data.
pub fn obv_confirms_trend(candles: &[Candle], lookback: usize) -> Option<bool> {
    if candles.len() < lookback + 1 || lookback == 0 {
        return None;
    }

    let obv_series = calculate_obv(candles);
    if obv_series.len() < lookback {
        return None;
    }

    let price_change = candles.last()?.close - candles[candles.len() - 1 - lookback].close;
    let obv_change = obv_series[obv_series.len() - 1] - obv_series[obv_series.len() - lookback];

    Some(price_change.signum() == obv_change.signum())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(close: f64, volume: f64) -> Candle {
        Candle {
            open_time: 0,
            close_time: 0,
            open: close,
            high: close,
            low: close,
            close,
            volume,
            quote_volume: 0.0,
            trades_count: 0,
            taker_buy_volume: 0.0,
            taker_buy_quote_volume: 0.0,
            is_closed: true,
        }
    }

    #[test]
    fn obv_insufficient_data() {
        assert!(calculate_obv(&[candle(100.0, 10.0)]).is_empty());
    }

    #[test]
    fn obv_accumulates_on_rally() {
        let candles = vec![candle(100.0, 10.0), candle(105.0, 5.0), candle(110.0, 5.0)];
        let series = calculate_obv(&candles);
        assert_eq!(series, vec![5.0, 10.0]);
    }

    #[test]
    fn obv_subtracts_on_selloff() {
        let candles = vec![candle(100.0, 10.0), candle(95.0, 5.0)];
        let series = calculate_obv(&candles);
        assert_eq!(series, vec![-5.0]);
    }

    #[test]
    fn obv_flat_close_unchanged() {
        let candles = vec![candle(100.0, 10.0), candle(100.0, 5.0), candle(105.0, 5.0)];
        let series = calculate_obv(&candles);
        assert_eq!(series, vec![0.0, 5.0]);
    }

    #[test]
    fn obv_confirms_trend_on_rally() {
        let candles = vec![
            candle(100.0, 10.0),
            candle(102.0, 5.0),
            candle(104.0, 5.0),
            candle(106.0, 5.0),
        ];
        assert_eq!(obv_confirms_trend(&candles, 2), Some(true));
    }
}
