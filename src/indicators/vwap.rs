// =============================================================================
// Volume-Weighted Average Price (VWAP)
// =============================================================================
//
// VWAP = sum(typical_price * volume) / sum(volume), accumulated over the
// supplied candle window (a session-anchored VWAP resets the window at the
// caller's boundary — this module is agnostic to anchoring and just averages
// whatever slice it is given).
//
// Typical price = (high + low + close) / 3.
// =============================================================================

use crate::market_data::Candle;

/// Compute VWAP over the given candle slice.
///
/// Returns `None` when:
/// - The slice is empty.
/// - Total volume is zero (degenerate, no trading).
/// - The result is non-finite.
pub fn calculate_vwap(candles: &[Candle]) -> Option<f64> {
    if candles.is_empty() {
        return None;
    }

    let mut cum_pv = 0.0;
    let mut cum_vol = 0.0;
    for c in candles {
        let typical = (c.high + c.low + c.close) / 3.0;
        cum_pv += typical * c.volume;
        cum_vol += c.volume;
    }

    if cum_vol == 0.0 {
        return None;
    }

    let vwap = cum_pv / cum_vol;
    if vwap.is_finite() {
        Some(vwap)
    } else {
        None
    }
}

/// Classify the last close relative to VWAP: `Some(true)` above, `Some(false)`
/// below. `None` when VWAP cannot be computed.
pub fn price_above_vwap(candles: &[Candle]) -> Option<bool> {
    let vwap = calculate_vwap(candles)?;
    let last_close = candles.last()?.close;
    Some(last_close > vwap)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle {
            open_time: 0,
            close_time: 0,
            open: close,
            high,
            low,
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
    fn vwap_empty_input() {
        assert!(calculate_vwap(&[]).is_none());
    }

    #[test]
    fn vwap_zero_volume_is_none() {
        let candles = vec![candle(101.0, 99.0, 100.0, 0.0)];
        assert!(calculate_vwap(&candles).is_none());
    }

    #[test]
    fn vwap_single_candle_equals_typical_price() {
        let candles = vec![candle(102.0, 98.0, 100.0, 10.0)];
        let vwap = calculate_vwap(&candles).unwrap();
        assert!((vwap - 100.0).abs() < 1e-9);
    }

    #[test]
    fn vwap_weights_by_volume() {
        let candles = vec![candle(110.0, 110.0, 110.0, 1.0), candle(100.0, 100.0, 100.0, 99.0)];
        let vwap = calculate_vwap(&candles).unwrap();
        // Heavily weighted toward the 100.0 candle.
        assert!(vwap < 101.0);
    }

    #[test]
    fn price_above_vwap_true_when_rallying() {
        let candles = vec![candle(100.0, 100.0, 100.0, 5.0), candle(120.0, 118.0, 120.0, 5.0)];
        assert_eq!(price_above_vwap(&candles), Some(true));
    }
}
