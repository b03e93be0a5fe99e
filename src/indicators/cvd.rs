// =============================================================================
// Cumulative Volume Delta (CVD)
// =============================================================================
//
// Per-candle delta = taker buy volume - taker sell volume, where taker sell
// volume = total volume - taker buy volume (the only buy/sell split a kline
// exposes without tick-level trade data). CVD is the running sum of delta.
// =============================================================================

use crate::market_data::Candle;

/// Compute the full CVD series, one value per candle.
///
/// Returns an empty `Vec` for an empty input.
pub fn calculate_cvd(candles: &[Candle]) -> Vec<f64> {
    let mut cvd = 0.0;
    candles
        .iter()
        .map(|c| {
            let sell_volume = c.volume - c.taker_buy_volume;
            let delta = c.taker_buy_volume - sell_volume;
            cvd += delta;
            cvd
        })
        .collect()
}

/// Whether CVD is diverging from price: price makes a new high/low over the
/// trailing `lookback` bars while CVD moves the opposite direction.
///
/// Returns `None` on insufficient data. `Some(true)` indicates a divergence.
pub fn cvd_diverges_from_price(candles: &[Candle], lookback: usize) -> Option<bool> {
    if candles.len() < lookback + 1 || lookback == 0 {
        return None;
    }

    let cvd_series = calculate_cvd(candles);
    let price_change = candles.last()?.close - candles[candles.len() - 1 - lookback].close;
    let cvd_change = cvd_series[cvd_series.len() - 1] - cvd_series[cvd_series.len() - 1 - lookback];

    if price_change == 0.0 || cvd_change == 0.0 {
        return Some(false);
    }

    Some(price_change.signum() != cvd_change.signum())
}
