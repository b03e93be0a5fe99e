// =============================================================================
// Stochastic RSI
// =============================================================================
//
// Stochastic RSI applies the Stochastic Oscillator formula to RSI values
// instead of price, producing a more sensitive overbought/oversold reading:
//
//   StochRSI = (RSI - min(RSI, lookback)) / (max(RSI, lookback) - min(RSI, lookback))
//
// %K is a 3-period SMA of StochRSI, %D is a 3-period SMA of %K. Output is
// scaled to 0..100 per the common convention.
// =============================================================================

use super::rsi::calculate_rsi;

#[derive(Debug, Clone, Copy)]
pub struct StochRsiResult {
    pub k: f64,
    pub d: f64,
}

/// Compute the most recent Stochastic RSI %K/%D pair.
///
/// Returns `None` when:
/// - There is not enough data to build `rsi_period` RSI values plus the
///   `stoch_period` lookback plus 3 bars of %K smoothing.
/// - The RSI range over the lookback window is zero (degenerate, flat RSI).
pub fn calculate_stoch_rsi(
    closes: &[f64],
    rsi_period: usize,
    stoch_period: usize,
) -> Option<StochRsiResult> {
    if rsi_period == 0 || stoch_period == 0 {
        return None;
    }

    let rsi_series = calculate_rsi(closes, rsi_period);
    if rsi_series.len() < stoch_period + 3 {
        return None;
    }

    let mut stoch_series = Vec::with_capacity(rsi_series.len() - stoch_period + 1);
    for window in rsi_series.windows(stoch_period) {
        let min = window.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = window.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        let value = if range == 0.0 {
            0.0
        } else {
            (window[window.len() - 1] - min) / range * 100.0
        };
        stoch_series.push(value);
    }

    if stoch_series.len() < 3 {
        return None;
    }

    let k_series = sma_series(&stoch_series, 3);
    if k_series.len() < 3 {
        return None;
    }
    let d_series = sma_series(&k_series, 3);

    let k = *k_series.last()?;
    let d = *d_series.last().unwrap_or(&k);

    if !k.is_finite() || !d.is_finite() {
        return None;
    }

    Some(StochRsiResult { k, d })
}

fn sma_series(values: &[f64], period: usize) -> Vec<f64> {
    if values.len() < period {
        return Vec::new();
    }
    values
        .windows(period)
        .map(|w| w.iter().sum::<f64>() / period as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stoch_rsi_insufficient_data() {
        assert!(calculate_stoch_rsi(&[1.0, 2.0, 3.0], 14, 14).is_none());
    }

    #[test]
    fn stoch_rsi_range_bounds() {
        let closes = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08, 45.89, 46.03,
            44.18, 44.22, 44.57, 43.42, 42.66, 43.13, 43.98, 44.21, 44.55, 44.80, 45.02, 45.33,
            45.61, 45.78, 46.01, 46.15, 46.38, 46.52, 46.70, 46.85, 47.00, 47.15, 47.30, 47.45,
            47.60, 47.75, 47.90, 48.05, 48.20, 48.35, 48.50, 48.65, 48.80, 48.95, 49.10, 49.25,
            49.40, 49.55,
        ];
        let result = calculate_stoch_rsi(&closes, 14, 14).unwrap();
        assert!((0.0..=100.0).contains(&result.k));
        assert!((0.0..=100.0).contains(&result.d));
    }

    #[test]
    fn stoch_rsi_flat_market_is_zero() {
        let closes = vec![100.0; 60];
        let result = calculate_stoch_rsi(&closes, 14, 14).unwrap();
        assert!(result.k.abs() < 1e-9);
        assert!(result.d.abs() < 1e-9);
    }
}
