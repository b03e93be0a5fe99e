// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
// MACD = EMA_fast(closes) - EMA_slow(closes). The signal line is the EMA of
// MACD itself, and the histogram is MACD - signal. Standard periods: 12, 26, 9.
// =============================================================================

use super::ema::calculate_ema;

#[derive(Debug, Clone, Copy)]
pub struct MacdResult {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Compute the most recent MACD/signal/histogram triple.
///
/// Returns `None` when:
/// - Any period is zero.
/// - There is not enough data for the slow EMA plus the signal EMA.
/// - Any intermediate EMA series is empty or produces a non-finite value.
pub fn calculate_macd(
    closes: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> Option<MacdResult> {
    if fast_period == 0 || slow_period == 0 || signal_period == 0 || fast_period >= slow_period {
        return None;
    }

    let fast = calculate_ema(closes, fast_period);
    let slow = calculate_ema(closes, slow_period);
    if fast.is_empty() || slow.is_empty() {
        return None;
    }

    // Align the two series on their tails — fast is longer since it starts
    // earlier, so keep only the overlapping suffix.
    let overlap = fast.len().min(slow.len());
    let macd_series: Vec<f64> = fast[fast.len() - overlap..]
        .iter()
        .zip(slow[slow.len() - overlap..].iter())
        .map(|(f, s)| f - s)
        .collect();

    if macd_series.len() < signal_period {
        return None;
    }

    let signal_series = calculate_ema(&macd_series, signal_period);
    let signal = *signal_series.last()?;
    let macd = *macd_series.last()?;
    let histogram = macd - signal;

    if !macd.is_finite() || !signal.is_finite() || !histogram.is_finite() {
        return None;
    }

    Some(MacdResult {
        macd,
        signal,
        histogram,
    })
}

/// Convenience wrapper using the standard 12/26/9 periods.
pub fn macd_standard(closes: &[f64]) -> Option<MacdResult> {
    calculate_macd(closes, 12, 26, 9)
}
