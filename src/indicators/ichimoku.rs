// =============================================================================
// Ichimoku Kinko Hyo
// =============================================================================
//
// Five lines, each a midpoint of a high/low window over a different lookback:
//
//   Tenkan-sen  (conversion) = (high_9  + low_9)  / 2
//   Kijun-sen   (base)       = (high_26 + low_26) / 2
//   Senkou A    (leading 1)  = (Tenkan + Kijun) / 2,        plotted 26 bars ahead
//   Senkou B    (leading 2)  = (high_52 + low_52) / 2,      plotted 26 bars ahead
//   Chikou      (lagging)    = current close,                plotted 26 bars back
//
// Standard periods: 9 / 26 / 52, displacement 26.
// =============================================================================

use crate::market_data::Candle;

#[derive(Debug, Clone, Copy)]
pub struct IchimokuResult {
    pub tenkan_sen: f64,
    pub kijun_sen: f64,
    pub senkou_span_a: f64,
    pub senkou_span_b: f64,
    pub chikou_span: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudPosition {
    Above,
    Below,
    Inside,
}

/// Compute the five Ichimoku lines from the most recent window of candles.
///
/// Returns `None` when there are fewer than `senkou_b_period` candles, the
/// longest lookback required.
pub fn calculate_ichimoku(
    candles: &[Candle],
    tenkan_period: usize,
    kijun_period: usize,
    senkou_b_period: usize,
) -> Option<IchimokuResult> {
    if tenkan_period == 0 || kijun_period == 0 || senkou_b_period == 0 {
        return None;
    }
    if candles.len() < senkou_b_period {
        return None;
    }

    let tenkan_sen = midpoint(candles, tenkan_period)?;
    let kijun_sen = midpoint(candles, kijun_period)?;
    let senkou_span_a = (tenkan_sen + kijun_sen) / 2.0;
    let senkou_span_b = midpoint(candles, senkou_b_period)?;
    let chikou_span = candles.last()?.close;

    if [tenkan_sen, kijun_sen, senkou_span_a, senkou_span_b, chikou_span]
        .iter()
        .any(|v| !v.is_finite())
    {
        return None;
    }

    Some(IchimokuResult {
        tenkan_sen,
        kijun_sen,
        senkou_span_a,
        senkou_span_b,
        chikou_span,
    })
}

/// Convenience wrapper using the standard 9/26/52 periods.
pub fn ichimoku_standard(candles: &[Candle]) -> Option<IchimokuResult> {
    calculate_ichimoku(candles, 9, 26, 52)
}

/// Chikou-span confirmation: the current close (the lagging span's plotted
/// value) compared against the close `displacement` bars back. Positive
/// means the lagging span sits above price from back then (bullish
/// confirmation), negative means bearish. `None` without enough history.
pub fn chikou_confirmation(candles: &[Candle], displacement: usize) -> Option<f64> {
    if displacement == 0 || candles.len() <= displacement {
        return None;
    }
    let current = candles.last()?.close;
    let past = candles[candles.len() - 1 - displacement].close;
    Some(current - past)
}

/// Midpoint of the high/low extremes over the trailing `period` candles.
fn midpoint(candles: &[Candle], period: usize) -> Option<f64> {
    if candles.len() < period {
        return None;
    }
    let window = &candles[candles.len() - period..];
    let high = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let low = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    Some((high + low) / 2.0)
}

impl IchimokuResult {
    /// Where the current close sits relative to the (non-displaced) cloud.
    pub fn cloud_position(&self, close: f64) -> CloudPosition {
        let top = self.senkou_span_a.max(self.senkou_span_b);
        let bottom = self.senkou_span_a.min(self.senkou_span_b);
        if close > top {
            CloudPosition::Above
        } else if close < bottom {
            CloudPosition::Below
        } else {
            CloudPosition::Inside
        }
    }

    /// `Some(true)` for a bullish Tenkan/Kijun cross (Tenkan above Kijun),
    /// `Some(false)` for bearish, `None` when the two lines are equal.
    pub fn tk_cross_bullish(&self) -> Option<bool> {
        if self.tenkan_sen > self.kijun_sen {
            Some(true)
        } else if self.tenkan_sen < self.kijun_sen {
            Some(false)
        } else {
            None
        }
    }
}
