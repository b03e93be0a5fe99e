// =============================================================================
// Signal Grader — preset-threshold filtering, quality grade, win probability
// =============================================================================
//
// Runs a `RawSignal` through eight ordered filters, plus two off-by-default
// opt-ins (Chikou, Supertrend); the first failure sets `rejectReason` and the
// signal is graded `F`/untradeable. A signal that clears every filter gets a
// 0-100 quality score, a letter grade, and a capped win-probability estimate.
// =============================================================================

use crate::config::TimeframePreset;
use crate::indicators::IndicatorBundle;
use crate::types::{Grade, GradedSignal, RawSignal};

const WIN_PROB_CAP: f64 = 0.92;

/// Extra context the grader needs beyond the raw signal and indicator bundle.
#[derive(Debug, Clone, Copy)]
pub struct GraderContext {
    pub fakeout_flag: bool,
    pub liquidity_sufficient: bool,
    pub funding_bonus: f64,
    pub mtf_consensus_bonus: f64,
    /// `true` when the Chikou filter is off, or it is on and confirms the
    /// signal's direction. `false` fails the signal outright.
    pub chikou_ok: bool,
    /// Same shape as `chikou_ok`, for the Supertrend filter.
    pub supertrend_ok: bool,
}

impl Default for GraderContext {
    fn default() -> Self {
        Self {
            fakeout_flag: false,
            liquidity_sufficient: true,
            funding_bonus: 0.0,
            mtf_consensus_bonus: 0.0,
            chikou_ok: true,
            supertrend_ok: true,
        }
    }
}

pub struct SignalGrader;

impl SignalGrader {
    pub fn grade(raw: &RawSignal, bundle: &IndicatorBundle, preset: &TimeframePreset, ctx: &GraderContext) -> GradedSignal {
        if let Some(reason) = Self::first_failing_filter(raw, bundle, preset, ctx) {
            return GradedSignal {
                raw: raw.clone(),
                grade: Grade::F,
                quality_score: 0.0,
                win_probability: 0.0,
                tradeable: false,
                reject_reason: Some(reason),
            };
        }

        let quality_score = Self::quality_score(raw, bundle);
        let grade = Self::grade_for_score(quality_score);
        let win_probability = Self::win_probability(raw, bundle, quality_score, grade, ctx);

        GradedSignal {
            raw: raw.clone(),
            grade,
            quality_score,
            win_probability,
            tradeable: true,
            reject_reason: None,
        }
    }

    fn first_failing_filter(raw: &RawSignal, bundle: &IndicatorBundle, preset: &TimeframePreset, ctx: &GraderContext) -> Option<String> {
        use crate::types::Direction;

        if raw.direction == Direction::None {
            return Some("no direction".to_string());
        }
        if raw.abs_score < preset.min_score {
            return Some(format!("absScore {} below minScore {}", raw.abs_score, preset.min_score));
        }

        let min_confluence = if raw.abs_score >= 7 {
            (preset.min_confluence - 1).max(0)
        } else {
            preset.min_confluence
        };
        if raw.confluence < min_confluence {
            return Some(format!("confluence {} below minConfluence {}", raw.confluence, min_confluence));
        }

        if let Some(rsi) = bundle.rsi {
            let is_long = raw.direction == Direction::Long;
            let in_band = if is_long { rsi <= preset.rsi_long_max } else { (20.0..=85.0).contains(&rsi) };
            if !in_band {
                return Some(format!("rsi {rsi:.1} outside allowed band"));
            }
        }

        if let Some(adx) = &bundle.adx {
            if adx.value > 0.0 && adx.value < preset.adx_min {
                return Some(format!("adx {:.1} below minimum {:.1}", adx.value, preset.adx_min));
            }
        }

        // win-probability check is deferred: it's computed below and checked
        // after the fact so we don't compute it twice on the happy path.
        let provisional_quality = Self::quality_score(raw, bundle);
        let provisional_grade = Self::grade_for_score(provisional_quality);
        let win_probability = Self::win_probability(raw, bundle, provisional_quality, provisional_grade, ctx);
        if win_probability < preset.min_win_probability {
            return Some(format!("win probability {win_probability:.2} below minimum {:.2}", preset.min_win_probability));
        }

        if ctx.fakeout_flag {
            return Some("fakeout flag set".to_string());
        }
        if !ctx.liquidity_sufficient {
            return Some("liquidity insufficient".to_string());
        }
        if !ctx.chikou_ok {
            return Some("chikou filter rejected direction".to_string());
        }
        if !ctx.supertrend_ok {
            return Some("supertrend filter rejected direction".to_string());
        }

        if let Some(atr) = &bundle.atr {
            if atr.volatility == crate::indicators::VolatilityClass::Low && raw.abs_score < 5 {
                return Some("volatility low and absScore below 5".to_string());
            }
        }

        None
    }

    fn quality_score(raw: &RawSignal, bundle: &IndicatorBundle) -> f64 {
        let score_band = match raw.abs_score {
            0..=2 => 10.0,
            3..=4 => 25.0,
            5..=6 => 35.0,
            _ => 45.0,
        };
        let confluence_band = match raw.confluence {
            0 => 0.0,
            1 => 10.0,
            2 => 20.0,
            3 => 30.0,
            _ => 35.0,
        };
        let win_prob_proxy = bundle
            .adx
            .as_ref()
            .map(|a| a.value)
            .unwrap_or(0.0)
            .min(50.0)
            / 50.0
            * 20.0;

        (score_band + confluence_band + win_prob_proxy).clamp(0.0, 100.0)
    }

    fn grade_for_score(score: f64) -> Grade {
        if score >= 60.0 {
            Grade::A
        } else if score >= 40.0 {
            Grade::B
        } else if score >= 20.0 {
            Grade::C
        } else {
            Grade::D
        }
    }

    /// `base/conf/qbon/sbon/fund`, capped at `WIN_PROB_CAP` — see module docs.
    fn win_probability(raw: &RawSignal, bundle: &IndicatorBundle, quality_score: f64, grade: Grade, ctx: &GraderContext) -> f64 {
        let base = 0.50 + (raw.abs_score.min(7) as f64 / 7.0) * 0.28; // 0.50..0.78

        let confidence = bundle.adx.as_ref().map(|a| a.value).unwrap_or(0.0).min(50.0) / 50.0;
        let conf = 0.04 + confidence * 0.08; // 0.04..0.12

        let qbon = match grade {
            Grade::A => 0.15,
            Grade::B => 0.10,
            Grade::C => 0.05,
            _ => 0.0,
        } * (quality_score / 100.0).clamp(0.0, 1.0);

        let sbon = (raw.abs_score.min(7) as f64 / 7.0) * 0.06; // 0..0.06

        let fund = (ctx.funding_bonus * 0.025).clamp(-0.025, 0.05);

        let p = base + conf + qbon + sbon + fund + ctx.mtf_consensus_bonus;
        p.min(WIN_PROB_CAP).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timeframe;
    use crate::indicators::{AdxDirection, AdxInfo, AtrInfo, TrendStrength, VolatilityClass, VolumeInfo};
    use crate::types::Direction;

    fn preset() -> TimeframePreset {
        Timeframe::M15.preset()
    }

    fn strong_bundle() -> IndicatorBundle {
        IndicatorBundle {
            rsi: Some(55.0),
            stoch_rsi: None,
            macd: None,
            bollinger: None,
            volume: VolumeInfo { ratio: 1.0, spike: false },
            vwap: None,
            cvd: None,
            ema200: None,
            scalping_emas: None,
            adx: Some(AdxInfo { value: 30.0, trend_strength: TrendStrength::Trending, direction: AdxDirection::Bullish }),
            atr: Some(AtrInfo { value: 1.0, percent: 1.0, volatility: VolatilityClass::Normal }),
            momentum: None,
            obv: None,
        }
    }

    fn strong_raw(direction: Direction) -> RawSignal {
        RawSignal {
            direction,
            score: if direction == Direction::Long { 6 } else { -6 },
            abs_score: 6,
            confluence: 3,
            suggested_sl: None,
            suggested_tp: None,
            sl_source: None,
            tp_source: None,
            reasons: vec![],
        }
    }

    fn permissive_ctx() -> GraderContext {
        GraderContext::default()
    }

    #[test]
    fn direction_none_is_rejected() {
        let raw = RawSignal::none();
        let graded = SignalGrader::grade(&raw, &strong_bundle(), &preset(), &permissive_ctx());
        assert!(!graded.tradeable);
        assert_eq!(graded.grade, Grade::F);
    }

    #[test]
    fn strong_signal_clears_all_filters() {
        let raw = strong_raw(Direction::Long);
        let graded = SignalGrader::grade(&raw, &strong_bundle(), &preset(), &permissive_ctx());
        assert!(graded.tradeable);
        assert!(graded.reject_reason.is_none());
    }

    #[test]
    fn low_abs_score_is_rejected() {
        let mut raw = strong_raw(Direction::Long);
        raw.abs_score = 1;
        raw.score = 1;
        let graded = SignalGrader::grade(&raw, &strong_bundle(), &preset(), &permissive_ctx());
        assert!(!graded.tradeable);
    }

    #[test]
    fn low_confluence_is_rejected() {
        let mut raw = strong_raw(Direction::Long);
        raw.confluence = 0;
        let graded = SignalGrader::grade(&raw, &strong_bundle(), &preset(), &permissive_ctx());
        assert!(!graded.tradeable);
    }

    #[test]
    fn confluence_floor_relaxed_for_extreme_score() {
        let mut raw = strong_raw(Direction::Long);
        raw.abs_score = 7;
        raw.score = 7;
        raw.confluence = preset().min_confluence - 1;
        let graded = SignalGrader::grade(&raw, &strong_bundle(), &preset(), &permissive_ctx());
        assert!(graded.tradeable, "relaxed confluence floor should admit this signal");
    }

    #[test]
    fn rsi_outside_band_rejects_long() {
        let raw = strong_raw(Direction::Long);
        let mut bundle = strong_bundle();
        bundle.rsi = Some(95.0);
        let graded = SignalGrader::grade(&raw, &bundle, &preset(), &permissive_ctx());
        assert!(!graded.tradeable);
    }

    #[test]
    fn adx_zero_is_treated_as_unavailable() {
        let raw = strong_raw(Direction::Long);
        let mut bundle = strong_bundle();
        bundle.adx = Some(AdxInfo { value: 0.0, trend_strength: TrendStrength::Ranging, direction: AdxDirection::Neutral });
        let graded = SignalGrader::grade(&raw, &bundle, &preset(), &permissive_ctx());
        assert!(graded.tradeable, "ADX=0 should be skipped, not enforced");
    }

    #[test]
    fn fakeout_flag_rejects() {
        let raw = strong_raw(Direction::Long);
        let mut ctx = permissive_ctx();
        ctx.fakeout_flag = true;
        let graded = SignalGrader::grade(&raw, &strong_bundle(), &preset(), &ctx);
        assert!(!graded.tradeable);
    }

    #[test]
    fn insufficient_liquidity_rejects() {
        let raw = strong_raw(Direction::Long);
        let mut ctx = permissive_ctx();
        ctx.liquidity_sufficient = false;
        let graded = SignalGrader::grade(&raw, &strong_bundle(), &preset(), &ctx);
        assert!(!graded.tradeable);
    }

    #[test]
    fn low_volatility_rejects_weak_signal_but_not_strong_one() {
        let mut bundle = strong_bundle();
        bundle.atr = Some(AtrInfo { value: 0.1, percent: 0.1, volatility: VolatilityClass::Low });

        let mut weak = strong_raw(Direction::Long);
        weak.abs_score = 4;
        weak.score = 4;
        let graded_weak = SignalGrader::grade(&weak, &bundle, &preset(), &permissive_ctx());
        assert!(!graded_weak.tradeable);

        let mut strong = strong_raw(Direction::Long);
        strong.abs_score = 5;
        strong.score = 5;
        let graded_strong = SignalGrader::grade(&strong, &bundle, &preset(), &permissive_ctx());
        assert!(graded_strong.tradeable);
    }

    #[test]
    fn win_probability_is_always_bounded() {
        let raw = strong_raw(Direction::Long);
        let mut ctx = permissive_ctx();
        ctx.funding_bonus = 10.0;
        ctx.mtf_consensus_bonus = 10.0;
        let graded = SignalGrader::grade(&raw, &strong_bundle(), &preset(), &ctx);
        assert!(graded.win_probability <= WIN_PROB_CAP + 1e-9);
        assert!(graded.win_probability >= 0.0);
    }

    #[test]
    fn grade_monotonic_in_quality_score() {
        assert!(SignalGrader::grade_for_score(65.0) > SignalGrader::grade_for_score(45.0));
        assert!(SignalGrader::grade_for_score(45.0) > SignalGrader::grade_for_score(25.0));
        assert!(SignalGrader::grade_for_score(25.0) > SignalGrader::grade_for_score(5.0));
    }
}
