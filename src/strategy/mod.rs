// =============================================================================
// StrategyEngine — polymorphic, variant-tagged signal generation
// =============================================================================
//
// Three variants behind one trait, mirroring the teacher's pattern of a
// capability trait with multiple concrete implementations rather than a
// single god-function switching on a mode enum.
// =============================================================================

pub mod bollinger_squeeze;
pub mod ichimoku;
pub mod smc;

use crate::config::{EngineConfig, Timeframe};
use crate::market_data::Candle;
use crate::types::RawSignal;

pub use bollinger_squeeze::BollingerSqueezeStrategy;
pub use ichimoku::IchimokuStrategy;
pub use smc::SmcStrategy;

/// Common capability all three strategy variants satisfy.
pub trait Strategy: Send + Sync {
    fn analyze(&self, candles: &[Candle], timeframe: Timeframe, cfg: &EngineConfig) -> RawSignal;

    fn name(&self) -> &'static str;
}

/// Clamp a raw score into the shared `[-7, +7]` scale used by every variant's
/// `RawSignal` output.
pub(crate) fn clamp_score(score: i32) -> i32 {
    score.clamp(-7, 7)
}
