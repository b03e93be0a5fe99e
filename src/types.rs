// =============================================================================
// Shared types used across the Aurora trading engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Whether the engine is actively trading, paused, or killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradingMode {
    Live,
    Paused,
    Killed,
}

impl Default for TradingMode {
    fn default() -> Self {
        Self::Paused
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "Live"),
            Self::Paused => write!(f, "Paused"),
            Self::Killed => write!(f, "Killed"),
        }
    }
}

/// Whether we are running against real funds or simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountMode {
    Demo,
    Live,
}

impl Default for AccountMode {
    fn default() -> Self {
        Self::Demo
    }
}

impl std::fmt::Display for AccountMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Demo => write!(f, "Demo"),
            Self::Live => write!(f, "Live"),
        }
    }
}

/// Directional outcome of a strategy pass, or no signal at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
    None,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Where a suggested SL/TP level came from, for logging and priority
/// resolution in the risk calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelSource {
    Ichimoku,
    Ema200,
    Bollinger,
    Atr,
    Percent,
    Strategy,
}

impl std::fmt::Display for LevelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ichimoku => write!(f, "ichimoku"),
            Self::Ema200 => write!(f, "ema200"),
            Self::Bollinger => write!(f, "bollinger"),
            Self::Atr => write!(f, "atr"),
            Self::Percent => write!(f, "percent"),
            Self::Strategy => write!(f, "strategy"),
        }
    }
}

/// Raw output of a `Strategy::analyze` pass — unchanged in meaning across
/// all three strategy variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSignal {
    pub direction: Direction,
    /// In `[-7, +7]` for Ichimoku/BollingerSqueeze; strategy-specific range
    /// for SMC, always read through `abs_score`.
    pub score: i32,
    pub abs_score: i32,
    pub confluence: i32,
    pub suggested_sl: Option<f64>,
    pub suggested_tp: Option<f64>,
    pub sl_source: Option<LevelSource>,
    pub tp_source: Option<LevelSource>,
    pub reasons: Vec<String>,
}

impl RawSignal {
    pub fn none() -> Self {
        Self {
            direction: Direction::None,
            score: 0,
            abs_score: 0,
            confluence: 0,
            suggested_sl: None,
            suggested_tp: None,
            sl_source: None,
            tp_source: None,
            reasons: Vec::new(),
        }
    }
}

/// Letter grade assigned by the signal grader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    F,
    D,
    C,
    B,
    A,
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
        };
        write!(f, "{s}")
    }
}

/// `RawSignal` plus the SignalGrader's verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradedSignal {
    pub raw: RawSignal,
    pub grade: Grade,
    pub quality_score: f64,
    pub win_probability: f64,
    pub tradeable: bool,
    pub reject_reason: Option<String>,
}
