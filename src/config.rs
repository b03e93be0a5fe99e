// =============================================================================
// Engine configuration — hot-reloadable, persisted externally
// =============================================================================
//
// `EngineConfig` is the mutable, persisted configuration consumed by every
// core component. Persistence uses an atomic tmp + rename pattern (as the
// teacher's `RuntimeConfig` does) so a crash mid-write never corrupts the
// file. All fields carry `#[serde(default)]` so older config files gain new
// fields for free.
// =============================================================================

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{AccountMode, TradingMode};

// ---------------------------------------------------------------------------
// Timeframe
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
        }
    }

    /// Canonical duration of one candle on this timeframe, in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        match self {
            Self::M1 => 60_000,
            Self::M5 => 5 * 60_000,
            Self::M15 => 15 * 60_000,
            Self::M30 => 30 * 60_000,
            Self::H1 => 60 * 60_000,
            Self::H4 => 4 * 60 * 60_000,
            Self::D1 => 24 * 60 * 60_000,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TimeframePreset
// ---------------------------------------------------------------------------

/// Read-only per-timeframe thresholds consulted by SignalGrader and TradeGate.
#[derive(Debug, Clone, Copy)]
pub struct TimeframePreset {
    pub min_score: i32,
    pub min_win_probability: f64,
    pub min_confluence: i32,
    pub rsi_long_max: f64,
    pub rsi_short_min: f64,
    pub adx_min: f64,
    pub min_rrr: f64,
    pub analysis_interval_ms: u64,
    pub default_tp_pct: f64,
    pub default_sl_pct: f64,
}

impl Timeframe {
    /// Canonical preset for this timeframe (see SPEC_FULL.md §3/§9 — the
    /// preset-driven confluence minimum is authoritative).
    pub fn preset(&self) -> TimeframePreset {
        match self {
            Self::M1 => TimeframePreset {
                min_score: 4,
                min_win_probability: 0.68,
                min_confluence: 4,
                rsi_long_max: 65.0,
                rsi_short_min: 30.0,
                adx_min: 18.0,
                min_rrr: 1.0,
                analysis_interval_ms: 15_000,
                default_tp_pct: 0.8,
                default_sl_pct: 0.4,
            },
            Self::M5 => TimeframePreset {
                min_score: 3,
                min_win_probability: 0.65,
                min_confluence: 3,
                rsi_long_max: 68.0,
                rsi_short_min: 28.0,
                adx_min: 16.0,
                min_rrr: 1.0,
                analysis_interval_ms: 30_000,
                default_tp_pct: 1.2,
                default_sl_pct: 0.6,
            },
            Self::M15 => TimeframePreset {
                min_score: 3,
                min_win_probability: 0.65,
                min_confluence: 2,
                rsi_long_max: 70.0,
                rsi_short_min: 20.0,
                adx_min: 15.0,
                min_rrr: 1.0,
                analysis_interval_ms: 60_000,
                default_tp_pct: 2.0,
                default_sl_pct: 1.0,
            },
            Self::M30 => TimeframePreset {
                min_score: 3,
                min_win_probability: 0.64,
                min_confluence: 2,
                rsi_long_max: 70.0,
                rsi_short_min: 20.0,
                adx_min: 15.0,
                min_rrr: 1.1,
                analysis_interval_ms: 120_000,
                default_tp_pct: 2.5,
                default_sl_pct: 1.2,
            },
            Self::H1 => TimeframePreset {
                min_score: 2,
                min_win_probability: 0.62,
                min_confluence: 2,
                rsi_long_max: 72.0,
                rsi_short_min: 20.0,
                adx_min: 14.0,
                min_rrr: 1.2,
                analysis_interval_ms: 300_000,
                default_tp_pct: 3.5,
                default_sl_pct: 1.5,
            },
            Self::H4 => TimeframePreset {
                min_score: 2,
                min_win_probability: 0.60,
                min_confluence: 2,
                rsi_long_max: 75.0,
                rsi_short_min: 20.0,
                adx_min: 12.0,
                min_rrr: 1.3,
                analysis_interval_ms: 900_000,
                default_tp_pct: 5.0,
                default_sl_pct: 2.0,
            },
            Self::D1 => TimeframePreset {
                min_score: 2,
                min_win_probability: 0.58,
                min_confluence: 1,
                rsi_long_max: 78.0,
                rsi_short_min: 20.0,
                adx_min: 10.0,
                min_rrr: 1.5,
                analysis_interval_ms: 3_600_000,
                default_tp_pct: 8.0,
                default_sl_pct: 3.0,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    Auto,
    Manual,
}

impl Default for EngineMode {
    fn default() -> Self {
        Self::Auto
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TpslMode {
    Auto,
    Atr,
    Percent,
    Ichimoku,
}

impl Default for TpslMode {
    fn default() -> Self {
        Self::Auto
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Ichimoku,
    Smc,
    Bollinger,
}

impl Default for StrategyKind {
    fn default() -> Self {
        Self::Ichimoku
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ichimoku => write!(f, "ichimoku"),
            Self::Smc => write!(f, "smc"),
            Self::Bollinger => write!(f, "bollinger"),
        }
    }
}

// ---------------------------------------------------------------------------
// Default-value helpers (serde `default = "..."`)
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_symbols() -> Vec<String> {
    vec![
        "BTCUSDT".to_string(),
        "ETHUSDT".to_string(),
        "BNBUSDT".to_string(),
        "XRPUSDT".to_string(),
        "SOLUSDT".to_string(),
    ]
}

fn default_timeframes() -> Vec<Timeframe> {
    vec![Timeframe::M15]
}

fn default_leverage() -> u32 {
    5
}

fn default_max_concurrent_trades() -> u32 {
    3
}

fn default_atr_mult_sl() -> f64 {
    1.5
}

fn default_atr_mult_tp() -> f64 {
    2.5
}

fn default_enabled_signals() -> HashSet<String> {
    ["rsi", "macd", "adx", "vwap", "cvd"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_rsi_overbought() -> f64 {
    70.0
}

fn default_rsi_oversold() -> f64 {
    30.0
}

fn default_symbol_cooldown_ms() -> u64 {
    10 * 60_000
}

fn default_global_cooldown_ms() -> u64 {
    2 * 60_000
}

fn default_max_consecutive_same_direction() -> u32 {
    4
}

fn default_max_consecutive_losses() -> u32 {
    3
}

fn default_pause_after_losses_ms() -> u64 {
    30 * 60_000
}

fn default_min_rrr() -> f64 {
    1.0
}

fn default_risk_per_trade_pct() -> f64 {
    1.5
}

fn default_max_daily_loss_pct() -> f64 {
    3.0
}

fn default_max_drawdown_pct() -> f64 {
    6.0
}

fn default_max_trades_per_day() -> u32 {
    50
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub trading_mode: TradingMode,
    #[serde(default)]
    pub account_mode: AccountMode,

    /// Symbol universe to analyze every cycle.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    /// Active timeframes analyzed per symbol.
    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<Timeframe>,

    #[serde(default)]
    pub mode: EngineMode,
    /// Leverage applied to new positions, 1..=50.
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    #[serde(default = "default_max_concurrent_trades")]
    pub max_concurrent_trades: u32,

    #[serde(default)]
    pub tpsl_mode: TpslMode,
    #[serde(default = "default_atr_mult_sl")]
    pub atr_mult_sl: f64,
    #[serde(default = "default_atr_mult_tp")]
    pub atr_mult_tp: f64,

    #[serde(default)]
    pub strategy: StrategyKind,
    /// Indicator names counted toward confluence.
    #[serde(default = "default_enabled_signals")]
    pub enabled_signals: HashSet<String>,

    #[serde(default = "default_rsi_overbought")]
    pub rsi_overbought: f64,
    #[serde(default = "default_rsi_oversold")]
    pub rsi_oversold: f64,
    #[serde(default = "default_true")]
    pub use_rsi_filter: bool,

    /// Off-by-default per SPEC_FULL.md §9 open-question resolution.
    #[serde(default)]
    pub enable_chikou_filter: bool,
    #[serde(default)]
    pub enable_supertrend_filter: bool,

    // --- Overtrading / gating knobs ------------------------------------
    #[serde(default = "default_symbol_cooldown_ms")]
    pub symbol_cooldown_ms: u64,
    #[serde(default = "default_global_cooldown_ms")]
    pub global_cooldown_ms: u64,
    #[serde(default = "default_max_consecutive_same_direction")]
    pub max_consecutive_same_direction: u32,
    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,
    #[serde(default = "default_pause_after_losses_ms")]
    pub pause_after_losses_ms: u64,
    #[serde(default = "default_min_rrr")]
    pub min_rrr: f64,

    // --- Risk ------------------------------------------------------------
    #[serde(default = "default_risk_per_trade_pct")]
    pub risk_per_trade_pct: f64,
    #[serde(default = "default_max_daily_loss_pct")]
    pub max_daily_loss_pct: f64,
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: f64,
    #[serde(default = "default_max_trades_per_day")]
    pub max_trades_per_day: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trading_mode: TradingMode::Paused,
            account_mode: AccountMode::Demo,
            symbols: default_symbols(),
            timeframes: default_timeframes(),
            mode: EngineMode::default(),
            leverage: default_leverage(),
            max_concurrent_trades: default_max_concurrent_trades(),
            tpsl_mode: TpslMode::default(),
            atr_mult_sl: default_atr_mult_sl(),
            atr_mult_tp: default_atr_mult_tp(),
            strategy: StrategyKind::default(),
            enabled_signals: default_enabled_signals(),
            rsi_overbought: default_rsi_overbought(),
            rsi_oversold: default_rsi_oversold(),
            use_rsi_filter: true,
            enable_chikou_filter: false,
            enable_supertrend_filter: false,
            symbol_cooldown_ms: default_symbol_cooldown_ms(),
            global_cooldown_ms: default_global_cooldown_ms(),
            max_consecutive_same_direction: default_max_consecutive_same_direction(),
            max_consecutive_losses: default_max_consecutive_losses(),
            pause_after_losses_ms: default_pause_after_losses_ms(),
            min_rrr: default_min_rrr(),
            risk_per_trade_pct: default_risk_per_trade_pct(),
            max_daily_loss_pct: default_max_daily_loss_pct(),
            max_drawdown_pct: default_max_drawdown_pct(),
            max_trades_per_day: default_max_trades_per_day(),
        }
    }
}

impl EngineConfig {
    /// Validate fields that must hold for `start()` to proceed (ConfigError
    /// territory — fatal, not per-symbol).
    pub fn validate(&self) -> Result<(), String> {
        if self.leverage == 0 || self.leverage > 50 {
            return Err(format!("leverage {} out of range 1..=50", self.leverage));
        }
        if self.symbols.is_empty() {
            return Err("symbol universe is empty".to_string());
        }
        if self.timeframes.is_empty() {
            return Err("no active timeframes configured".to_string());
        }
        Ok(())
    }

    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;
        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            trading_mode = %config.trading_mode,
            "engine config loaded"
        );
        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename) — prevents corruption on crash.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content =
            serde_json::to_string_pretty(self).context("failed to serialise engine config")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }
}
