// =============================================================================
// Engine error kinds
// =============================================================================
//
// Components never throw these as control flow across boundaries; each
// returns a `Result<T, EngineError>` (or an `Option`/structured rejection for
// GateRejection) and the caller decides whether to log-and-continue,
// skip-this-pair, or abort `start()`.
// =============================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Preset missing, invalid leverage, unknown strategy. Fatal at `start`.
    #[error("config error: {0}")]
    Config(String),

    /// Auth not ready or test connection failed. Aborts `start`, never retried.
    #[error("auth error: {0}")]
    Auth(String),

    /// Insufficient candles, indicator inputs NaN. Per-symbol; skip this pair.
    #[error("data error for {symbol}: {reason}")]
    Data { symbol: String, reason: String },

    /// Network/timeout/5xx from the exchange. Skipped this cycle, retried next.
    #[error("retryable error: {0}")]
    Retryable(String),

    /// The order failed after admission. Locks released, counters untouched.
    #[error("execution error for {symbol}: {reason}")]
    Execution { symbol: String, reason: String },

    /// Invariant violation (e.g. position both tracked and closed). Refuse
    /// new trades until human inspection; the engine keeps running.
    #[error("fatal state error: {0}")]
    FatalState(String),
}

/// Not an error — a structured admission rejection with a human-readable
/// reason, logged at info level. Kept distinct from `EngineError` because it
/// is an expected, non-exceptional outcome of the trade-gate pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateRejection {
    pub stage: &'static str,
    pub reason: String,
}

impl GateRejection {
    pub fn new(stage: &'static str, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for GateRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.stage, self.reason)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
