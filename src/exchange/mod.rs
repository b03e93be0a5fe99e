// =============================================================================
// External interfaces — ExchangeClient, AuthProvider, CorrelationManager
// =============================================================================
//
// These are the opaque collaborators the core consumes. The core never
// re-implements their wire formats or policy; it only depends on the traits
// below. `binance_futures` ships one concrete `ExchangeClient` so the crate
// runs end-to-end, but the core is written against the trait only.
// =============================================================================

pub mod auth;
pub mod binance_futures;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::market_data::Candle;

/// A position as reported by the exchange, in whichever key spelling it uses
/// (`coin`/`symbol`, `szi`/`size`, `entryPx`/`entryPrice`) — both are
/// supported by downstream readers via the normalised fields below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPosition {
    pub symbol: String,
    /// Signed size: positive = long, negative = short.
    pub size: f64,
    pub entry_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBalance {
    pub total_equity: f64,
    pub free_margin: f64,
    pub unrealised_pnl: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundingBias {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingInfo {
    pub rate: f64,
    pub signal: FundingBias,
    /// Confidence/strength of the signal in 0..1.
    pub strength: f64,
}

#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub is_buy: bool,
    pub size: f64,
    pub price: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub leverage: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub symbol: String,
    pub filled_price: f64,
    pub filled_size: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseAck {
    pub symbol: String,
    pub exit_price: f64,
}

/// The venue REST/WebSocket client. Out of scope to re-derive the wire
/// format in depth — the core depends only on this trait.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: u32,
    ) -> anyhow::Result<Vec<Candle>>;

    async fn get_price(&self, symbol: &str) -> anyhow::Result<f64>;

    async fn get_all_mids(&self) -> anyhow::Result<std::collections::HashMap<String, f64>>;

    async fn get_account_balance(&self) -> anyhow::Result<AccountBalance>;

    async fn get_positions(&self) -> anyhow::Result<Vec<RawPosition>>;

    async fn get_funding_rate(&self, symbol: &str) -> anyhow::Result<FundingInfo>;

    async fn place_order_with_tpsl(&self, req: OrderRequest) -> anyhow::Result<OrderAck>;

    async fn close_position(&self, symbol: &str) -> anyhow::Result<CloseAck>;
}

/// Credential and connectivity readiness. The real implementation (secret
/// storage, signature keys) is a host concern; the core depends only on this
/// contract.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    fn is_ready(&self) -> bool;
    async fn test_connection(&self) -> anyhow::Result<()>;
    fn address(&self) -> String;
}

/// Portfolio-level exposure/correlation policy. Opaque to the core — the
/// concrete implementation here is a permissive stand-in, per SPEC_FULL.md §6.
pub trait CorrelationManager: Send + Sync {
    fn can_trade(&self, symbol: &str, real_positions: &[RawPosition]) -> CorrelationVerdict;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationVerdict {
    pub allowed: bool,
    pub reasons: Vec<String>,
}

/// Always-allow correlation policy. The real cluster/drawdown policy is out
/// of scope for the core per SPEC_FULL.md §6; this logs what it would have
/// checked so the gate chain has somewhere to record a future real policy.
pub struct PermissiveCorrelationManager;

impl CorrelationManager for PermissiveCorrelationManager {
    fn can_trade(&self, _symbol: &str, _real_positions: &[RawPosition]) -> CorrelationVerdict {
        CorrelationVerdict {
            allowed: true,
            reasons: Vec::new(),
        }
    }
}
