// =============================================================================
// Position Manager — poll-based reconciliation against the exchange
// =============================================================================
//
// The exchange is the source of truth. `PositionManager` holds a snapshot of
// `trackedPositions` and, once per poll, diffs it against the exchange's real
// positions:
//
//   - tracked symbol missing from real positions -> closed; compute pnl from
//     the last known mid, fire `onPositionClosed`, untrack.
//   - real position not yet tracked (e.g. after a process restart) -> added
//     with `from_sync = true`.
//
// Grounded on `position_engine::PositionManager`'s `RwLock`-guarded lifecycle
// and `reconcile::reconcile_once`'s "never auto-cancel, exchange wins" policy.
// =============================================================================

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::exchange::ExchangeClient;
use crate::types::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    TakeProfit,
    StopLoss,
    Manual,
    Unknown,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TakeProfit => "TP",
            Self::StopLoss => "SL",
            Self::Manual => "manual",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct Position {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub size: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub opened_at_ms: i64,
    pub leverage: u32,
    /// `true` when this position was discovered on the exchange rather than
    /// opened by this engine (e.g. after a restart).
    pub from_sync: bool,
    pub analysis_snapshot: Option<String>,
}

/// Callback the engine injects so a closed position can feed back into
/// anti-overtrading state (loss-streak counter, cooling-off pause).
pub trait PositionCloseHandler: Send + Sync {
    fn on_position_closed(&self, symbol: &str, pnl: f64, reason: CloseReason);
}

pub struct PositionManager {
    tracked: RwLock<HashMap<String, Position>>,
}

impl PositionManager {
    pub fn new() -> Self {
        Self { tracked: RwLock::new(HashMap::new()) }
    }

    pub fn track(&self, position: Position) {
        info!(symbol = %position.symbol, from_sync = position.from_sync, "position tracked");
        self.tracked.write().insert(position.symbol.clone(), position);
    }

    pub fn get(&self, symbol: &str) -> Option<Position> {
        self.tracked.read().get(symbol).cloned()
    }

    pub fn snapshot(&self) -> Vec<Position> {
        self.tracked.read().values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.tracked.read().len()
    }

    pub fn is_tracked(&self, symbol: &str) -> bool {
        self.tracked.read().contains_key(symbol)
    }

    /// One reconciliation poll: fetch real positions, close out anything
    /// tracked that disappeared, adopt anything real that isn't tracked.
    pub async fn poll(&self, exchange: &dyn ExchangeClient, on_closed: &dyn PositionCloseHandler) -> EngineResult<()> {
        let real = exchange
            .get_positions()
            .await
            .map_err(|e| EngineError::Retryable(e.to_string()))?;
        let real_symbols: std::collections::HashSet<&str> = real.iter().map(|p| p.symbol.as_str()).collect();

        let closed: Vec<Position> = {
            let tracked = self.tracked.read();
            tracked
                .values()
                .filter(|p| !real_symbols.contains(p.symbol.as_str()))
                .cloned()
                .collect()
        };

        for position in closed {
            let exit_price = match exchange.get_price(&position.symbol).await {
                Ok(p) => p,
                Err(e) => {
                    warn!(symbol = %position.symbol, error = %e, "could not fetch exit price, using entry price for pnl");
                    position.entry_price
                }
            };
            let pnl = compute_pnl(&position, exit_price);
            let reason = infer_close_reason(&position, exit_price);

            self.tracked.write().remove(&position.symbol);
            info!(symbol = %position.symbol, pnl, reason = %reason, "position closed");
            on_closed.on_position_closed(&position.symbol, pnl, reason);
        }

        {
            let mut tracked = self.tracked.write();
            for rp in &real {
                if tracked.contains_key(&rp.symbol) {
                    continue;
                }
                let direction = if rp.size >= 0.0 { Direction::Long } else { Direction::Short };
                let position = Position {
                    symbol: rp.symbol.clone(),
                    direction,
                    entry_price: rp.entry_price,
                    size: rp.size.abs(),
                    stop_loss: 0.0,
                    take_profit: 0.0,
                    opened_at_ms: Utc::now().timestamp_millis(),
                    leverage: 1,
                    from_sync: true,
                    analysis_snapshot: None,
                };
                info!(symbol = %rp.symbol, "position adopted from exchange sync");
                tracked.insert(rp.symbol.clone(), position);
            }
        }

        Ok(())
    }
}

impl Default for PositionManager {
    fn default() -> Self {
        Self::new()
    }
}

fn compute_pnl(position: &Position, exit_price: f64) -> f64 {
    match position.direction {
        Direction::Long => (exit_price - position.entry_price) * position.size,
        Direction::Short => (position.entry_price - exit_price) * position.size,
        Direction::None => 0.0,
    }
}

/// Best-effort classification of why a position closed, compared against the
/// brackets this engine placed. Positions adopted via sync carry no brackets,
/// so their closes are always `Unknown`.
fn infer_close_reason(position: &Position, exit_price: f64) -> CloseReason {
    if position.stop_loss == 0.0 && position.take_profit == 0.0 {
        return CloseReason::Unknown;
    }
    const TOLERANCE_PCT: f64 = 0.5;
    let near = |level: f64| level > 0.0 && (exit_price - level).abs() / level * 100.0 <= TOLERANCE_PCT;

    match position.direction {
        Direction::Long => {
            if near(position.stop_loss) && exit_price <= position.stop_loss * (1.0 + TOLERANCE_PCT / 100.0) {
                CloseReason::StopLoss
            } else if near(position.take_profit) {
                CloseReason::TakeProfit
            } else {
                CloseReason::Unknown
            }
        }
        Direction::Short => {
            if near(position.stop_loss) {
                CloseReason::StopLoss
            } else if near(position.take_profit) {
                CloseReason::TakeProfit
            } else {
                CloseReason::Unknown
            }
        }
        Direction::None => CloseReason::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{AccountBalance, CloseAck, FundingInfo, OrderAck, OrderRequest, RawPosition};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct FakeExchange {
        positions: Vec<RawPosition>,
        price: f64,
    }

    #[async_trait]
    impl ExchangeClient for FakeExchange {
        async fn get_candles(&self, _symbol: &str, _timeframe: &str, _limit: u32) -> anyhow::Result<Vec<crate::market_data::Candle>> {
            Ok(vec![])
        }
        async fn get_price(&self, _symbol: &str) -> anyhow::Result<f64> {
            Ok(self.price)
        }
        async fn get_all_mids(&self) -> anyhow::Result<HashMap<String, f64>> {
            Ok(HashMap::new())
        }
        async fn get_account_balance(&self) -> anyhow::Result<AccountBalance> {
            Ok(AccountBalance { total_equity: 1000.0, free_margin: 1000.0, unrealised_pnl: 0.0 })
        }
        async fn get_positions(&self) -> anyhow::Result<Vec<RawPosition>> {
            Ok(self.positions.clone())
        }
        async fn get_funding_rate(&self, _symbol: &str) -> anyhow::Result<FundingInfo> {
            anyhow::bail!("not implemented")
        }
        async fn place_order_with_tpsl(&self, _req: OrderRequest) -> anyhow::Result<OrderAck> {
            anyhow::bail!("not implemented")
        }
        async fn close_position(&self, _symbol: &str) -> anyhow::Result<CloseAck> {
            anyhow::bail!("not implemented")
        }
    }

    struct RecordingHandler {
        events: Mutex<Vec<(String, f64, CloseReason)>>,
    }

    impl PositionCloseHandler for RecordingHandler {
        fn on_position_closed(&self, symbol: &str, pnl: f64, reason: CloseReason) {
            self.events.lock().push((symbol.to_string(), pnl, reason));
        }
    }

    fn sample_position(symbol: &str) -> Position {
        Position {
            symbol: symbol.to_string(),
            direction: Direction::Long,
            entry_price: 100.0,
            size: 1.0,
            stop_loss: 95.0,
            take_profit: 110.0,
            opened_at_ms: 0,
            leverage: 5,
            from_sync: false,
            analysis_snapshot: None,
        }
    }

    #[tokio::test]
    async fn poll_closes_positions_missing_from_exchange() {
        let manager = PositionManager::new();
        manager.track(sample_position("BTCUSDT"));
        let exchange = FakeExchange { positions: vec![], price: 112.0 };
        let handler = RecordingHandler { events: Mutex::new(vec![]) };

        manager.poll(&exchange, &handler).await.unwrap();

        assert!(!manager.is_tracked("BTCUSDT"));
        let events = handler.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "BTCUSDT");
        assert!(events[0].1 > 0.0, "long exit above entry should be profitable");
    }

    #[tokio::test]
    async fn poll_adopts_untracked_real_positions_as_from_sync() {
        let manager = PositionManager::new();
        let exchange = FakeExchange {
            positions: vec![RawPosition { symbol: "ETHUSDT".to_string(), size: 2.0, entry_price: 50.0 }],
            price: 50.0,
        };
        let handler = RecordingHandler { events: Mutex::new(vec![]) };

        manager.poll(&exchange, &handler).await.unwrap();

        let adopted = manager.get("ETHUSDT").expect("should be tracked after sync");
        assert!(adopted.from_sync);
        assert_eq!(adopted.direction, Direction::Long);
    }

    #[tokio::test]
    async fn poll_leaves_still_open_positions_untouched() {
        let manager = PositionManager::new();
        manager.track(sample_position("BTCUSDT"));
        let exchange = FakeExchange {
            positions: vec![RawPosition { symbol: "BTCUSDT".to_string(), size: 1.0, entry_price: 100.0 }],
            price: 105.0,
        };
        let handler = RecordingHandler { events: Mutex::new(vec![]) };

        manager.poll(&exchange, &handler).await.unwrap();

        assert!(manager.is_tracked("BTCUSDT"));
        assert!(handler.events.lock().is_empty());
    }

    #[test]
    fn compute_pnl_short_profits_on_price_decline() {
        let mut position = sample_position("BTCUSDT");
        position.direction = Direction::Short;
        let pnl = compute_pnl(&position, 90.0);
        assert_eq!(pnl, 10.0);
    }
}
