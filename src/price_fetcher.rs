// =============================================================================
// Price Fetcher — TTL-cached market data over ExchangeClient
// =============================================================================
//
// Prices are cached 5s, candles 60s. A cache hit short-circuits the exchange
// call entirely; a miss or stale entry goes upstream. If the upstream call
// fails and a (possibly stale) cache entry exists, it's served with a
// warning instead of failing the cycle outright — only a cold cache on a
// failed fetch surfaces as `EngineError::Data`.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::warn;

use crate::config::Timeframe;
use crate::error::{EngineError, EngineResult};
use crate::exchange::ExchangeClient;
use crate::market_data::Candle;

const PRICE_TTL: Duration = Duration::from_secs(5);
const CANDLE_TTL: Duration = Duration::from_secs(60);

struct CacheEntry<T> {
    value: T,
    fetched_at: Instant,
}

pub struct PriceFetcher {
    exchange: Arc<dyn ExchangeClient>,
    price_cache: RwLock<HashMap<String, CacheEntry<f64>>>,
    candle_cache: RwLock<HashMap<(String, Timeframe), CacheEntry<Vec<Candle>>>>,
}

impl PriceFetcher {
    pub fn new(exchange: Arc<dyn ExchangeClient>) -> Self {
        Self {
            exchange,
            price_cache: RwLock::new(HashMap::new()),
            candle_cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_price(&self, symbol: &str) -> EngineResult<f64> {
        if let Some(entry) = self.price_cache.read().get(symbol) {
            if entry.fetched_at.elapsed() < PRICE_TTL {
                return Ok(entry.value);
            }
        }

        match self.exchange.get_price(symbol).await {
            Ok(price) => {
                self.price_cache.write().insert(symbol.to_string(), CacheEntry { value: price, fetched_at: Instant::now() });
                Ok(price)
            }
            Err(e) => {
                if let Some(entry) = self.price_cache.read().get(symbol) {
                    warn!(symbol, error = %e, "price fetch failed, serving stale cache");
                    return Ok(entry.value);
                }
                Err(EngineError::Data { symbol: symbol.to_string(), reason: e.to_string() })
            }
        }
    }

    pub async fn get_candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> EngineResult<Vec<Candle>> {
        let key = (symbol.to_string(), timeframe);

        if let Some(entry) = self.candle_cache.read().get(&key) {
            if entry.fetched_at.elapsed() < CANDLE_TTL && entry.value.len() >= limit {
                return Ok(entry.value.clone());
            }
        }

        match self.exchange.get_candles(symbol, timeframe.as_str(), limit as u32).await {
            Ok(candles) => {
                self.candle_cache.write().insert(key, CacheEntry { value: candles.clone(), fetched_at: Instant::now() });
                Ok(candles)
            }
            Err(e) => {
                if let Some(entry) = self.candle_cache.read().get(&key) {
                    warn!(symbol, timeframe = %timeframe, error = %e, "candle fetch failed, serving stale cache");
                    return Ok(entry.value.clone());
                }
                Err(EngineError::Data { symbol: symbol.to_string(), reason: e.to_string() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{AccountBalance, CloseAck, FundingInfo, OrderAck, OrderRequest, RawPosition};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingExchange {
        calls: AtomicU32,
        fail_after: u32,
        price: f64,
    }

    #[async_trait]
    impl ExchangeClient for CountingExchange {
        async fn get_candles(&self, _symbol: &str, _timeframe: &str, _limit: u32) -> anyhow::Result<Vec<Candle>> {
            Ok(vec![])
        }
        async fn get_price(&self, _symbol: &str) -> anyhow::Result<f64> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n >= self.fail_after {
                anyhow::bail!("upstream down");
            }
            Ok(self.price)
        }
        async fn get_all_mids(&self) -> anyhow::Result<HashMap<String, f64>> {
            Ok(HashMap::new())
        }
        async fn get_account_balance(&self) -> anyhow::Result<AccountBalance> {
            Ok(AccountBalance { total_equity: 0.0, free_margin: 0.0, unrealised_pnl: 0.0 })
        }
        async fn get_positions(&self) -> anyhow::Result<Vec<RawPosition>> {
            Ok(vec![])
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

    #[tokio::test]
    async fn caches_price_within_ttl() {
        let exchange = Arc::new(CountingExchange { calls: AtomicU32::new(0), fail_after: 100, price: 42.0 });
        let fetcher = PriceFetcher::new(exchange.clone());

        assert_eq!(fetcher.get_price("BTCUSDT").await.unwrap(), 42.0);
        assert_eq!(fetcher.get_price("BTCUSDT").await.unwrap(), 42.0);
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 1, "second call within TTL should hit cache");
    }

    #[tokio::test]
    async fn errors_when_no_cache_and_upstream_fails() {
        let exchange = Arc::new(CountingExchange { calls: AtomicU32::new(0), fail_after: 0, price: 7.0 });
        let fetcher = PriceFetcher::new(exchange);
        let result = fetcher.get_price("ADAUSDT").await;
        assert!(matches!(result, Err(EngineError::Data { .. })));
    }
}
