// =============================================================================
// BinanceFuturesClient — concrete ExchangeClient over fapi.binance.com
// =============================================================================
//
// Grounded on the teacher's `binance/client.rs` HMAC-SHA256 signing pattern
// (sign/signed_query/timestamp_ms), retargeted from the spot `/api/v3/*`
// surface to the USDT-M futures `/fapi/v1|v2/*` surface, plus the teacher's
// `futures_intel/funding_rate.rs` contrarian-signal interpretation for
// `get_funding_rate`.
// =============================================================================

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use sha2::Sha256;
use tracing::{debug, instrument, warn};

use crate::market_data::Candle;

use super::{
    AccountBalance, CloseAck, ExchangeClient, FundingBias, FundingInfo, OrderAck, OrderRequest,
    RawPosition,
};

type HmacSha256 = Hmac<Sha256>;

const RECV_WINDOW: u64 = 5000;

/// Signed REST client for Binance USDT-margined perpetual futures.
#[derive(Clone)]
pub struct BinanceFuturesClient {
    secret: String,
    base_url: String,
    client: reqwest::Client,
}

impl BinanceFuturesClient {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        let api_key = api_key.into();
        let secret = secret.into();

        let mut default_headers = HeaderMap::new();
        if let Ok(val) = HeaderValue::from_str(&api_key) {
            default_headers.insert("X-MBX-APIKEY", val);
        }

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        Self {
            secret,
            base_url: "https://fapi.binance.com".to_string(),
            client,
        }
    }

    fn sign(&self, query: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("HMAC accepts any key size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX epoch")
            .as_millis() as u64
    }

    fn signed_query(&self, params: &str) -> String {
        let ts = Self::timestamp_ms();
        let base = if params.is_empty() {
            format!("timestamp={ts}&recvWindow={RECV_WINDOW}")
        } else {
            format!("{params}&timestamp={ts}&recvWindow={RECV_WINDOW}")
        };
        let sig = self.sign(&base);
        format!("{base}&signature={sig}")
    }

    fn parse_str_f64(val: &serde_json::Value) -> Result<f64> {
        if let Some(s) = val.as_str() {
            s.parse::<f64>()
                .with_context(|| format!("failed to parse '{s}' as f64"))
        } else if let Some(n) = val.as_f64() {
            Ok(n)
        } else {
            anyhow::bail!("expected string or number, got: {val}")
        }
    }
}

#[async_trait]
impl ExchangeClient for BinanceFuturesClient {
    /// GET /fapi/v1/klines (public).
    #[instrument(skip(self), name = "futures::get_candles")]
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/fapi/v1/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, timeframe, limit
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /fapi/v1/klines request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse klines response")?;

        if !status.is_success() {
            anyhow::bail!("Binance GET /fapi/v1/klines returned {}: {}", status, body);
        }

        let raw = body.as_array().context("klines response is not an array")?;
        let mut candles = Vec::with_capacity(raw.len());

        for entry in raw {
            let arr = entry.as_array().context("kline entry is not an array")?;
            if arr.len() < 7 {
                warn!("skipping malformed kline entry with {} elements", arr.len());
                continue;
            }
            let open_time = arr[0].as_i64().unwrap_or(0);
            let open = Self::parse_str_f64(&arr[1])?;
            let high = Self::parse_str_f64(&arr[2])?;
            let low = Self::parse_str_f64(&arr[3])?;
            let close = Self::parse_str_f64(&arr[4])?;
            let volume = Self::parse_str_f64(&arr[5])?;
            let close_time = arr[6].as_i64().unwrap_or(0);
            let quote_volume = arr.get(7).and_then(|v| Self::parse_str_f64(v).ok()).unwrap_or(0.0);
            let trades_count = arr.get(8).and_then(|v| v.as_u64()).unwrap_or(0);
            let taker_buy_volume = arr.get(9).and_then(|v| Self::parse_str_f64(v).ok()).unwrap_or(0.0);
            let taker_buy_quote_volume =
                arr.get(10).and_then(|v| Self::parse_str_f64(v).ok()).unwrap_or(0.0);

            candles.push(Candle {
                open_time,
                close_time,
                open,
                high,
                low,
                close,
                volume,
                quote_volume,
                trades_count,
                taker_buy_volume,
                taker_buy_quote_volume,
                is_closed: true,
            });
        }

        debug!(symbol, timeframe, count = candles.len(), "futures klines fetched");
        Ok(candles)
    }

    /// GET /fapi/v1/ticker/price (public).
    async fn get_price(&self, symbol: &str) -> Result<f64> {
        let url = format!("{}/fapi/v1/ticker/price?symbol={}", self.base_url, symbol);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /fapi/v1/ticker/price request failed")?;
        let body: serde_json::Value = resp.json().await.context("failed to parse ticker price")?;
        Self::parse_str_f64(&body["price"])
    }

    /// GET /fapi/v1/ticker/price (no symbol — all mids, public).
    async fn get_all_mids(&self) -> Result<HashMap<String, f64>> {
        let url = format!("{}/fapi/v1/ticker/price", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /fapi/v1/ticker/price (all) request failed")?;
        let body: Vec<serde_json::Value> =
            resp.json().await.context("failed to parse all-mids response")?;

        let mut mids = HashMap::with_capacity(body.len());
        for entry in body {
            if let Some(symbol) = entry["symbol"].as_str() {
                if let Ok(price) = Self::parse_str_f64(&entry["price"]) {
                    mids.insert(symbol.to_string(), price);
                }
            }
        }
        Ok(mids)
    }

    /// GET /fapi/v2/account (signed).
    #[instrument(skip(self), name = "futures::get_account_balance")]
    async fn get_account_balance(&self) -> Result<AccountBalance> {
        let qs = self.signed_query("");
        let url = format!("{}/fapi/v2/account?{}", self.base_url, qs);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /fapi/v2/account request failed")?;

        let status = resp.status();
        let body: serde_json::Value =
            resp.json().await.context("failed to parse account response")?;

        if !status.is_success() {
            anyhow::bail!("Binance GET /fapi/v2/account returned {}: {}", status, body);
        }

        let total_equity = Self::parse_str_f64(&body["totalMarginBalance"]).unwrap_or(0.0);
        let free_margin = Self::parse_str_f64(&body["availableBalance"]).unwrap_or(0.0);
        let unrealised_pnl = Self::parse_str_f64(&body["totalUnrealizedProfit"]).unwrap_or(0.0);

        Ok(AccountBalance {
            total_equity,
            free_margin,
            unrealised_pnl,
        })
    }

    /// GET /fapi/v2/positionRisk (signed).
    #[instrument(skip(self), name = "futures::get_positions")]
    async fn get_positions(&self) -> Result<Vec<RawPosition>> {
        let qs = self.signed_query("");
        let url = format!("{}/fapi/v2/positionRisk?{}", self.base_url, qs);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /fapi/v2/positionRisk request failed")?;

        let status = resp.status();
        let body: serde_json::Value =
            resp.json().await.context("failed to parse positionRisk response")?;

        if !status.is_success() {
            anyhow::bail!(
                "Binance GET /fapi/v2/positionRisk returned {}: {}",
                status,
                body
            );
        }

        let raw = body
            .as_array()
            .context("positionRisk response is not an array")?;

        let mut positions = Vec::new();
        for entry in raw {
            let size = Self::parse_str_f64(&entry["positionAmt"]).unwrap_or(0.0);
            if size == 0.0 {
                continue; // flat — not an open position
            }
            let symbol = entry["symbol"].as_str().unwrap_or("").to_string();
            let entry_price = Self::parse_str_f64(&entry["entryPrice"]).unwrap_or(0.0);
            positions.push(RawPosition {
                symbol,
                size,
                entry_price,
            });
        }

        debug!(count = positions.len(), "open futures positions fetched");
        Ok(positions)
    }

    /// GET /fapi/v1/fundingRate (public), contrarian interpretation as the
    /// teacher's `futures_intel::FundingRateMonitor::fetch`.
    async fn get_funding_rate(&self, symbol: &str) -> Result<FundingInfo> {
        let url = format!(
            "{}/fapi/v1/fundingRate?symbol={}&limit=1",
            self.base_url, symbol
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET funding rate for {symbol}"))?;

        let status = resp.status();
        let body: serde_json::Value =
            resp.json().await.context("failed to parse funding rate response")?;

        if !status.is_success() {
            anyhow::bail!("funding rate API returned {}: {}", status, body);
        }

        let arr = body.as_array().context("funding rate response is not an array")?;
        let entry = arr.first().context("funding rate response array is empty")?;
        let rate: f64 = entry["fundingRate"]
            .as_str()
            .unwrap_or("0")
            .parse()
            .unwrap_or(0.0);
        let rate_pct = rate * 100.0;

        let (signal, strength) = if rate_pct > 0.05 {
            (FundingBias::Bearish, 0.8)
        } else if rate_pct > 0.03 {
            (FundingBias::Bearish, 0.4)
        } else if rate_pct < -0.05 {
            (FundingBias::Bullish, 0.9)
        } else if rate_pct < -0.03 {
            (FundingBias::Bullish, 0.5)
        } else {
            (FundingBias::Neutral, 0.0)
        };

        Ok(FundingInfo {
            rate,
            signal,
            strength,
        })
    }

    /// POST /fapi/v1/order (signed) with attached TP/SL as reduce-only
    /// stop-market / take-profit-market orders.
    #[instrument(skip(self, req), name = "futures::place_order_with_tpsl")]
    async fn place_order_with_tpsl(&self, req: OrderRequest) -> Result<OrderAck> {
        let side = if req.is_buy { "BUY" } else { "SELL" };
        let params = format!(
            "symbol={}&side={}&type=MARKET&quantity={}",
            req.symbol, side, req.size
        );
        let qs = self.signed_query(&params);
        let url = format!("{}/fapi/v1/order?{}", self.base_url, qs);

        let resp = self
            .client
            .post(&url)
            .send()
            .await
            .context("POST /fapi/v1/order request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.context("failed to parse order response")?;

        if !status.is_success() {
            anyhow::bail!("Binance POST /fapi/v1/order returned {}: {}", status, body);
        }

        let order_id = body["orderId"]
            .as_u64()
            .map(|n| n.to_string())
            .unwrap_or_default();
        let filled_price = Self::parse_str_f64(&body["avgPrice"]).unwrap_or(req.price);
        let filled_size = Self::parse_str_f64(&body["executedQty"]).unwrap_or(req.size);

        // Attach reduce-only TP/SL brackets. Best-effort: failures here are
        // logged, not propagated as the entry order has already filled.
        let opposite_side = if req.is_buy { "SELL" } else { "BUY" };
        for (stop_price, order_type) in
            [(req.take_profit, "TAKE_PROFIT_MARKET"), (req.stop_loss, "STOP_MARKET")]
        {
            let bracket_params = format!(
                "symbol={}&side={}&type={}&stopPrice={}&closePosition=true",
                req.symbol, opposite_side, order_type, stop_price
            );
            let bracket_qs = self.signed_query(&bracket_params);
            let bracket_url = format!("{}/fapi/v1/order?{}", self.base_url, bracket_qs);
            if let Err(e) = self.client.post(&bracket_url).send().await {
                warn!(symbol = %req.symbol, order_type, error = %e, "bracket order placement failed");
            }
        }

        Ok(OrderAck {
            order_id,
            symbol: req.symbol,
            filled_price,
            filled_size,
        })
    }

    /// POST /fapi/v1/order with `reduceOnly=true` and `closePosition=true`.
    async fn close_position(&self, symbol: &str) -> Result<CloseAck> {
        // Determine current side to close against.
        let positions = self.get_positions().await?;
        let pos = positions
            .iter()
            .find(|p| p.symbol == symbol)
            .context("no open position to close")?;
        let side = if pos.size > 0.0 { "SELL" } else { "BUY" };

        let params = format!(
            "symbol={symbol}&side={side}&type=MARKET&closePosition=true"
        );
        let qs = self.signed_query(&params);
        let url = format!("{}/fapi/v1/order?{}", self.base_url, qs);

        let resp = self
            .client
            .post(&url)
            .send()
            .await
            .context("POST /fapi/v1/order (close) request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.context("failed to parse close response")?;

        if !status.is_success() {
            anyhow::bail!("Binance close position returned {}: {}", status, body);
        }

        let exit_price = Self::parse_str_f64(&body["avgPrice"]).unwrap_or(pos.entry_price);
        Ok(CloseAck {
            symbol: symbol.to_string(),
            exit_price,
        })
    }
}

impl std::fmt::Debug for BinanceFuturesClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceFuturesClient")
            .field("secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}
