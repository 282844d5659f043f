//! Binance Futures REST API client.

use crate::config::BinanceConfig;
use crate::exchange::traits::TradingClient;
use crate::exchange::types::*;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::{debug, instrument};

const FUTURES_BASE_URL: &str = "https://fapi.binance.com";
const FUTURES_TESTNET_URL: &str = "https://testnet.binancefuture.com";

/// Binance USDⓈ-M futures client for one account.
pub struct BinanceClient {
    http: Client,
    api_key: String,
    secret_key: String,
    base_url: String,
    recv_window_ms: u64,
    /// Server time minus local time, in milliseconds
    time_offset_ms: AtomicI64,
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("base_url", &self.base_url)
            .field("time_offset_ms", &self.time_offset_ms.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl BinanceClient {
    /// Create a client for the master account described by `config`.
    pub fn new(config: &BinanceConfig) -> Result<Self> {
        Self::for_account(&config.api_key, &config.secret_key, config)
    }

    /// Create a client for another account sharing the connectivity settings
    /// (testnet, proxy, recv window) of `config`.
    pub fn for_account(api_key: &str, secret_key: &str, config: &BinanceConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(Duration::from_secs(30));

        if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.is_empty()) {
            let proxy = reqwest::Proxy::all(proxy)
                .with_context(|| format!("Invalid proxy URL {}", proxy))?;
            builder = builder.proxy(proxy);
        }

        let http = builder.build().context("Failed to create HTTP client")?;

        let base_url = if config.testnet {
            FUTURES_TESTNET_URL.to_string()
        } else {
            FUTURES_BASE_URL.to_string()
        };

        Ok(Self {
            http,
            api_key: api_key.to_string(),
            secret_key: secret_key.to_string(),
            base_url,
            recv_window_ms: config.recv_window_ms,
            time_offset_ms: AtomicI64::new(0),
        })
    }

    /// Point the client at another REST endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Generate HMAC-SHA256 signature for authenticated requests.
    fn sign(&self, query_string: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(query_string.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Current timestamp in milliseconds, corrected by the server time offset.
    fn timestamp(&self) -> i64 {
        chrono::Utc::now().timestamp_millis() + self.time_offset_ms.load(Ordering::Relaxed)
    }

    /// Build `params&timestamp=..&recvWindow=..&signature=..`.
    fn signed_query(&self, params: &[(&str, String)]) -> String {
        let mut query: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect();
        query.push(format!("recvWindow={}", self.recv_window_ms));
        query.push(format!("timestamp={}", self.timestamp()));

        let query = query.join("&");
        let signature = self.sign(&query);
        format!("{}&signature={}", query, signature)
    }

    async fn send_signed(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Response> {
        let url = format!("{}{}?{}", self.base_url, path, self.signed_query(params));
        self.http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", path))
    }

    /// Decode a response, turning Binance error bodies into errors.
    async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read {} response", what))?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(err) => anyhow!("{} rejected ({}): {} {}", what, status, err.code, err.msg),
                Err(_) => anyhow!("{} rejected ({}): {}", what, status, body),
            });
        }

        serde_json::from_str(&body).with_context(|| format!("Failed to parse {} response", what))
    }

    // ==================== Session ====================

    /// Sync the local clock offset with the exchange server time.
    ///
    /// Returns the applied offset in milliseconds.
    #[instrument(skip(self))]
    pub async fn set_server_time(&self) -> Result<i64> {
        let url = format!("{}/fapi/v1/time", self.base_url);
        let before = chrono::Utc::now().timestamp_millis();
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("Failed to fetch server time")?;
        let time: ServerTime = Self::decode(response, "server time").await?;

        let offset = time.server_time - before;
        self.time_offset_ms.store(offset, Ordering::Relaxed);
        debug!(offset_ms = offset, "Server time offset applied");
        Ok(offset)
    }

    /// Start a user data stream and return its listen key.
    #[instrument(skip(self))]
    pub async fn start_user_stream(&self) -> Result<String> {
        let url = format!("{}/fapi/v1/listenKey", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .context("Failed to start user data stream")?;
        let key: ListenKey = Self::decode(response, "listen key").await?;
        Ok(key.listen_key)
    }

    /// Extend the validity of the active listen key by 60 minutes.
    #[instrument(skip(self))]
    pub async fn keepalive_user_stream(&self) -> Result<()> {
        let url = format!("{}/fapi/v1/listenKey", self.base_url);
        let response = self
            .http
            .put(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .context("Failed to keep user data stream alive")?;
        let _: serde_json::Value = Self::decode(response, "listen key keepalive").await?;
        Ok(())
    }

    // ==================== Market Data (Public) ====================

    /// Get futures exchange information (symbols and filters).
    #[instrument(skip(self))]
    pub async fn get_futures_exchange_info(&self) -> Result<FuturesExchangeInfo> {
        let url = format!("{}/fapi/v1/exchangeInfo", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("Failed to fetch exchange info")?;

        Self::decode(response, "exchange info").await
    }

    // ==================== Account (Authenticated) ====================

    /// Get account balance information.
    #[instrument(skip(self))]
    pub async fn get_account_balance(&self) -> Result<Vec<AccountBalance>> {
        let response = self.send_signed(Method::GET, "/fapi/v2/balance", &[]).await?;
        Self::decode(response, "account balance").await
    }

    /// Get current positions.
    #[instrument(skip(self))]
    pub async fn get_positions(&self) -> Result<Vec<Position>> {
        let response = self
            .send_signed(Method::GET, "/fapi/v2/positionRisk", &[])
            .await?;
        Self::decode(response, "position risk").await
    }

    // ==================== Orders (Authenticated) ====================

    /// Place a hedge-mode market order.
    #[instrument(skip(self))]
    pub async fn place_futures_order(&self, order: &MarketOrder) -> Result<OrderResponse> {
        let params = [
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("positionSide", order.position_side.as_str().to_string()),
            ("type", OrderType::Market.as_str().to_string()),
            ("quantity", order.quantity_literal()),
        ];

        debug!("Placing futures order: {:?}", order);

        let response = self
            .send_signed(Method::POST, "/fapi/v1/order", &params)
            .await?;
        Self::decode(response, "order").await
    }
}

#[async_trait]
impl TradingClient for BinanceClient {
    async fn free_balance(&self, asset: &str) -> Result<Decimal> {
        self.get_account_balance()
            .await?
            .into_iter()
            .find(|b| b.asset == asset)
            .map(|b| b.available_balance)
            .ok_or_else(|| anyhow!("no {} balance", asset))
    }

    async fn place_market_order(&self, order: &MarketOrder) -> Result<OrderResponse> {
        self.place_futures_order(order).await
    }

    async fn positions(&self) -> Result<Vec<Position>> {
        self.get_positions().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> BinanceConfig {
        BinanceConfig {
            api_key: "test_key".into(),
            secret_key: "test_secret".into(),
            ..BinanceConfig::default()
        }
    }

    async fn client_for(server: &MockServer) -> BinanceClient {
        BinanceClient::new(&test_config())
            .unwrap()
            .with_base_url(server.uri())
    }

    #[test]
    fn test_hmac_signature_format() {
        let client = BinanceClient::new(&test_config()).unwrap();
        let signature = client.sign("symbol=BTCUSDT&side=BUY&type=MARKET&quantity=0.001");

        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_signed_query_appends_timestamp_and_signature() {
        let client = BinanceClient::new(&test_config()).unwrap();
        let query = client.signed_query(&[("symbol", "BTCUSDT".to_string())]);

        assert!(query.starts_with("symbol=BTCUSDT&recvWindow=5000&timestamp="));
        assert!(query.contains("&signature="));
    }

    #[test]
    fn test_invalid_proxy_is_rejected() {
        let config = BinanceConfig {
            proxy: Some("http://[::1".into()),
            ..test_config()
        };
        assert!(BinanceClient::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_free_balance_picks_quote_asset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fapi/v2/balance"))
            .and(header("X-MBX-APIKEY", "test_key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"asset": "BNB", "balance": "1.5", "availableBalance": "1.5"},
                {"asset": "USDT", "balance": "1200.00", "availableBalance": "950.25"}
            ])))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert_eq!(client.free_balance("USDT").await.unwrap(), dec!(950.25));
        assert!(client.free_balance("BUSD").await.is_err());
    }

    #[tokio::test]
    async fn test_start_user_stream_returns_listen_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fapi/v1/listenKey"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "listenKey": "pqia91ma19a5s61cv6a81va65sdf19v8a65a1a5s61cv6a81va65sdf19v8a65a1"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let key = client.start_user_stream().await.unwrap();
        assert!(key.starts_with("pqia91ma"));
    }

    #[tokio::test]
    async fn test_keepalive_user_stream_puts_listen_key() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/fapi/v1/listenKey"))
            .and(header("X-MBX-APIKEY", "test_key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.keepalive_user_stream().await.unwrap();
    }

    #[tokio::test]
    async fn test_keepalive_of_unknown_listen_key_fails() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/fapi/v1/listenKey"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": -1125,
                "msg": "This listenKey does not exist."
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.keepalive_user_stream().await.unwrap_err();
        assert!(format!("{:#}", err).contains("listenKey does not exist"));
    }

    #[tokio::test]
    async fn test_set_server_time_stores_offset() {
        let server = MockServer::start().await;
        let ahead = chrono::Utc::now().timestamp_millis() + 60_000;
        Mock::given(method("GET"))
            .and(path("/fapi/v1/time"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "serverTime": ahead })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let offset = client.set_server_time().await.unwrap();
        assert!(offset > 50_000 && offset <= 60_000);
        assert!(client.timestamp() >= ahead);
    }

    #[tokio::test]
    async fn test_place_order_sends_hedge_mode_params() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fapi/v1/order"))
            .and(query_param("symbol", "BTCUSDT"))
            .and(query_param("side", "SELL"))
            .and(query_param("positionSide", "LONG"))
            .and(query_param("type", "MARKET"))
            .and(query_param("quantity", "0.200"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "orderId": 22542179,
                "symbol": "BTCUSDT",
                "status": "NEW",
                "clientOrderId": "testOrder",
                "origQty": "0.200",
                "executedQty": "0",
                "side": "SELL",
                "positionSide": "LONG",
                "type": "MARKET",
                "updateTime": 1566818724722i64
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let order = MarketOrder {
            symbol: "BTCUSDT".into(),
            side: OrderSide::Sell,
            position_side: PositionSide::Long,
            quantity: "0.200".parse().unwrap(),
        };
        let response = client.place_market_order(&order).await.unwrap();
        assert_eq!(response.order_id, 22542179);
        assert_eq!(response.orig_qty, dec!(0.2));
    }

    #[tokio::test]
    async fn test_order_rejection_surfaces_api_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fapi/v1/order"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": -2019,
                "msg": "Margin is insufficient."
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let order = MarketOrder {
            symbol: "BTCUSDT".into(),
            side: OrderSide::Buy,
            position_side: PositionSide::Long,
            quantity: dec!(1),
        };
        let err = client.place_market_order(&order).await.unwrap_err();
        assert!(err.to_string().contains("Margin is insufficient."));
    }

    #[tokio::test]
    async fn test_exchange_info_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fapi/v1/exchangeInfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "timezone": "UTC",
                "symbols": [{
                    "symbol": "ETHUSDT",
                    "contractType": "PERPETUAL",
                    "status": "TRADING",
                    "baseAsset": "ETH",
                    "quoteAsset": "USDT",
                    "filters": [
                        {"filterType": "PRICE_FILTER", "tickSize": "0.01"},
                        {"filterType": "LOT_SIZE", "stepSize": "0.001"}
                    ]
                }]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let info = client.get_futures_exchange_info().await.unwrap();
        assert_eq!(info.symbols[0].tick_size(), Some("0.01"));
        assert_eq!(info.symbols[0].step_size(), Some("0.001"));
    }
}
