//! Binance Futures user-data stream.

use super::client::BinanceClient;
use crate::replication::FillEvent;
use crate::stream::{StreamError, UserDataEvent, UserStreamConnector, UserStreamSession};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures_util::StreamExt;
use reqwest::Url;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    client_async_tls, connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

const FUTURES_WS_URL: &str = "wss://fstream.binance.com";
const FUTURES_TESTNET_WS_URL: &str = "wss://stream.binancefuture.com";

/// Upper bound on the proxy's CONNECT response head
const MAX_PROXY_RESPONSE_HEAD: usize = 8 * 1024;

type UserDataSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// User-data payloads, discriminated by `e`.
#[derive(Debug, Deserialize)]
#[serde(tag = "e")]
enum RawUserDataEvent {
    #[serde(rename = "ORDER_TRADE_UPDATE")]
    OrderTradeUpdate {
        #[serde(rename = "o")]
        order: OrderTradeUpdate,
    },
    #[serde(rename = "listenKeyExpired")]
    ListenKeyExpired,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
struct OrderTradeUpdate {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "S")]
    side: String,
    #[serde(rename = "R", default)]
    reduce_only: bool,
    #[serde(rename = "x")]
    execution_type: String,
    #[serde(rename = "X")]
    order_status: String,
    /// Accumulated filled quantity
    #[serde(rename = "z")]
    filled_qty: String,
    /// Last filled price
    #[serde(rename = "L")]
    last_price: String,
    #[serde(rename = "i")]
    order_id: i64,
}

impl From<OrderTradeUpdate> for FillEvent {
    fn from(o: OrderTradeUpdate) -> Self {
        FillEvent {
            symbol: o.symbol,
            side: o.side,
            reduce_only: o.reduce_only,
            execution_type: o.execution_type,
            order_status: o.order_status,
            filled_quantity: o.filled_qty,
            fill_price: o.last_price,
            order_id: o.order_id,
        }
    }
}

/// Decode one text frame. Unrecognised or malformed payloads become
/// [`UserDataEvent::Other`].
pub fn parse_user_data(text: &str) -> UserDataEvent {
    match serde_json::from_str::<RawUserDataEvent>(text) {
        Ok(RawUserDataEvent::OrderTradeUpdate { order }) => UserDataEvent::OrderUpdate(order.into()),
        Ok(RawUserDataEvent::ListenKeyExpired) => UserDataEvent::ListenKeyExpired,
        Ok(RawUserDataEvent::Other) => UserDataEvent::Other,
        Err(e) => {
            warn!(error = %e, payload = %text, "Undecodable user data message");
            UserDataEvent::Other
        }
    }
}

/// Opens master user-data sessions: fetch a listen key, connect, and keep
/// the key alive while the session lives.
pub struct BinanceUserStream {
    client: Arc<BinanceClient>,
    ws_base_url: String,
    keepalive_interval: Duration,
    /// HTTP proxy the websocket is tunnelled through
    proxy: Option<String>,
}

impl BinanceUserStream {
    pub fn new(client: Arc<BinanceClient>, testnet: bool, keepalive_interval: Duration) -> Self {
        let ws_base_url = if testnet {
            FUTURES_TESTNET_WS_URL.to_string()
        } else {
            FUTURES_WS_URL.to_string()
        };

        Self {
            client,
            ws_base_url,
            keepalive_interval,
            proxy: None,
        }
    }

    pub fn with_ws_base_url(mut self, ws_base_url: impl Into<String>) -> Self {
        self.ws_base_url = ws_base_url.into();
        self
    }

    /// Route the websocket through an HTTP proxy (same setting as REST).
    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy.filter(|p| !p.is_empty());
        self
    }

    fn spawn_keepalive(&self) -> KeepAliveTask {
        let client = self.client.clone();
        let period = self.keepalive_interval;

        KeepAliveTask(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick fires immediately; the key is brand new.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match client.keepalive_user_stream().await {
                    Ok(()) => debug!("Listen key refreshed"),
                    Err(e) => warn!(error = %e, "Listen key refresh failed"),
                }
            }
        }))
    }
}

#[async_trait]
impl UserStreamConnector for BinanceUserStream {
    async fn connect(&self) -> Result<Box<dyn UserStreamSession>> {
        let listen_key = self
            .client
            .start_user_stream()
            .await
            .context("Failed to obtain listen key")?;

        let url = format!("{}/ws/{}", self.ws_base_url, listen_key);
        info!(
            base_url = %self.ws_base_url,
            proxied = self.proxy.is_some(),
            "Connecting to user data stream"
        );

        let stream = open_websocket(&url, self.proxy.as_deref()).await?;

        Ok(Box::new(BinanceUserSession {
            stream,
            _keepalive: self.spawn_keepalive(),
        }))
    }
}

/// Listen-key refresher, aborted when dropped.
struct KeepAliveTask(JoinHandle<()>);

impl Drop for KeepAliveTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Connect directly, or through an HTTP CONNECT tunnel when `proxy` is set.
async fn open_websocket(url: &str, proxy: Option<&str>) -> Result<UserDataSocket> {
    let Some(proxy) = proxy else {
        let (stream, _) = connect_async(url)
            .await
            .context("Failed to connect to user data stream")?;
        return Ok(stream);
    };

    let target = Url::parse(url).with_context(|| format!("Invalid stream URL {}", url))?;
    let host = target.host_str().context("Stream URL has no host")?;
    let port = target
        .port_or_known_default()
        .context("Stream URL has no port")?;

    let tunnel = open_tunnel(proxy, host, port).await?;
    let (stream, _) = client_async_tls(url, tunnel)
        .await
        .context("Failed to connect to user data stream through proxy")?;
    Ok(stream)
}

/// Open a TCP tunnel to `host:port` via `CONNECT` on an HTTP proxy.
async fn open_tunnel(proxy: &str, host: &str, port: u16) -> Result<TcpStream> {
    let proxy_url = Url::parse(proxy).with_context(|| format!("Invalid proxy URL {}", proxy))?;
    anyhow::ensure!(
        proxy_url.scheme() == "http",
        "Unsupported proxy scheme {} for the user data stream",
        proxy_url.scheme()
    );
    let proxy_host = proxy_url.host_str().context("Proxy URL has no host")?;
    let proxy_port = proxy_url.port_or_known_default().unwrap_or(80);

    let mut stream = TcpStream::connect((proxy_host, proxy_port))
        .await
        .with_context(|| format!("Failed to connect to proxy {}:{}", proxy_host, proxy_port))?;

    let authority = format!("{}:{}", host, port);
    let mut request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
    if !proxy_url.username().is_empty() {
        let user = urlencoding::decode(proxy_url.username())?;
        let password = urlencoding::decode(proxy_url.password().unwrap_or_default())?;
        let credentials = STANDARD.encode(format!("{}:{}", user, password));
        request.push_str(&format!("Proxy-Authorization: Basic {}\r\n", credentials));
    }
    request.push_str("\r\n");

    stream
        .write_all(request.as_bytes())
        .await
        .context("Failed to send CONNECT to proxy")?;

    let head = read_response_head(&mut stream).await?;
    let status_line = head.lines().next().unwrap_or_default();
    anyhow::ensure!(
        status_line.split_whitespace().nth(1) == Some("200"),
        "Proxy refused tunnel to {}: {}",
        authority,
        status_line
    );

    debug!(%authority, "Proxy tunnel established");
    Ok(stream)
}

/// Read up to and including the blank line. Byte-wise, so nothing after the
/// head (the start of the TLS handshake) is consumed.
async fn read_response_head(stream: &mut TcpStream) -> Result<String> {
    let mut head = Vec::with_capacity(128);
    let mut byte = [0u8; 1];

    while !head.ends_with(b"\r\n\r\n") {
        anyhow::ensure!(
            head.len() < MAX_PROXY_RESPONSE_HEAD,
            "Proxy response head too large"
        );
        let n = stream
            .read(&mut byte)
            .await
            .context("Failed to read proxy response")?;
        anyhow::ensure!(n > 0, "Proxy closed the connection during CONNECT");
        head.push(byte[0]);
    }

    Ok(String::from_utf8_lossy(&head).into_owned())
}

struct BinanceUserSession {
    stream: UserDataSocket,
    _keepalive: KeepAliveTask,
}

#[async_trait]
impl UserStreamSession for BinanceUserSession {
    async fn next_event(&mut self) -> Result<UserDataEvent, StreamError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(parse_user_data(&text)),
                Some(Ok(Message::Ping(_))) => {
                    // Pong is handled automatically by tungstenite
                    debug!("Received ping");
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "User data stream closed by server");
                    return Err(StreamError::Closed);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(StreamError::Transport(e.to_string())),
                None => return Err(StreamError::Closed),
            }
        }
    }
}
