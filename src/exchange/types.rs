//! Type definitions for Binance Futures API requests and responses.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange information for futures.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturesExchangeInfo {
    pub symbols: Vec<FuturesSymbolInfo>,
}

/// Symbol information for futures.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturesSymbolInfo {
    pub symbol: String,
    pub contract_type: String,
    pub status: String,
    pub base_asset: String,
    pub quote_asset: String,
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

impl FuturesSymbolInfo {
    /// `PRICE_FILTER.tickSize`, as sent by the exchange.
    pub fn tick_size(&self) -> Option<&str> {
        self.filters.iter().find_map(|f| match f {
            SymbolFilter::PriceFilter { tick_size } => Some(tick_size.as_str()),
            _ => None,
        })
    }

    /// `LOT_SIZE.stepSize`, as sent by the exchange.
    pub fn step_size(&self) -> Option<&str> {
        self.filters.iter().find_map(|f| match f {
            SymbolFilter::LotSize { step_size } => Some(step_size.as_str()),
            _ => None,
        })
    }
}

/// Symbol filters. Granularities stay strings: their textual precision
/// decides how order literals are formatted.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "filterType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SymbolFilter {
    PriceFilter {
        #[serde(rename = "tickSize")]
        tick_size: String,
    },
    LotSize {
        #[serde(rename = "stepSize")]
        step_size: String,
    },
    #[serde(other)]
    Other,
}

/// Account balance information.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    pub asset: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub available_balance: Decimal,
}

/// Futures position risk entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub position_amt: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub entry_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub mark_price: Decimal,
    #[serde(rename = "unRealizedProfit", with = "rust_decimal::serde::str")]
    pub unrealized_profit: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub liquidation_price: Decimal,
    pub position_side: PositionSide,
}

/// Position side (long, short, or both for one-way mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Both,
    Long,
    Short,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Both => "BOTH",
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    pub fn opposite(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    Market,
    StopMarket,
    TakeProfitMarket,
    TrailingStopMarket,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Limit => "LIMIT",
            OrderType::Market => "MARKET",
            OrderType::StopMarket => "STOP_MARKET",
            OrderType::TakeProfitMarket => "TAKE_PROFIT_MARKET",
            OrderType::TrailingStopMarket => "TRAILING_STOP_MARKET",
        }
    }
}

/// Order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
    ExpiredInMatch,
}

/// Hedge-mode market order. `quantity` is already rounded to the symbol's
/// step and is sent verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub position_side: PositionSide,
    pub quantity: Decimal,
}

impl MarketOrder {
    /// Wire literal for the `quantity` parameter.
    pub fn quantity_literal(&self) -> String {
        self.quantity.to_string()
    }
}

/// Order response from the exchange.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: i64,
    pub symbol: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub client_order_id: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub orig_qty: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub executed_qty: Decimal,
    pub side: OrderSide,
    pub position_side: PositionSide,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub update_time: i64,
}

/// Response of `POST /fapi/v1/listenKey`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenKey {
    pub listen_key: String,
}

/// Response of `GET /fapi/v1/time`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTime {
    pub server_time: i64,
}

/// Error body returned by the REST API (`{"code":-2019,"msg":"Margin is insufficient."}`).
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}
