//! Binance USDⓈ-M Futures connectivity.
//!
//! - REST: server time, exchange filters, balances, positions, market orders
//! - WebSocket: the master's user-data stream (order fills)
//!
//! Replication only talks to accounts through [`TradingClient`], so the live
//! client and [`MockExchangeClient`] are interchangeable.

mod client;
pub mod mock;
mod traits;
mod types;
mod websocket;

pub use client::BinanceClient;
pub use mock::MockExchangeClient;
pub use traits::TradingClient;
pub use types::*;
pub use websocket::{parse_user_data, BinanceUserStream};

#[cfg(test)]
pub use traits::MockTradingClient;
