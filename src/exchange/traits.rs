//! Account-level trading interface shared by the live client and the mock.
//!
//! The replication engine only needs three things from an account: its free
//! balance, a way to submit a hedge-mode market order, and (for the risk
//! poll) its open positions.

use super::types::{MarketOrder, OrderResponse, Position};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Trading operations on a single exchange account.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradingClient: Send + Sync {
    /// Free (available) balance of `asset`.
    ///
    /// Fails when the account holds no entry for the asset.
    async fn free_balance(&self, asset: &str) -> anyhow::Result<Decimal>;

    /// Submit a market order.
    async fn place_market_order(&self, order: &MarketOrder) -> anyhow::Result<OrderResponse>;

    /// Current position risk entries.
    async fn positions(&self) -> anyhow::Result<Vec<Position>>;
}
