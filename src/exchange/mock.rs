//! Mock trading client for paper trading and tests.

use super::traits::TradingClient;
use super::types::*;
use anyhow::{bail, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Simulated hedge-mode account.
#[derive(Debug, Default, Clone)]
pub struct MockAccountState {
    /// Free balance per asset
    pub balances: HashMap<String, Decimal>,
    /// Open size per (symbol, position side), always non-negative
    pub positions: HashMap<(String, PositionSide), Decimal>,
    /// Every accepted order, in submission order
    pub orders: Vec<MarketOrder>,
}

/// Mock client that simulates one Binance Futures account.
pub struct MockExchangeClient {
    name: String,
    state: RwLock<MockAccountState>,
    order_id_counter: AtomicU64,
    fail_orders: AtomicBool,
    fail_balance: AtomicBool,
    /// Artificial delay applied to every call
    latency_ms: AtomicU64,
}

impl MockExchangeClient {
    /// Create a mock account holding `usdt` free USDT.
    pub fn new(name: impl Into<String>, usdt: Decimal) -> Self {
        let mut state = MockAccountState::default();
        state.balances.insert("USDT".to_string(), usdt);

        Self {
            name: name.into(),
            state: RwLock::new(state),
            order_id_counter: AtomicU64::new(1),
            fail_orders: AtomicBool::new(false),
            fail_balance: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
        }
    }

    pub async fn set_balance(&self, asset: &str, amount: Decimal) {
        self.state
            .write()
            .await
            .balances
            .insert(asset.to_string(), amount);
    }

    /// Reject every subsequent order.
    pub fn set_fail_orders(&self, fail: bool) {
        self.fail_orders.store(fail, Ordering::SeqCst);
    }

    /// Fail every subsequent balance query.
    pub fn set_fail_balance(&self, fail: bool) {
        self.fail_balance.store(fail, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Orders accepted so far.
    pub async fn orders(&self) -> Vec<MarketOrder> {
        self.state.read().await.orders.clone()
    }

    pub async fn position(&self, symbol: &str, side: PositionSide) -> Decimal {
        self.state
            .read()
            .await
            .positions
            .get(&(symbol.to_string(), side))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    fn next_order_id(&self) -> u64 {
        self.order_id_counter.fetch_add(1, Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait]
impl TradingClient for MockExchangeClient {
    async fn free_balance(&self, asset: &str) -> Result<Decimal> {
        self.simulate_latency().await;
        if self.fail_balance.load(Ordering::SeqCst) {
            bail!("{}: simulated balance failure", self.name);
        }

        match self.state.read().await.balances.get(asset) {
            Some(balance) => Ok(*balance),
            None => bail!("no {} balance", asset),
        }
    }

    async fn place_market_order(&self, order: &MarketOrder) -> Result<OrderResponse> {
        self.simulate_latency().await;
        if self.fail_orders.load(Ordering::SeqCst) {
            bail!("{}: order rejected (-2019 Margin is insufficient.)", self.name);
        }

        let mut state = self.state.write().await;
        let position = state
            .positions
            .entry((order.symbol.clone(), order.position_side))
            .or_insert(Decimal::ZERO);

        // Buying adds to a long and reduces a short; selling the reverse.
        let increases = matches!(
            (order.position_side, order.side),
            (PositionSide::Long, OrderSide::Buy)
                | (PositionSide::Short, OrderSide::Sell)
                | (PositionSide::Both, OrderSide::Buy)
        );
        if increases {
            *position += order.quantity;
        } else {
            *position = (*position - order.quantity).max(Decimal::ZERO);
        }
        state.orders.push(order.clone());

        let order_id = self.next_order_id() as i64;

        info!(
            account = %self.name,
            order_id,
            symbol = %order.symbol,
            side = %order.side,
            position_side = %order.position_side,
            quantity = %order.quantity,
            "Mock futures order executed"
        );

        Ok(OrderResponse {
            order_id,
            symbol: order.symbol.clone(),
            status: OrderStatus::Filled,
            client_order_id: String::new(),
            orig_qty: order.quantity,
            executed_qty: order.quantity,
            side: order.side,
            position_side: order.position_side,
            order_type: OrderType::Market,
            update_time: chrono::Utc::now().timestamp_millis(),
        })
    }

    async fn positions(&self) -> Result<Vec<Position>> {
        self.simulate_latency().await;
        let state = self.state.read().await;
        debug!(account = %self.name, count = state.positions.len(), "Mock positions");

        Ok(state
            .positions
            .iter()
            .map(|((symbol, side), qty)| Position {
                symbol: symbol.clone(),
                position_amt: match side {
                    PositionSide::Short => -*qty,
                    _ => *qty,
                },
                entry_price: Decimal::ZERO,
                mark_price: Decimal::ZERO,
                unrealized_profit: Decimal::ZERO,
                liquidation_price: Decimal::ZERO,
                position_side: *side,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn market(side: OrderSide, position_side: PositionSide, quantity: Decimal) -> MarketOrder {
        MarketOrder {
            symbol: "BTCUSDT".to_string(),
            side,
            position_side,
            quantity,
        }
    }

    #[tokio::test]
    async fn test_mock_order_execution() {
        let client = MockExchangeClient::new("master", dec!(10000));

        let response = client
            .place_market_order(&market(OrderSide::Buy, PositionSide::Long, dec!(0.5)))
            .await
            .unwrap();
        assert_eq!(response.status, OrderStatus::Filled);
        assert_eq!(response.executed_qty, dec!(0.5));
        assert_eq!(client.orders().await.len(), 1);
        assert_eq!(client.position("BTCUSDT", PositionSide::Long).await, dec!(0.5));
    }

    #[tokio::test]
    async fn test_hedge_mode_close_reduces_to_zero() {
        let client = MockExchangeClient::new("master", dec!(10000));
        client
            .place_market_order(&market(OrderSide::Sell, PositionSide::Short, dec!(2)))
            .await
            .unwrap();
        client
            .place_market_order(&market(OrderSide::Buy, PositionSide::Short, dec!(3)))
            .await
            .unwrap();

        assert_eq!(client.position("BTCUSDT", PositionSide::Short).await, Decimal::ZERO);
        let positions = client.positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].position_amt, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let client = MockExchangeClient::new("follower", dec!(500));
        assert_eq!(client.free_balance("USDT").await.unwrap(), dec!(500));
        assert!(client.free_balance("BUSD").await.is_err());

        client.set_fail_balance(true);
        assert!(client.free_balance("USDT").await.is_err());

        client.set_fail_orders(true);
        let err = client
            .place_market_order(&market(OrderSide::Buy, PositionSide::Long, dec!(1)))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rejected"));
        assert!(client.orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_set_balance() {
        let client = MockExchangeClient::new("follower", dec!(500));
        client.set_balance("USDT", dec!(-1)).await;
        let balance = tokio_test::assert_ok!(client.free_balance("USDT").await);
        assert_eq!(balance, dec!(-1));
    }
}
