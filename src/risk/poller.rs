//! Periodic position-risk poll on the master account.

use crate::config::RiskConfig;
use crate::exchange::{Position, TradingClient};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

/// Fetches the master's positions on a fixed interval and logs the open
/// ones. Observes only; it never places orders.
pub struct PositionRiskPoller {
    client: Arc<dyn TradingClient>,
    interval: Duration,
}

impl PositionRiskPoller {
    pub fn new(client: Arc<dyn TradingClient>, interval: Duration) -> Self {
        Self { client, interval }
    }

    pub fn from_config(client: Arc<dyn TradingClient>, config: &RiskConfig) -> Self {
        Self::new(client, Duration::from_secs(config.poll_interval_secs))
    }

    /// One poll. Returns the non-flat positions.
    pub async fn poll_once(&self) -> Result<Vec<Position>> {
        let open: Vec<Position> = self
            .client
            .positions()
            .await?
            .into_iter()
            .filter(|p| !p.position_amt.is_zero())
            .collect();

        for p in &open {
            debug!(
                symbol = %p.symbol,
                position_side = %p.position_side,
                amount = %p.position_amt,
                entry_price = %p.entry_price,
                mark_price = %p.mark_price,
                unrealized_profit = %p.unrealized_profit,
                liquidation_price = %p.liquidation_price,
                "Master position"
            );
        }

        Ok(open)
    }

    /// Poll until `shutdown` turns true. Failed polls are logged and retried
    /// on the next tick.
    #[instrument(name = "position_risk", skip_all)]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.poll_once().await {
                warn!(error = %e, "Position risk poll failed");
            }
        }

        info!("Position risk poll stopped");
    }
}

async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{
        MarketOrder, MockExchangeClient, MockTradingClient, OrderSide, PositionSide,
    };
    use anyhow::anyhow;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_poll_reports_open_positions_only() {
        let master = Arc::new(MockExchangeClient::new("master", dec!(10000)));
        for (side, position_side, qty) in [
            (OrderSide::Buy, PositionSide::Long, dec!(0.5)),
            (OrderSide::Sell, PositionSide::Short, dec!(1)),
            (OrderSide::Buy, PositionSide::Short, dec!(1)),
        ] {
            master
                .place_market_order(&MarketOrder {
                    symbol: "BTCUSDT".into(),
                    side,
                    position_side,
                    quantity: qty,
                })
                .await
                .unwrap();
        }

        let poller = PositionRiskPoller::new(master, Duration::from_secs(5));
        let open = poller.poll_once().await.unwrap();

        assert_eq!(open.len(), 1);
        assert_eq!(open[0].position_side, PositionSide::Long);
        assert_eq!(open[0].position_amt, dec!(0.5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_polls_do_not_stop_the_loop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut client = MockTradingClient::new();
        client.expect_positions().returning(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("-1021 Timestamp for this request is outside of the recvWindow"))
        });

        let poller = PositionRiskPoller::new(Arc::new(client), Duration::from_secs(5));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(poller.run(shutdown_rx));

        // Ticks at 0s, 5s and 10s
        tokio::time::sleep(Duration::from_secs(12)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
