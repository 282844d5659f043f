//! Fan-out of master fills to follower accounts.
//!
//! One fill is handled start to finish before the next: master sizing, the
//! optional trim order on the master, then one order per enabled follower.
//! Follower failures are isolated; a rejected or timed-out follower never
//! stops the others.

use crate::config::FanoutMode;
use crate::error::{ReplicationError, ReplicationResult};
use crate::exchange::{MarketOrder, OrderResponse, TradingClient};
use crate::replication::action::{classify, TradeAction};
use crate::replication::context::{FollowerAccount, ReplicationContext};
use crate::replication::fill::FillEvent;
use crate::replication::rules::SymbolTradingRule;
use crate::replication::sizing::{MasterSizing, SizingEngine, TrimOrder};
use crate::stream::FillSink;
use async_trait::async_trait;
use futures_util::future::join_all;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const MASTER: &str = "master";

/// Result of the master trim order.
#[derive(Debug)]
pub enum TrimOutcome {
    Submitted { order_id: i64, quantity: Decimal },
    Failed { quantity: Decimal, error: ReplicationError },
}

/// Result of replicating one fill to one follower.
#[derive(Debug)]
pub enum FollowerOutcome {
    Submitted { order_id: i64, quantity: Decimal },
    /// Rounded quantity was zero
    SkippedZeroQuantity,
    SkippedNoFunds { balance: Decimal },
    Failed(ReplicationError),
}

impl FollowerOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, FollowerOutcome::Submitted { .. })
    }
}

#[derive(Debug)]
pub struct FollowerReport {
    pub id: String,
    pub outcome: FollowerOutcome,
}

/// Everything that happened for one replicated fill.
#[derive(Debug)]
pub struct DispatchReport {
    pub symbol: String,
    pub action: TradeAction,
    pub cost_ratio: Decimal,
    pub propagated_ratio: Decimal,
    pub trim: Option<TrimOutcome>,
    pub followers: Vec<FollowerReport>,
}

impl DispatchReport {
    pub fn submitted_count(&self) -> usize {
        self.followers
            .iter()
            .filter(|f| f.outcome.is_submitted())
            .count()
    }

    pub fn follower(&self, id: &str) -> Option<&FollowerOutcome> {
        self.followers
            .iter()
            .find(|f| f.id == id)
            .map(|f| &f.outcome)
    }
}

/// What became of a fill notification.
#[derive(Debug)]
pub enum FillOutcome {
    /// Not a completed trade
    Ignored,
    /// Nothing was replicated (bad input, unknown symbol, master unusable)
    Skipped(ReplicationError),
    Dispatched(DispatchReport),
}

/// Replicates master fills onto followers.
pub struct FanOutDispatcher {
    ctx: Arc<ReplicationContext>,
    sizing: SizingEngine,
}

impl FanOutDispatcher {
    pub fn new(ctx: Arc<ReplicationContext>) -> Self {
        let sizing = SizingEngine::new(ctx.trim);
        Self { ctx, sizing }
    }

    /// Classify, size and replicate one fill notification.
    pub async fn process_fill(&self, fill: &FillEvent) -> FillOutcome {
        if !fill.is_completed_trade() {
            debug!(
                symbol = %fill.symbol,
                execution_type = %fill.execution_type,
                order_status = %fill.order_status,
                "Ignoring non-fill order update"
            );
            return FillOutcome::Ignored;
        }

        debug!(?fill, "Master fill received");

        let (action, master, rule) = match self.size_master(fill).await {
            Ok(sized) => sized,
            Err(e) => return FillOutcome::Skipped(e),
        };

        FillOutcome::Dispatched(self.dispatch(fill, action, &master, rule).await)
    }

    /// Classify the fill and size it against the master's free balance.
    async fn size_master(
        &self,
        fill: &FillEvent,
    ) -> ReplicationResult<(TradeAction, MasterSizing, &SymbolTradingRule)> {
        let action = classify(&fill.side, fill.reduce_only)?;
        let rule = self.ctx.rules.get(&fill.symbol)?;
        // Reject malformed numbers before any account is queried.
        fill.quantity_and_price()?;

        let balance = self
            .with_deadline(
                MASTER,
                "balance fetch",
                self.ctx.master.free_balance(&self.ctx.quote_asset),
            )
            .await?;

        let master = self
            .sizing
            .size_master(MASTER, fill, action, balance, rule)?;

        debug!(
            symbol = %fill.symbol,
            %action,
            free_balance = %balance,
            cost_ratio = %master.cost_ratio,
            fill_price = %master.fill_price,
            filled_quantity = %master.filled_quantity,
            "Master sized"
        );

        Ok((action, master, rule))
    }

    /// Submit the trim order (if any), then replicate to every enabled follower.
    pub async fn dispatch(
        &self,
        fill: &FillEvent,
        action: TradeAction,
        master: &MasterSizing,
        rule: &SymbolTradingRule,
    ) -> DispatchReport {
        let trim = match &master.trim {
            Some(trim) => Some(self.submit_trim(&fill.symbol, trim).await),
            None => None,
        };

        let enabled: Vec<&FollowerAccount> = self.ctx.enabled_followers().collect();
        let outcomes = match self.ctx.fanout {
            FanoutMode::Sequential => {
                let mut outcomes = Vec::with_capacity(enabled.len());
                for follower in &enabled {
                    outcomes.push(
                        self.replicate_to(follower, fill, action, master, rule)
                            .await,
                    );
                }
                outcomes
            }
            FanoutMode::Concurrent => {
                join_all(
                    enabled
                        .iter()
                        .map(|follower| self.replicate_to(follower, fill, action, master, rule)),
                )
                .await
            }
        };

        let followers: Vec<FollowerReport> = enabled
            .iter()
            .zip(outcomes)
            .map(|(follower, outcome)| FollowerReport {
                id: follower.id.clone(),
                outcome,
            })
            .collect();

        let report = DispatchReport {
            symbol: fill.symbol.clone(),
            action,
            cost_ratio: master.cost_ratio,
            propagated_ratio: master.propagated_ratio,
            trim,
            followers,
        };

        info!(
            symbol = %report.symbol,
            action = %report.action,
            cost_ratio = %report.cost_ratio,
            propagated_ratio = %report.propagated_ratio,
            trimmed = report.trim.is_some(),
            submitted = report.submitted_count(),
            followers = report.followers.len(),
            "Fill replicated"
        );

        report
    }

    async fn submit_trim(&self, symbol: &str, trim: &TrimOrder) -> TrimOutcome {
        let order = MarketOrder {
            symbol: symbol.to_string(),
            side: trim.side,
            position_side: trim.position_side,
            quantity: trim.quantity,
        };

        match self.submit(MASTER, self.ctx.master.as_ref(), &order).await {
            Ok(response) => {
                info!(
                    %symbol,
                    side = %trim.side,
                    position_side = %trim.position_side,
                    quantity = %trim.quantity,
                    order_id = response.order_id,
                    "Master trimmed to ceiling"
                );
                TrimOutcome::Submitted {
                    order_id: response.order_id,
                    quantity: trim.quantity,
                }
            }
            Err(e) => {
                error!(%symbol, quantity = %trim.quantity, error = %e, "Master trim order failed");
                TrimOutcome::Failed {
                    quantity: trim.quantity,
                    error: e,
                }
            }
        }
    }

    async fn replicate_to(
        &self,
        follower: &FollowerAccount,
        fill: &FillEvent,
        action: TradeAction,
        master: &MasterSizing,
        rule: &SymbolTradingRule,
    ) -> FollowerOutcome {
        let balance = match self
            .with_deadline(
                &follower.id,
                "balance fetch",
                follower.client.free_balance(&self.ctx.quote_asset),
            )
            .await
        {
            Ok(balance) => balance,
            Err(e) => {
                warn!(follower = %follower.id, error = %e, "Follower balance unavailable");
                return FollowerOutcome::Failed(e);
            }
        };

        let sizing = match self.sizing.size_follower(
            &follower.id,
            master.propagated_ratio,
            follower.proportion,
            master.fill_price,
            balance,
            rule,
        ) {
            Ok(sizing) => sizing,
            Err(ReplicationError::NoFunds { balance, .. }) => {
                warn!(follower = %follower.id, %balance, "Follower has no free balance, skipping");
                return FollowerOutcome::SkippedNoFunds { balance };
            }
            Err(e) => {
                warn!(follower = %follower.id, error = %e, "Follower sizing failed");
                return FollowerOutcome::Failed(e);
            }
        };

        debug!(
            follower = %follower.id,
            symbol = %fill.symbol,
            %action,
            free_balance = %balance,
            cost_ratio = %sizing.cost_ratio,
            quantity = %sizing.quantity,
            price = %master.fill_price,
            "Follower sized"
        );

        if sizing.quantity.is_zero() {
            debug!(follower = %follower.id, "Rounded quantity is zero, nothing to submit");
            return FollowerOutcome::SkippedZeroQuantity;
        }

        let order = MarketOrder {
            symbol: fill.symbol.clone(),
            side: action.order_side(),
            position_side: action.position_side(),
            quantity: sizing.quantity,
        };

        match self
            .submit(&follower.id, follower.client.as_ref(), &order)
            .await
        {
            Ok(response) => {
                info!(
                    follower = %follower.id,
                    symbol = %order.symbol,
                    side = %order.side,
                    position_side = %order.position_side,
                    quantity = %order.quantity,
                    order_id = response.order_id,
                    "Follower order placed"
                );
                FollowerOutcome::Submitted {
                    order_id: response.order_id,
                    quantity: order.quantity,
                }
            }
            Err(e) => {
                warn!(follower = %follower.id, symbol = %order.symbol, error = %e, "Follower order failed");
                FollowerOutcome::Failed(e)
            }
        }
    }

    async fn submit(
        &self,
        account: &str,
        client: &dyn TradingClient,
        order: &MarketOrder,
    ) -> ReplicationResult<OrderResponse> {
        self.with_deadline(account, "order submission", client.place_market_order(order))
            .await
    }

    /// Run an exchange call under the per-call deadline.
    async fn with_deadline<T>(
        &self,
        account: &str,
        operation: &'static str,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> ReplicationResult<T> {
        match tokio::time::timeout(self.ctx.call_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(ReplicationError::Submission {
                account: account.to_string(),
                source,
            }),
            Err(_) => Err(ReplicationError::Timeout {
                account: account.to_string(),
                operation,
                timeout: self.ctx.call_timeout,
            }),
        }
    }
}

#[async_trait]
impl FillSink for FanOutDispatcher {
    async fn on_fill(&self, fill: FillEvent) {
        match self.process_fill(&fill).await {
            FillOutcome::Ignored | FillOutcome::Dispatched(_) => {}
            FillOutcome::Skipped(e @ ReplicationError::NoFunds { .. }) => {
                warn!(symbol = %fill.symbol, error = %e, "Master has no free balance, fill not replicated");
            }
            FillOutcome::Skipped(e) if e.is_fill_level() => {
                warn!(symbol = %fill.symbol, order_id = fill.order_id, error = %e, "Fill skipped");
            }
            FillOutcome::Skipped(e) => {
                error!(symbol = %fill.symbol, order_id = fill.order_id, error = %e, "Fill not replicated");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{MockExchangeClient, MockTradingClient, OrderSide, OrderStatus, OrderType, PositionSide};
    use crate::replication::fill::test_fill;
    use crate::replication::rules::{SymbolRules, SymbolTradingRule};
    use crate::replication::sizing::TrimPolicy;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    struct Harness {
        master: Arc<MockExchangeClient>,
        followers: Vec<Arc<MockExchangeClient>>,
        dispatcher: FanOutDispatcher,
    }

    fn rules() -> SymbolRules {
        [SymbolTradingRule::new("BTCUSDT", "0.10", "0.001")]
            .into_iter()
            .collect()
    }

    fn follower(id: &str, proportion: Decimal, client: Arc<dyn TradingClient>) -> FollowerAccount {
        FollowerAccount {
            id: id.to_string(),
            proportion,
            enabled: true,
            client,
        }
    }

    fn context(
        master: Arc<dyn TradingClient>,
        followers: Vec<FollowerAccount>,
        trim: TrimPolicy,
        fanout: FanoutMode,
    ) -> ReplicationContext {
        ReplicationContext {
            master,
            followers,
            rules: rules(),
            trim,
            quote_asset: "USDT".to_string(),
            fanout,
            call_timeout: Duration::from_millis(200),
        }
    }

    /// Master with 40000 USDT; followers `(id, proportion, balance)`.
    fn harness(followers: &[(&str, Decimal, Decimal)], trim: TrimPolicy, fanout: FanoutMode) -> Harness {
        let master = Arc::new(MockExchangeClient::new(MASTER, dec!(40000)));
        let clients: Vec<Arc<MockExchangeClient>> = followers
            .iter()
            .map(|(id, _, balance)| Arc::new(MockExchangeClient::new(*id, *balance)))
            .collect();
        let accounts = followers
            .iter()
            .zip(&clients)
            .map(|((id, proportion, _), client)| follower(id, *proportion, client.clone()))
            .collect();

        let ctx = context(master.clone(), accounts, trim, fanout);
        Harness {
            master,
            followers: clients,
            dispatcher: FanOutDispatcher::new(Arc::new(ctx)),
        }
    }

    fn trim_at(ceiling: Decimal) -> TrimPolicy {
        TrimPolicy {
            enabled: true,
            ceiling,
        }
    }

    fn dispatched(outcome: FillOutcome) -> DispatchReport {
        match outcome {
            FillOutcome::Dispatched(report) => report,
            other => panic!("expected dispatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_untrimmed_fill_sizes_follower_from_own_balance() {
        let h = harness(
            &[("alice", dec!(0.5), dec!(20000))],
            TrimPolicy::disabled(),
            FanoutMode::Sequential,
        );
        let fill = test_fill("BUY", false, "1.0", "50000");

        let report = dispatched(h.dispatcher.process_fill(&fill).await);
        assert_eq!(report.action, TradeAction::OpenLong);
        assert_eq!(report.cost_ratio, dec!(1.25));
        assert_eq!(report.propagated_ratio, dec!(1.25));
        assert!(report.trim.is_none());
        assert!(h.master.orders().await.is_empty());

        let orders = h.followers[0].orders().await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, OrderSide::Buy);
        assert_eq!(orders[0].position_side, PositionSide::Long);
        assert_eq!(orders[0].quantity_literal(), "0.250");
    }

    #[tokio::test]
    async fn test_trim_is_submitted_before_followers_use_ceiling() {
        let h = harness(
            &[("alice", dec!(0.5), dec!(20000))],
            trim_at(dec!(1.0)),
            FanoutMode::Sequential,
        );
        let fill = test_fill("BUY", false, "1.0", "50000");

        let report = dispatched(h.dispatcher.process_fill(&fill).await);
        assert_eq!(report.propagated_ratio, dec!(1.0));
        assert!(matches!(report.trim, Some(TrimOutcome::Submitted { .. })));

        let master_orders = h.master.orders().await;
        assert_eq!(master_orders.len(), 1);
        assert_eq!(master_orders[0].side, OrderSide::Sell);
        assert_eq!(master_orders[0].position_side, PositionSide::Long);
        assert_eq!(master_orders[0].quantity_literal(), "0.200");

        let orders = h.followers[0].orders().await;
        assert_eq!(orders[0].quantity_literal(), "0.200");
    }

    #[tokio::test]
    async fn test_close_mirrors_with_opposite_side_and_no_trim() {
        let h = harness(
            &[("alice", dec!(1), dec!(20000))],
            trim_at(dec!(0.1)),
            FanoutMode::Sequential,
        );
        let fill = test_fill("SELL", true, "1.0", "50000");

        let report = dispatched(h.dispatcher.process_fill(&fill).await);
        assert_eq!(report.action, TradeAction::CloseLong);
        assert!(report.trim.is_none());
        assert!(h.master.orders().await.is_empty());

        let orders = h.followers[0].orders().await;
        assert_eq!(orders[0].side, OrderSide::Sell);
        assert_eq!(orders[0].position_side, PositionSide::Long);
        // 20000 * 1.25 / 50000
        assert_eq!(orders[0].quantity_literal(), "0.500");
    }

    #[tokio::test]
    async fn test_broke_follower_does_not_stop_others() {
        let h = harness(
            &[
                ("alice", dec!(1), dec!(0)),
                ("bob", dec!(1), dec!(8000)),
                ("carol", dec!(1), dec!(-10)),
                ("dave", dec!(2), dec!(4000)),
            ],
            TrimPolicy::disabled(),
            FanoutMode::Sequential,
        );
        let fill = test_fill("SELL", false, "0.8", "50000");

        let report = dispatched(h.dispatcher.process_fill(&fill).await);
        assert!(matches!(
            report.follower("alice"),
            Some(FollowerOutcome::SkippedNoFunds { .. })
        ));
        assert!(matches!(
            report.follower("carol"),
            Some(FollowerOutcome::SkippedNoFunds { .. })
        ));
        assert_eq!(report.submitted_count(), 2);

        // ratio = 0.8 * 50000 / 40000 = 1.0
        assert_eq!(h.followers[1].orders().await[0].quantity_literal(), "0.160");
        assert_eq!(h.followers[3].orders().await[0].quantity_literal(), "0.160");
        assert_eq!(h.followers[3].orders().await[0].side, OrderSide::Sell);
        assert_eq!(h.followers[3].orders().await[0].position_side, PositionSide::Short);
    }

    #[tokio::test]
    async fn test_rejected_follower_does_not_stop_others() {
        for fanout in [FanoutMode::Sequential, FanoutMode::Concurrent] {
            let h = harness(
                &[
                    ("alice", dec!(1), dec!(10000)),
                    ("bob", dec!(1), dec!(10000)),
                    ("carol", dec!(1), dec!(10000)),
                ],
                TrimPolicy::disabled(),
                fanout,
            );
            h.followers[0].set_fail_orders(true);
            h.followers[1].set_fail_balance(true);

            let fill = test_fill("BUY", false, "1.0", "50000");
            let report = dispatched(h.dispatcher.process_fill(&fill).await);

            assert!(matches!(
                report.follower("alice"),
                Some(FollowerOutcome::Failed(ReplicationError::Submission { .. }))
            ));
            assert!(matches!(
                report.follower("bob"),
                Some(FollowerOutcome::Failed(_))
            ));
            assert!(report.follower("carol").unwrap().is_submitted(), "{fanout:?}");
            assert_eq!(h.followers[2].orders().await.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_slow_follower_times_out_in_isolation() {
        let h = harness(
            &[("slow", dec!(1), dec!(10000)), ("fast", dec!(1), dec!(10000))],
            TrimPolicy::disabled(),
            FanoutMode::Concurrent,
        );
        h.followers[0].set_latency(Duration::from_secs(5));

        let fill = test_fill("BUY", false, "1.0", "50000");
        let report = dispatched(h.dispatcher.process_fill(&fill).await);

        let Some(FollowerOutcome::Failed(err @ ReplicationError::Timeout { .. })) =
            report.follower("slow")
        else {
            panic!("expected timeout, got {:?}", report.follower("slow"));
        };
        assert!(err.to_string().ends_with("timed out after 200ms"), "{err}");
        assert!(report.follower("fast").unwrap().is_submitted());
        // Report order follows configuration order.
        assert_eq!(report.followers[0].id, "slow");
    }

    #[tokio::test]
    async fn test_zero_quantity_is_not_submitted() {
        let h = harness(
            &[("tiny", dec!(1), dec!(10))],
            TrimPolicy::disabled(),
            FanoutMode::Sequential,
        );
        let fill = test_fill("BUY", false, "0.001", "50000");

        let report = dispatched(h.dispatcher.process_fill(&fill).await);
        assert!(matches!(
            report.follower("tiny"),
            Some(FollowerOutcome::SkippedZeroQuantity)
        ));
        assert!(h.followers[0].orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_follower_is_skipped() {
        let master = Arc::new(MockExchangeClient::new(MASTER, dec!(40000)));
        let off = Arc::new(MockExchangeClient::new("off", dec!(10000)));
        let mut account = follower("off", dec!(1), off.clone());
        account.enabled = false;

        let ctx = context(master, vec![account], TrimPolicy::disabled(), FanoutMode::Sequential);
        let dispatcher = FanOutDispatcher::new(Arc::new(ctx));

        let report = dispatched(
            dispatcher
                .process_fill(&test_fill("BUY", false, "1.0", "50000"))
                .await,
        );
        assert!(report.followers.is_empty());
        assert!(off.orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_non_trade_updates_are_ignored() {
        let h = harness(&[("alice", dec!(1), dec!(10000))], TrimPolicy::disabled(), FanoutMode::Sequential);
        let mut fill = test_fill("BUY", false, "1.0", "50000");
        fill.order_status = "PARTIALLY_FILLED".into();

        assert!(matches!(h.dispatcher.process_fill(&fill).await, FillOutcome::Ignored));
        assert!(h.followers[0].orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_fill_level_errors_skip_without_touching_accounts() {
        let h = harness(&[("alice", dec!(1), dec!(10000))], TrimPolicy::disabled(), FanoutMode::Sequential);
        // A failing master balance would surface as Submission, not the errors below.
        h.master.set_fail_balance(true);

        let bad_side = test_fill("HOLD", false, "1.0", "50000");
        assert!(matches!(
            h.dispatcher.process_fill(&bad_side).await,
            FillOutcome::Skipped(ReplicationError::InvalidInput(_))
        ));

        let bad_qty = test_fill("BUY", false, "1.0.0", "50000");
        assert!(matches!(
            h.dispatcher.process_fill(&bad_qty).await,
            FillOutcome::Skipped(ReplicationError::InvalidFill { .. })
        ));

        let mut unknown = test_fill("BUY", false, "1.0", "50000");
        unknown.symbol = "FOOUSDT".into();
        assert!(matches!(
            h.dispatcher.process_fill(&unknown).await,
            FillOutcome::Skipped(ReplicationError::UnknownSymbol(_))
        ));

        assert!(h.followers[0].orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_master_without_funds_skips_event() {
        let h = harness(&[("alice", dec!(1), dec!(10000))], TrimPolicy::disabled(), FanoutMode::Sequential);
        h.master.set_balance("USDT", dec!(0)).await;

        let outcome = h
            .dispatcher
            .process_fill(&test_fill("BUY", false, "1.0", "50000"))
            .await;
        assert!(matches!(outcome, FillOutcome::Skipped(ReplicationError::NoFunds { .. })));
        assert!(h.followers[0].orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_trim_still_caps_followers() {
        let h = harness(&[("alice", dec!(0.5), dec!(20000))], trim_at(dec!(1.0)), FanoutMode::Sequential);
        h.master.set_fail_orders(true);

        let report = dispatched(
            h.dispatcher
                .process_fill(&test_fill("BUY", false, "1.0", "50000"))
                .await,
        );
        assert!(matches!(report.trim, Some(TrimOutcome::Failed { .. })));
        assert_eq!(report.propagated_ratio, dec!(1.0));
        assert_eq!(h.followers[0].orders().await[0].quantity_literal(), "0.200");
    }

    #[tokio::test]
    async fn test_order_shape_with_mocked_client() {
        let mut master = MockTradingClient::new();
        master
            .expect_free_balance()
            .returning(|_| Ok(dec!(40000)));
        master.expect_place_market_order().never();

        let mut follower_client = MockTradingClient::new();
        follower_client
            .expect_free_balance()
            .times(1)
            .returning(|_| Ok(dec!(20000)));
        follower_client
            .expect_place_market_order()
            .withf(|order| {
                order.symbol == "BTCUSDT"
                    && order.side == OrderSide::Buy
                    && order.position_side == PositionSide::Short
                    && order.quantity_literal() == "0.500"
            })
            .times(1)
            .returning(|order| {
                Ok(OrderResponse {
                    order_id: 42,
                    symbol: order.symbol.clone(),
                    status: OrderStatus::New,
                    client_order_id: String::new(),
                    orig_qty: order.quantity,
                    executed_qty: Decimal::ZERO,
                    side: order.side,
                    position_side: order.position_side,
                    order_type: OrderType::Market,
                    update_time: 0,
                })
            });

        let ctx = context(
            Arc::new(master),
            vec![follower("mocked", dec!(1), Arc::new(follower_client))],
            trim_at(dec!(0.5)),
            FanoutMode::Sequential,
        );
        let dispatcher = FanOutDispatcher::new(Arc::new(ctx));

        let report = dispatched(
            dispatcher
                .process_fill(&test_fill("BUY", true, "1.0", "50000"))
                .await,
        );
        assert_eq!(report.action, TradeAction::CloseShort);
        assert!(matches!(
            report.follower("mocked"),
            Some(FollowerOutcome::Submitted { order_id: 42, .. })
        ));
    }
}
