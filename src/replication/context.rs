//! Immutable state shared by the stream manager and the dispatcher.

use crate::config::{Config, FanoutMode};
use crate::exchange::TradingClient;
use crate::replication::rules::SymbolRules;
use crate::replication::sizing::TrimPolicy;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

/// A follower account and the client that trades it.
#[derive(Clone)]
pub struct FollowerAccount {
    pub id: String,
    /// Weight relative to the master's cost ratio
    pub proportion: Decimal,
    pub enabled: bool,
    pub client: Arc<dyn TradingClient>,
}

impl std::fmt::Debug for FollowerAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FollowerAccount")
            .field("id", &self.id)
            .field("proportion", &self.proportion)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Everything replication needs, built once at startup.
pub struct ReplicationContext {
    pub master: Arc<dyn TradingClient>,
    pub followers: Vec<FollowerAccount>,
    pub rules: SymbolRules,
    pub trim: TrimPolicy,
    pub quote_asset: String,
    pub fanout: FanoutMode,
    /// Deadline for each balance fetch or order submission
    pub call_timeout: Duration,
}

impl ReplicationContext {
    /// Assemble a context from configuration and ready-made clients.
    ///
    /// `followers` pairs each enabled follower config with its client, in
    /// configuration order.
    pub fn from_config(
        config: &Config,
        master: Arc<dyn TradingClient>,
        followers: Vec<(crate::config::FollowerConfig, Arc<dyn TradingClient>)>,
        rules: SymbolRules,
    ) -> Self {
        let followers = followers
            .into_iter()
            .map(|(cfg, client)| FollowerAccount {
                id: cfg.id,
                proportion: cfg.proportion,
                enabled: cfg.enabled,
                client,
            })
            .collect();

        Self {
            master,
            followers,
            rules,
            trim: TrimPolicy {
                enabled: config.replication.trim_enabled,
                ceiling: config.replication.trim_ceiling,
            },
            quote_asset: config.replication.quote_asset.clone(),
            fanout: config.replication.fanout,
            call_timeout: config.replication.request_timeout(),
        }
    }

    pub fn enabled_followers(&self) -> impl Iterator<Item = &FollowerAccount> {
        self.followers.iter().filter(|f| f.enabled)
    }
}
