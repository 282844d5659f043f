//! Configuration management for the copy trader.
//!
//! Loads settings from an optional `config.{toml,json,yaml}` file and
//! `COPY__`-prefixed environment variables.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Master account credentials and connectivity
    #[serde(default)]
    pub binance: BinanceConfig,
    /// Sizing and trimming parameters
    #[serde(default)]
    pub replication: ReplicationConfig,
    /// User-data stream reconnect policy
    #[serde(default)]
    pub stream: StreamConfig,
    /// Position-risk poll
    #[serde(default)]
    pub risk: RiskConfig,
    /// Accounts that mirror the master
    #[serde(default)]
    pub followers: Vec<FollowerConfig>,
    /// Enable debug-level logging for this crate
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceConfig {
    /// API key for authentication
    #[serde(default)]
    pub api_key: String,
    /// Secret key for signing requests
    #[serde(default)]
    pub secret_key: String,
    /// Use testnet instead of production
    #[serde(default)]
    pub testnet: bool,
    /// Optional HTTP proxy for REST and the user-data websocket
    /// (e.g. `http://127.0.0.1:7890`)
    #[serde(default)]
    pub proxy: Option<String>,
    /// `recvWindow` sent with signed requests
    #[serde(default = "default_recv_window_ms")]
    pub recv_window_ms: u64,
}

/// How follower orders for one fill are submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanoutMode {
    /// One follower after another, in configuration order
    Sequential,
    /// All followers at once, joined before the next fill
    Concurrent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Trim master opens whose cost ratio exceeds `trim_ceiling`
    #[serde(default)]
    pub trim_enabled: bool,
    /// Maximum cost ratio (notional / free balance) for a master open
    #[serde(default = "default_trim_ceiling")]
    pub trim_ceiling: Decimal,
    /// Asset whose free balance sizes every account
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,
    #[serde(default = "default_fanout")]
    pub fanout: FanoutMode,
    /// Deadline for each balance fetch or order submission
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Fixed wait after a failed connection attempt
    #[serde(default = "default_connect_retry")]
    pub connect_retry_secs: u64,
    /// Upper bound for the exponential wait after a dropped stream
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
    /// Listen key refresh interval (Binance expires keys after 60 minutes)
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_true")]
    pub poll_enabled: bool,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

/// A follower account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowerConfig {
    /// Name used in logs
    pub id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub secret_key: String,
    /// Weight relative to the master's exposure (1.0 = same cost ratio)
    #[serde(default = "default_proportion")]
    pub proportion: Decimal,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// Default value functions
fn default_recv_window_ms() -> u64 {
    5000
}

fn default_trim_ceiling() -> Decimal {
    Decimal::ONE
}

fn default_quote_asset() -> String {
    "USDT".to_string()
}

fn default_fanout() -> FanoutMode {
    FanoutMode::Sequential
}

fn default_request_timeout() -> u64 {
    10
}

fn default_connect_retry() -> u64 {
    5
}

fn default_max_backoff() -> u64 {
    3600
}

fn default_keepalive_interval() -> u64 {
    30 * 60
}

fn default_poll_interval() -> u64 {
    5
}

fn default_proportion() -> Decimal {
    Decimal::ONE
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .prefix("COPY")
                    .prefix_separator("__"),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.binance.api_key.is_empty() && !self.binance.secret_key.is_empty(),
            "master api_key and secret_key are required"
        );

        anyhow::ensure!(
            !self.replication.trim_enabled || self.replication.trim_ceiling > Decimal::ZERO,
            "trim_ceiling must be positive when trimming is enabled"
        );

        anyhow::ensure!(
            !self.replication.quote_asset.is_empty(),
            "quote_asset must not be empty"
        );

        anyhow::ensure!(
            self.replication.request_timeout_secs > 0
                && self.stream.connect_retry_secs > 0
                && self.stream.max_backoff_secs > 0
                && self.stream.keepalive_interval_secs > 0
                && self.risk.poll_interval_secs > 0,
            "timeouts and intervals must be positive"
        );

        let mut ids = HashSet::new();
        for follower in &self.followers {
            anyhow::ensure!(!follower.id.is_empty(), "follower id must not be empty");
            anyhow::ensure!(
                ids.insert(follower.id.as_str()),
                "duplicate follower id {}",
                follower.id
            );
            anyhow::ensure!(
                follower.proportion > Decimal::ZERO,
                "follower {} proportion must be positive",
                follower.id
            );
            anyhow::ensure!(
                !follower.enabled
                    || (!follower.api_key.is_empty() && !follower.secret_key.is_empty()),
                "follower {} is enabled but has no credentials",
                follower.id
            );
        }

        Ok(())
    }

    /// Followers that take part in replication.
    pub fn enabled_followers(&self) -> impl Iterator<Item = &FollowerConfig> {
        self.followers.iter().filter(|f| f.enabled)
    }
}

impl ReplicationConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            binance: BinanceConfig::default(),
            replication: ReplicationConfig::default(),
            stream: StreamConfig::default(),
            risk: RiskConfig::default(),
            followers: Vec::new(),
            debug: false,
        }
    }
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            testnet: false,
            proxy: None,
            recv_window_ms: default_recv_window_ms(),
        }
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            trim_enabled: false,
            trim_ceiling: default_trim_ceiling(),
            quote_asset: default_quote_asset(),
            fanout: default_fanout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            connect_retry_secs: default_connect_retry(),
            max_backoff_secs: default_max_backoff(),
            keepalive_interval_secs: default_keepalive_interval(),
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            poll_enabled: true,
            poll_interval_secs: default_poll_interval(),
        }
    }
}
