//! # Futures Copy Trader
//!
//! Mirrors fills on a master Binance Futures account onto follower accounts,
//! sized by each follower's free balance.
//!
//! ## Architecture
//!
//! - `config`: Configuration loading and validation
//! - `exchange`: Binance REST client, user-data stream, and a mock account
//! - `stream`: User-data session lifecycle and reconnect backoff
//! - `replication`: Fill classification, sizing, trimming, and fan-out
//! - `risk`: Position-risk polling of the master account
//! - `error`: Replication error taxonomy
//! - `utils`: Decimal granularity helpers

pub mod config;
pub mod error;
pub mod exchange;
pub mod replication;
pub mod risk;
pub mod stream;
pub mod utils;

pub use config::Config;
pub use error::{ReplicationError, ReplicationResult};
