//! Error taxonomy for the replication pipeline.
//!
//! Variants map onto how the dispatcher reacts:
//! - fill-level problems (`InvalidInput`, `InvalidFill`, `UnknownSymbol`) skip the fill
//! - `NoFunds` skips the account it was raised for
//! - `Submission` / `Timeout` are logged per account and never abort a fan-out

use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while turning a fill into follower orders.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// A fill carried a value outside the accepted domain (e.g. an unknown side).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Exchange granularity (tick or step) was non-numeric, zero or negative.
    #[error("invalid granularity {granularity:?}")]
    InvalidGranularity { granularity: String },

    /// Numeric fields of a fill could not be parsed or used.
    #[error("invalid fill field {field}: {value:?}")]
    InvalidFill { field: &'static str, value: String },

    /// Account free balance is zero or negative.
    #[error("no funds available for {account} (free balance {balance})")]
    NoFunds { account: String, balance: Decimal },

    /// No trading rule loaded for the symbol.
    #[error("no trading rule for symbol {0}")]
    UnknownSymbol(String),

    /// The exchange rejected the request or the network call failed.
    #[error("{account}: {source}")]
    Submission {
        account: String,
        #[source]
        source: anyhow::Error,
    },

    /// An exchange call did not complete within its deadline.
    #[error("{account}: {operation} timed out after {timeout:?}")]
    Timeout {
        account: String,
        operation: &'static str,
        timeout: Duration,
    },
}

impl ReplicationError {
    /// Whether this error concerns the whole fill rather than a single account.
    pub fn is_fill_level(&self) -> bool {
        matches!(
            self,
            ReplicationError::InvalidInput(_)
                | ReplicationError::InvalidFill { .. }
                | ReplicationError::UnknownSymbol(_)
                | ReplicationError::InvalidGranularity { .. }
        )
    }
}

pub type ReplicationResult<T> = std::result::Result<T, ReplicationError>;
