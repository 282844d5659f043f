//! Long-lived user-data stream handling.
//!
//! The exchange-specific socket lives behind [`UserStreamConnector`] and
//! [`UserStreamSession`]; [`StreamSessionManager`] owns reconnects and hands
//! every decoded fill to a [`FillSink`].

mod backoff;
mod session;

pub use backoff::ReconnectPolicy;
pub use session::{SessionState, SessionStats, StreamSessionManager};

use crate::replication::FillEvent;
use async_trait::async_trait;
use thiserror::Error;

/// Why a listening session ended.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("listen key expired")]
    ListenKeyExpired,

    #[error("stream closed by server")]
    Closed,
}

/// A decoded user-data message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserDataEvent {
    OrderUpdate(FillEvent),
    ListenKeyExpired,
    /// Anything the replicator does not act on
    Other,
}

/// An established user-data connection.
#[async_trait]
pub trait UserStreamSession: Send {
    /// Next decoded event. An error ends the session.
    async fn next_event(&mut self) -> Result<UserDataEvent, StreamError>;
}

/// Opens user-data sessions.
#[async_trait]
pub trait UserStreamConnector: Send + Sync {
    async fn connect(&self) -> anyhow::Result<Box<dyn UserStreamSession>>;
}

/// Receives fills in arrival order. Each call completes before the next fill
/// is read from the stream.
#[async_trait]
pub trait FillSink: Send + Sync {
    async fn on_fill(&self, fill: FillEvent);
}
