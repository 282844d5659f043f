//! User-data stream session manager.

use super::{FillSink, ReconnectPolicy, StreamError, UserDataEvent, UserStreamConnector};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// Connection state of the user-data stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Listening,
}

/// Counters reported when the manager stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub connects: u64,
    pub connect_failures: u64,
    pub stream_errors: u64,
    pub fills: u64,
}

/// Keeps a user-data session open and feeds fills to the sink one at a time.
pub struct StreamSessionManager {
    connector: Arc<dyn UserStreamConnector>,
    sink: Arc<dyn FillSink>,
    policy: ReconnectPolicy,
    state: watch::Sender<SessionState>,
}

impl StreamSessionManager {
    pub fn new(
        connector: Arc<dyn UserStreamConnector>,
        sink: Arc<dyn FillSink>,
        policy: ReconnectPolicy,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            connector,
            sink,
            policy,
            state,
        }
    }

    /// Watch the connection state.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Run until `shutdown` turns true (or its sender is dropped).
    ///
    /// Shutdown interrupts connecting, waiting and reading, but a fill
    /// already handed to the sink is always processed to completion.
    #[instrument(name = "user_stream", skip_all)]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SessionStats {
        let mut stats = SessionStats::default();

        'connect: loop {
            self.state.send_replace(SessionState::Connecting);
            debug!("Opening user data stream");

            let connected = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break 'connect,
                result = self.connector.connect() => result,
            };

            let mut session = match connected {
                Ok(session) => session,
                Err(e) => {
                    stats.connect_failures += 1;
                    self.state.send_replace(SessionState::Disconnected);
                    let wait = self.policy.on_connect_failure();
                    warn!(error = %e, wait_secs = wait.as_secs_f64(), "User stream connect failed, retrying");
                    if !sleep_unless_shutdown(wait, &mut shutdown).await {
                        break 'connect;
                    }
                    continue 'connect;
                }
            };

            stats.connects += 1;
            self.state.send_replace(SessionState::Listening);
            info!("Listening for master fills");

            let mut healthy = false;
            let ended: StreamError = loop {
                let event = tokio::select! {
                    biased;
                    _ = shutdown_requested(&mut shutdown) => break 'connect,
                    event = session.next_event() => event,
                };

                if !healthy && matches!(event, Ok(UserDataEvent::OrderUpdate(_) | UserDataEvent::Other)) {
                    healthy = true;
                    self.policy.reset();
                }

                match event {
                    Ok(UserDataEvent::OrderUpdate(fill)) => {
                        stats.fills += 1;
                        // Not raced against shutdown: in-flight orders finish.
                        self.sink.on_fill(fill).await;
                    }
                    Ok(UserDataEvent::ListenKeyExpired) => break StreamError::ListenKeyExpired,
                    Ok(UserDataEvent::Other) => {}
                    Err(e) => break e,
                }
            };
            drop(session);

            stats.stream_errors += 1;
            self.state.send_replace(SessionState::Disconnected);
            let wait = self.policy.on_stream_error();
            warn!(
                error = %ended,
                retry_count = self.policy.retry_count(),
                wait_secs = wait.as_secs_f64(),
                "User stream dropped, reconnecting"
            );

            if !sleep_unless_shutdown(wait, &mut shutdown).await {
                break 'connect;
            }
        }

        self.state.send_replace(SessionState::Disconnected);
        info!(
            connects = stats.connects,
            connect_failures = stats.connect_failures,
            stream_errors = stats.stream_errors,
            fills = stats.fills,
            "User stream stopped"
        );
        stats
    }
}

/// Resolves once shutdown is requested or the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Returns `false` if shutdown arrived before `wait` elapsed.
async fn sleep_unless_shutdown(wait: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        biased;
        _ = shutdown_requested(shutdown) => false,
        _ = tokio::time::sleep(wait) => true,
    }
}
