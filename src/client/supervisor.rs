//! Client connection lifecycle: open, heartbeat watch, bounded reconnect.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Result;

/// Supervisor lifecycle as observed through [`ReconnectSupervisor::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Not running, or stopped by cancellation.
    Disconnected,
    /// Connect attempt in progress.
    Connecting,
    /// Session open and healthy.
    Connected,
    /// Waiting to retry; `attempt` is the number of the next try.
    Reconnecting {
        /// Next attempt number, starting at 1.
        attempt: u32,
    },
    /// Retries exhausted; nothing further happens.
    GivenUp,
}

/// Timing and retry limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Interval at which the server pings.
    pub heartbeat_interval: Duration,
    /// Slack on top of the heartbeat interval before the link counts as dead.
    pub grace: Duration,
    /// Fixed delay between reconnect attempts.
    pub retry_interval: Duration,
    /// Consecutive failed attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        let heartbeat_interval = Duration::from_secs(10);
        Self {
            heartbeat_interval,
            grace: Duration::from_secs(1),
            retry_interval: heartbeat_interval,
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Silence after which an open connection is treated as dead.
    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_interval + self.grace
    }
}

/// Inbound frame as seen by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// Text message.
    Text(String),
    /// Protocol-level ping or pong.
    Ping,
    /// Peer closed the connection.
    Close,
}

/// Boxed future returned by the connection traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An open duplex connection.
pub trait Connection: Send {
    /// Send a text frame.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Session` when the connection is broken.
    fn send_text(&mut self, text: String) -> BoxFuture<'_, Result<()>>;

    /// Next inbound frame, or `None` once the stream has ended.
    fn next_frame(&mut self) -> BoxFuture<'_, Option<Result<ClientFrame>>>;

    /// Close the connection.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Session` when the close handshake fails.
    fn close(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// Opens connections.
pub trait Connector: Send + Sync {
    /// Open a new connection.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Session` when the connection cannot be established.
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn Connection>>>;
}

impl<C: Connector + ?Sized> Connector for Arc<C> {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn Connection>>> {
        (**self).connect()
    }
}

/// What the session handler wants after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep the session going.
    Continue,
    /// End the session and the supervisor.
    Stop,
}

/// Application side of a supervised session.
pub trait SessionHandler: Send {
    /// Frames to send after every successful open.
    fn on_open(&mut self) -> Vec<String>;

    /// Handle one inbound text frame.
    fn on_message(&mut self, text: &str) -> Flow;
}

/// How [`ReconnectSupervisor::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The cancellation token fired.
    Cancelled,
    /// The handler asked to stop.
    Stopped,
    /// `max_attempts` consecutive attempts failed.
    GivenUp,
}

enum SessionEnd {
    Lost,
    Cancelled,
    Stopped,
}

/// Keeps a session alive across transient disconnects.
pub struct ReconnectSupervisor<C> {
    connector: C,
    policy: ReconnectPolicy,
    state: watch::Sender<SupervisorState>,
}

impl<C: Connector> ReconnectSupervisor<C> {
    /// Supervisor over `connector`.
    pub fn new(connector: C, policy: ReconnectPolicy) -> Self {
        Self {
            connector,
            policy,
            state: watch::Sender::new(SupervisorState::Disconnected),
        }
    }

    /// Subscribe to state transitions.
    pub fn state(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    fn set(&self, state: SupervisorState) {
        debug!(?state, "supervisor state");
        self.state.send_replace(state);
    }

    /// Connect and keep reconnecting until cancelled, stopped by the
    /// handler, or out of attempts.
    ///
    /// A successful open resets the failure count. Cancelling `cancel`
    /// stops both the heartbeat watch and any pending retry delay.
    pub async fn run<H: SessionHandler>(&self, handler: &mut H, cancel: CancellationToken) -> Outcome {
        let mut failures: u32 = 0;
        loop {
            self.set(SupervisorState::Connecting);
            let connected = tokio::select! {
                () = cancel.cancelled() => return self.finish(Outcome::Cancelled),
                result = self.connector.connect() => result,
            };

            match connected {
                Ok(connection) => {
                    failures = 0;
                    self.set(SupervisorState::Connected);
                    info!("connection open");
                    match self.supervise(connection, handler, &cancel).await {
                        SessionEnd::Cancelled => return self.finish(Outcome::Cancelled),
                        SessionEnd::Stopped => return self.finish(Outcome::Stopped),
                        SessionEnd::Lost => info!("connection lost"),
                    }
                }
                Err(err) => {
                    failures += 1;
                    warn!(%err, failures, "connect attempt failed");
                    if failures >= self.policy.max_attempts {
                        self.set(SupervisorState::GivenUp);
                        return Outcome::GivenUp;
                    }
                }
            }

            self.set(SupervisorState::Reconnecting {
                attempt: failures + 1,
            });
            tokio::select! {
                () = cancel.cancelled() => return self.finish(Outcome::Cancelled),
                () = tokio::time::sleep(self.policy.retry_interval) => {}
            }
        }
    }

    fn finish(&self, outcome: Outcome) -> Outcome {
        self.set(SupervisorState::Disconnected);
        outcome
    }

    async fn supervise<H: SessionHandler>(
        &self,
        mut connection: Box<dyn Connection>,
        handler: &mut H,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        for frame in handler.on_open() {
            if let Err(err) = connection.send_text(frame).await {
                warn!(%err, "send after open failed");
                return SessionEnd::Lost;
            }
        }

        let timeout = self.policy.heartbeat_timeout();
        let watchdog = tokio::time::sleep(timeout);
        tokio::pin!(watchdog);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    let _ = connection.close().await;
                    return SessionEnd::Cancelled;
                }
                () = &mut watchdog => {
                    warn!(?timeout, "heartbeat timeout, closing connection");
                    let _ = connection.close().await;
                    return SessionEnd::Lost;
                }
                frame = connection.next_frame() => match frame {
                    Some(Ok(ClientFrame::Text(text))) => {
                        watchdog.as_mut().reset(Instant::now() + timeout);
                        if handler.on_message(&text) == Flow::Stop {
                            let _ = connection.close().await;
                            return SessionEnd::Stopped;
                        }
                    }
                    Some(Ok(ClientFrame::Ping)) => {
                        watchdog.as_mut().reset(Instant::now() + timeout);
                    }
                    Some(Ok(ClientFrame::Close)) | None => return SessionEnd::Lost,
                    Some(Err(err)) => {
                        warn!(%err, "connection error");
                        return SessionEnd::Lost;
                    }
                }
            }
        }
    }
}
