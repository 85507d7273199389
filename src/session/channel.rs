//! Per-connection channel handle and the per-endpoint channel pools.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{AppError, Result};

/// Outbound queue depth per connection.
pub const OUTBOUND_CAPACITY: usize = 128;

/// Endpoint a channel was accepted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelClass {
    /// `/ctrl`: status, control and configuration.
    Ctrl,
    /// `/log`: log and query retrieval.
    Log,
}

impl fmt::Display for ChannelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ctrl => "ctrl",
            Self::Log => "log",
        })
    }
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    /// Upgrade accepted, writer not yet running.
    Connecting = 0,
    /// Messages may be sent and dispatched.
    Open = 1,
    /// Close initiated; nothing more is sent.
    Closing = 2,
    /// Connection gone.
    Closed = 3,
}

impl ChannelState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Frame queued for the connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// JSON text frame.
    Text(String),
    /// Protocol-level ping.
    Ping,
    /// Close frame; the writer stops afterwards.
    Close,
}

/// Server-side handle of one accepted connection.
///
/// Clones of the `Arc` are held by the dispatch tasks working on behalf of
/// the connection; once the channel leaves [`ChannelState::Open`] their
/// sends fail and the results are dropped.
#[derive(Debug)]
pub struct SessionChannel {
    id: Uuid,
    class: ChannelClass,
    peer: Option<SocketAddr>,
    state: AtomicU8,
    alive: AtomicBool,
    outbound: mpsc::Sender<Outbound>,
    terminate: CancellationToken,
}

impl SessionChannel {
    /// Create a channel in [`ChannelState::Connecting`] together with the
    /// receiving end of its outbound queue.
    #[must_use]
    pub fn new(class: ChannelClass, peer: Option<SocketAddr>) -> (Arc<Self>, mpsc::Receiver<Outbound>) {
        let (outbound, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let channel = Arc::new(Self {
            id: Uuid::new_v4(),
            class,
            peer,
            state: AtomicU8::new(ChannelState::Connecting as u8),
            alive: AtomicBool::new(true),
            outbound,
            terminate: CancellationToken::new(),
        });
        (channel, rx)
    }

    /// Unique connection id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Endpoint class.
    #[must_use]
    pub fn class(&self) -> ChannelClass {
        self.class
    }

    /// Remote address, when known.
    #[must_use]
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move from `Connecting` to `Open`. Any other starting state is left
    /// untouched.
    pub fn open(&self) -> bool {
        self.state
            .compare_exchange(
                ChannelState::Connecting as u8,
                ChannelState::Open as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Begin closing: queue a close frame and stop accepting sends.
    pub fn close(&self) {
        let previous = self
            .state
            .swap(ChannelState::Closing as u8, Ordering::AcqRel);
        if ChannelState::from_u8(previous) == ChannelState::Closed {
            self.state
                .store(ChannelState::Closed as u8, Ordering::Release);
            return;
        }
        let _ = self.outbound.try_send(Outbound::Close);
    }

    /// Drop the connection without a close handshake.
    pub fn terminate(&self) {
        self.state
            .store(ChannelState::Closing as u8, Ordering::Release);
        self.terminate.cancel();
    }

    /// Mark the connection gone.
    pub fn mark_closed(&self) {
        self.state
            .store(ChannelState::Closed as u8, Ordering::Release);
    }

    /// Resolves once [`Self::terminate`] is called.
    pub async fn terminated(&self) {
        self.terminate.cancelled().await;
    }

    /// Record inbound activity.
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Release);
    }

    /// Clear the activity flag, returning whether activity was seen since
    /// the previous call.
    pub fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }

    /// Queue a raw frame.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Session` if the channel is not open or its queue
    /// is full or closed.
    pub fn send(&self, frame: Outbound) -> Result<()> {
        if self.state() != ChannelState::Open {
            return Err(AppError::Session(format!("channel {} is not open", self.id)));
        }
        self.outbound.try_send(frame).map_err(|err| {
            AppError::Session(format!("channel {} outbound queue: {err}", self.id))
        })
    }

    /// Serialize `payload` and queue it as a text frame.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` on serialization failure and
    /// `AppError::Session` if the frame cannot be queued.
    pub fn send_json<T: Serialize + ?Sized>(&self, payload: &T) -> Result<()> {
        let text = serde_json::to_string(payload)?;
        self.send(Outbound::Text(text))
    }

    /// Queue an already serialized text frame.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(Outbound::Text(text.into()))
    }

    /// Send a reply, logging instead of failing when the channel is gone.
    pub fn reply<T: Serialize + ?Sized>(&self, payload: &T) {
        if let Err(err) = self.send_json(payload) {
            match self.state() {
                ChannelState::Open => warn!(channel = %self.id, %err, "reply dropped"),
                _ => debug!(channel = %self.id, %err, "reply for closed channel dropped"),
            }
        }
    }
}

/// Open channels of one endpoint.
#[derive(Debug, Clone, Default)]
pub struct ChannelPool {
    channels: Arc<RwLock<HashMap<Uuid, Arc<SessionChannel>>>>,
}

impl ChannelPool {
    /// Empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a channel.
    pub fn insert(&self, channel: Arc<SessionChannel>) {
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel.id(), channel);
    }

    /// Remove a channel by id.
    pub fn remove(&self, id: Uuid) -> Option<Arc<SessionChannel>> {
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    /// Current members.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<SessionChannel>> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the pool is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
