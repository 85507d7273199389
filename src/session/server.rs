//! HTTP listener with the `/ctrl` and `/log` WebSocket endpoints.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::channel::{ChannelClass, ChannelPool, Outbound, SessionChannel};
use super::dispatch;
use super::heartbeat::spawn_heartbeat;
use super::publisher::LiveStatusPublisher;
use crate::afd_config::AfdConfig;
use crate::config::GlobalConfig;
use crate::engine::{StatusSource, ToolRunner};
use crate::hostconfig::{HostConfigStore, ProtocolIndex};
use crate::{AppError, Result};

/// Time the writer gets to flush the close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Shared state of the server.
#[derive(Debug)]
pub struct AppState {
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// Engine configuration snapshot.
    pub afd: Arc<AfdConfig>,
    /// HOST_CONFIG store.
    pub store: HostConfigStore,
    /// Collaborator runner.
    pub runner: ToolRunner,
    /// Last known protocols per host.
    pub protocols: ProtocolIndex,
    /// Live status publisher.
    pub publisher: LiveStatusPublisher,
    /// Channels accepted on `/ctrl`.
    pub ctrl_pool: ChannelPool,
    /// Channels accepted on `/log`.
    pub log_pool: ChannelPool,
}

impl AppState {
    /// Wire up the store, runner and publisher from `config`.
    ///
    /// `source` feeds the live status loop; `shutdown` stops it.
    #[must_use]
    pub fn new(
        config: GlobalConfig,
        afd: AfdConfig,
        source: Arc<dyn StatusSource>,
        shutdown: CancellationToken,
    ) -> Self {
        let protocols = ProtocolIndex::new();
        let store = HostConfigStore::new(config.host_config_path())
            .with_header_template(config.host_config_header.clone())
            .with_protocols(protocols.clone());
        let runner = ToolRunner::from_config(&config);
        let publisher = LiveStatusPublisher::new(
            source,
            config.timing.fsa_poll_interval(),
            protocols.clone(),
            shutdown,
        );
        Self {
            config: Arc::new(config),
            afd: Arc::new(afd),
            store,
            runner,
            protocols,
            publisher,
            ctrl_pool: ChannelPool::default(),
            log_pool: ChannelPool::default(),
        }
    }

    /// Pool for `class`.
    #[must_use]
    pub fn pool(&self, class: ChannelClass) -> &ChannelPool {
        match class {
            ChannelClass::Ctrl => &self.ctrl_pool,
            ChannelClass::Log => &self.log_pool,
        }
    }
}

/// Routes of the dashboard backend.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ctrl", get(ctrl_upgrade))
        .route("/log", get(log_upgrade))
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}

/// Bind and serve until `cancel` fires.
///
/// The ctrl heartbeat sweep runs alongside the listener and stops with it.
///
/// # Errors
///
/// Returns `AppError::Config` if the listener cannot bind, and
/// `AppError::Io` if serving fails.
pub async fn serve(state: Arc<AppState>, cancel: CancellationToken) -> Result<()> {
    let bind = state.config.bind();
    let heartbeat = spawn_heartbeat(
        state.ctrl_pool.clone(),
        state.config.timing.heartbeat_interval(),
        cancel.clone(),
    );

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind {bind}: {err}")))?;
    info!(%bind, "web-UI listening");

    let app = router(Arc::clone(&state));
    let shutdown = cancel.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
    .map_err(|err| AppError::Io(format!("server error: {err}")))?;

    cancel.cancel();
    for channel in state.ctrl_pool.snapshot().into_iter().chain(state.log_pool.snapshot()) {
        channel.close();
    }
    let _ = heartbeat.await;
    info!("web-UI listener shut down");
    Ok(())
}

async fn ctrl_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, ChannelClass::Ctrl, Some(peer)))
}

async fn log_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, ChannelClass::Log, Some(peer)))
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    class: ChannelClass,
    peer: Option<SocketAddr>,
) {
    let (channel, outbound_rx) = SessionChannel::new(class, peer);
    let span = info_span!("connection", %class, channel = %channel.id(), peer = ?peer);
    run_connection(socket, state, channel, outbound_rx)
        .instrument(span)
        .await;
}

async fn run_connection(
    socket: WebSocket,
    state: Arc<AppState>,
    channel: Arc<SessionChannel>,
    mut outbound_rx: mpsc::Receiver<Outbound>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let pool = state.pool(channel.class()).clone();
    pool.insert(Arc::clone(&channel));

    let mut writer = tokio::spawn(
        async move {
            while let Some(frame) = outbound_rx.recv().await {
                let (message, last) = match frame {
                    Outbound::Text(text) => (Message::Text(text.into()), false),
                    Outbound::Ping => (Message::Ping(Bytes::new()), false),
                    Outbound::Close => (Message::Close(None), true),
                };
                if ws_tx.send(message).await.is_err() {
                    debug!("send failed, peer gone");
                    break;
                }
                if last {
                    break;
                }
            }
        }
        .in_current_span(),
    );

    channel.open();
    info!("connection open");

    loop {
        tokio::select! {
            () = channel.terminated() => break,
            frame = ws_rx.next() => {
                let Some(frame) = frame else { break };
                match frame {
                    Ok(Message::Text(text)) => {
                        channel.mark_alive();
                        debug!(frame = %text.as_str(), "received");
                        dispatch::dispatch(&state, &channel, text.as_str());
                    }
                    Ok(Message::Ping(_) | Message::Pong(_)) => channel.mark_alive(),
                    Ok(Message::Close(_)) => break,
                    Ok(Message::Binary(_)) => {
                        channel.mark_alive();
                        warn!("binary frame ignored");
                    }
                    Err(err) => {
                        warn!(%err, "websocket error");
                        break;
                    }
                }
            }
        }
    }

    channel.close();
    state.publisher.unsubscribe(channel.id());
    pool.remove(channel.id());
    if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }
    channel.mark_closed();
    info!("connection closed");
}
