//! WebSocket transport for the supervisor.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::supervisor::{BoxFuture, ClientFrame, Connection, Connector};
use crate::{AppError, Result};

fn session_err(err: &tokio_tungstenite::tungstenite::Error) -> AppError {
    AppError::Session(err.to_string())
}

/// Connects to one fixed `ws://` URL.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    /// Connector for `url`, e.g. `ws://localhost:8040/ctrl`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connector for WsConnector {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn Connection>>> {
        Box::pin(async move {
            let (stream, response) = connect_async(self.url.as_str())
                .await
                .map_err(|err| session_err(&err))?;
            debug!(url = %self.url, status = %response.status(), "websocket handshake complete");
            Ok(Box::new(WsConnection { stream }) as Box<dyn Connection>)
        })
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Connection for WsConnection {
    fn send_text(&mut self, text: String) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.stream
                .send(Message::Text(text.into()))
                .await
                .map_err(|err| session_err(&err))
        })
    }

    fn next_frame(&mut self) -> BoxFuture<'_, Option<Result<ClientFrame>>> {
        Box::pin(async move {
            loop {
                let frame = match self.stream.next().await? {
                    Ok(Message::Text(text)) => ClientFrame::Text(text.as_str().to_owned()),
                    Ok(Message::Ping(_) | Message::Pong(_)) => ClientFrame::Ping,
                    Ok(Message::Close(_)) => ClientFrame::Close,
                    Ok(Message::Binary(_) | Message::Frame(_)) => continue,
                    Err(err) => return Some(Err(session_err(&err))),
                };
                return Some(Ok(frame));
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.stream.close(None).await.map_err(|err| session_err(&err)) })
    }
}
