//! One-shot alias commands.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::debug;

use super::supervisor::{ClientFrame, Connector};
use crate::Result;

/// Result of [`send_alias_command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// No failure echo arrived within the window.
    Accepted,
    /// The server echoed the request back with this status.
    Rejected {
        /// Reply status, e.g. 500 for a failed `afdcmd`.
        status: u64,
    },
}

/// Send `{class:"alias", action, alias}` and watch for a failure echo.
///
/// The server only answers an alias command when it fails, so silence for
/// `window` counts as success.
///
/// # Errors
///
/// Returns `AppError::Session` if the connection cannot be opened or the
/// request cannot be sent.
pub async fn send_alias_command<C: Connector>(
    connector: &C,
    action: &str,
    aliases: &[String],
    window: Duration,
) -> Result<CommandOutcome> {
    let mut connection = connector.connect().await?;
    let request = json!({ "class": "alias", "action": action, "alias": aliases });
    connection.send_text(request.to_string()).await?;

    let deadline = Instant::now() + window;
    let mut outcome = CommandOutcome::Accepted;
    while let Ok(frame) = tokio::time::timeout_at(deadline, connection.next_frame()).await {
        match frame {
            Some(Ok(ClientFrame::Text(text))) => {
                if let Some(status) = failure_status(&text, action) {
                    outcome = CommandOutcome::Rejected { status };
                    break;
                }
            }
            Some(Ok(ClientFrame::Ping)) => {}
            Some(Ok(ClientFrame::Close)) | None => break,
            Some(Err(err)) => {
                debug!(%err, "connection error while waiting for echo");
                break;
            }
        }
    }
    let _ = connection.close().await;
    Ok(outcome)
}

fn failure_status(text: &str, action: &str) -> Option<u64> {
    let reply: Value = serde_json::from_str(text).ok()?;
    if reply.get("class").and_then(Value::as_str) != Some("alias")
        || reply.get("action").and_then(Value::as_str) != Some(action)
    {
        return None;
    }
    reply.get("status").and_then(Value::as_u64)
}
