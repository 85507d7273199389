//! Routing of inbound messages to their handlers.
//!
//! The read loop only parses and routes. Anything that touches the file
//! system or spawns a collaborator runs on its own task and replies on the
//! channel when done, so replies arrive in completion order.

use std::future::Future;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn, Instrument};

use super::channel::{ChannelClass, SessionChannel};
use super::message::{parse_error_reply, MessageClass, SessionMessage};
use super::search::{search_hosts, HostQuery};
use super::server::AppState;
use crate::engine::commands::dir_config_for;
use crate::engine::host_info::{host_view, parse_host_view};
use crate::engine::logs::{self, AldaQuery, LogFile};
use crate::engine::{AfdCommand, AliasCommand, HostInfo};
use crate::errors::status;
use crate::files::{read_latin1, resolve_within, write_latin1};
use crate::hostconfig::{HostSelector, SavePayload};
use crate::{AppError, Result};

const NO_HOST_INFO: &str = "No information available.";

/// Route one text frame received on `channel`.
pub fn dispatch(state: &Arc<AppState>, channel: &Arc<SessionChannel>, raw: &str) {
    let message = match SessionMessage::parse(raw) {
        Ok(message) => message,
        Err(err) => {
            warn!(%err, "unparseable frame");
            channel.reply(&parse_error_reply(&err));
            return;
        }
    };
    match channel.class() {
        ChannelClass::Ctrl => dispatch_ctrl(state, channel, message),
        ChannelClass::Log => dispatch_log(state, channel, message),
    }
}

fn spawn<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(future.in_current_span());
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| AppError::Io(format!("blocking task failed: {err}")))?
}

// ── ctrl endpoint ───────────────────────────────────────────────────────────

fn dispatch_ctrl(state: &Arc<AppState>, channel: &Arc<SessionChannel>, message: SessionMessage) {
    match message.class {
        MessageClass::Fsa => match message.action() {
            "start" => {
                state.publisher.subscribe(Arc::clone(channel));
            }
            "stop" => {
                state.publisher.unsubscribe(channel.id());
            }
            other => warn!(action = other, "unknown fsa action"),
        },
        MessageClass::Afd => action_afd(state, channel, message),
        MessageClass::Alias => action_alias(state, channel, message),
        class => warn!(%class, "unknown class on ctrl"),
    }
}

fn action_afd(state: &Arc<AppState>, channel: &Arc<SessionChannel>, message: SessionMessage) {
    match (message.action(), message.command()) {
        ("hc", "read") => {
            let (state, channel) = (Arc::clone(state), Arc::clone(channel));
            spawn(async move {
                let selector = HostSelector::from_aliases(&message.alias);
                let store = state.store.clone();
                match blocking(move || store.read(&selector)).await {
                    Ok(view) => channel.reply(&json!({
                        "class": "afd",
                        "action": "hc",
                        "alias": view.alias,
                        "order": view.order,
                        "data": view.data,
                    })),
                    Err(err) => {
                        error!(%err, "host config read failed");
                        channel.reply(&message.error_reply(&as_host_config_error(err)));
                    }
                }
            });
        }
        ("hc", "save") => {
            let (state, channel) = (Arc::clone(state), Arc::clone(channel));
            spawn(async move {
                let payload = message.data.clone().unwrap_or(Value::Null);
                let result = match serde_json::from_value::<SavePayload>(payload) {
                    Ok(payload) => {
                        let store = state.store.clone();
                        blocking(move || store.save(payload)).await.map(|_| ())
                    }
                    Err(err) => Err(AppError::HostConfig(format!("invalid save payload: {err}"))),
                };
                if let Err(err) = result {
                    error!(%err, "host config save failed");
                    channel.reply(&message.error_reply(&as_host_config_error(err)));
                }
            });
        }
        ("dc", "list") => {
            let (state, channel) = (Arc::clone(state), Arc::clone(channel));
            spawn(async move {
                let etc = state.config.etc_dir();
                let patterns = state.afd.editable_file_patterns();
                let files = blocking(move || Ok(list_editable(&etc, &patterns)))
                    .await
                    .unwrap_or_default();
                channel.reply(&json!({
                    "class": "afd",
                    "action": "dc",
                    "context": message.context,
                    "command": "list",
                    "filename": files,
                }));
            });
        }
        ("dc", "read") => {
            let (state, channel) = (Arc::clone(state), Arc::clone(channel));
            spawn(async move {
                let etc = state.config.etc_dir();
                let name = message.filename.clone().unwrap_or_default();
                let result = blocking(move || {
                    let path = resolve_within(&etc, &name)?;
                    read_latin1(&path)
                })
                .await;
                match result {
                    Ok(text) => channel.reply(&json!({
                        "class": "afd",
                        "action": "dc",
                        "command": "read",
                        "context": message.context,
                        "filename": message.filename,
                        "text": text,
                    })),
                    Err(err) => {
                        warn!(%err, "editable file read failed");
                        channel.reply(&message.error_reply(&err));
                    }
                }
            });
        }
        ("dc", "save") => {
            let (state, channel) = (Arc::clone(state), Arc::clone(channel));
            spawn(async move {
                let etc = state.config.etc_dir();
                let name = message.filename.clone().unwrap_or_default();
                let text = message.text.clone().unwrap_or_default();
                let result = blocking(move || {
                    let path = resolve_within(&etc, &name)?;
                    write_latin1(&path, &text)
                })
                .await;
                match result {
                    Ok(()) => info!(filename = ?message.filename, "editable file saved"),
                    Err(err) => {
                        error!(%err, "editable file save failed");
                        channel.reply(&message.error_reply(&err));
                    }
                }
            });
        }
        (action, command) => match AfdCommand::from_message(action, command) {
            Some(afd_command) => {
                let state = Arc::clone(state);
                spawn(async move {
                    let invocation = afd_command.invocation();
                    match state.runner.run_checked(&invocation).await {
                        Ok(_) => info!(command = ?afd_command, "afd command done"),
                        Err(err) => error!(command = ?afd_command, %err, "afd command failed"),
                    }
                });
            }
            None => warn!(action, command, "unclear afd action"),
        },
    }
}

fn as_host_config_error(err: AppError) -> AppError {
    match err {
        AppError::HostConfig(_) => err,
        other => AppError::HostConfig(other.to_string()),
    }
}

/// Names under `etc_dir` matching any of `patterns`, deduplicated in match
/// order.
#[must_use]
pub fn list_editable(etc_dir: &std::path::Path, patterns: &[String]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for pattern in patterns {
        if resolve_within(etc_dir, pattern).is_err() {
            warn!(pattern = %pattern, "editable file pattern outside etc ignored");
            continue;
        }
        let full = etc_dir.join(pattern);
        let full = full.to_string_lossy();
        let paths = match glob::glob(&full) {
            Ok(paths) => paths,
            Err(err) => {
                warn!(pattern = %pattern, %err, "invalid editable file pattern");
                continue;
            }
        };
        for path in paths.filter_map(std::result::Result::ok) {
            let Ok(relative) = path.strip_prefix(etc_dir) else {
                continue;
            };
            let name = relative.to_string_lossy().into_owned();
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

fn action_alias(state: &Arc<AppState>, channel: &Arc<SessionChannel>, message: SessionMessage) {
    match (message.action(), message.command()) {
        ("select" | "deselect", _) => {
            let (state, channel) = (Arc::clone(state), Arc::clone(channel));
            spawn(async move {
                let query: HostQuery = message
                    .data
                    .clone()
                    .and_then(|data| serde_json::from_value(data).ok())
                    .unwrap_or_default();
                let store = state.store.clone();
                let protocols = state.protocols.clone();
                let etc = state.config.etc_dir();
                let result = blocking(move || {
                    let view = store.read_all()?;
                    search_hosts(&query, &view, &protocols, &etc)
                })
                .await;
                match result {
                    Ok(aliases) => channel.reply(&json!({
                        "class": "alias",
                        "action": message.action(),
                        "alias": aliases,
                    })),
                    Err(err) => {
                        warn!(%err, "host search failed");
                        channel.reply(&message.error_reply(&err));
                    }
                }
            });
        }
        ("info", "read") => {
            for alias in message.alias.clone() {
                let (state, channel) = (Arc::clone(state), Arc::clone(channel));
                spawn(async move {
                    let info = match state.runner.run_checked(&host_view(&alias)).await {
                        Ok(output) => parse_host_view(&output.stdout),
                        Err(err) => {
                            warn!(alias = %alias, %err, "fsa_view failed");
                            HostInfo::default()
                        }
                    };
                    let etc = state.config.etc_dir();
                    let file = format!("INFO-{}", info.info_alias(&alias));
                    let text = blocking(move || read_latin1(&resolve_within(&etc, &file)?))
                        .await
                        .unwrap_or_else(|err| {
                            debug!(alias = %alias, %err, "no INFO file");
                            NO_HOST_INFO.to_owned()
                        });
                    channel.reply(&json!({
                        "class": "alias",
                        "action": "info",
                        "alias": alias,
                        "text": text,
                        "data": info,
                    }));
                });
            }
        }
        ("info", "save") => {
            let (state, channel) = (Arc::clone(state), Arc::clone(channel));
            spawn(async move {
                let Some(alias) = message.alias.first().cloned() else {
                    channel.reply(&message.error_reply(&AppError::Protocol(
                        "info save without alias".into(),
                    )));
                    return;
                };
                let etc = state.config.etc_dir();
                let text = message.text.clone().unwrap_or_default();
                let file = format!("INFO-{alias}");
                let result = blocking(move || {
                    let path = resolve_within(&etc, &file)?;
                    write_latin1(&path, &text)
                })
                .await;
                if let Err(err) = result {
                    error!(alias = %alias, %err, "error writing INFO file");
                    channel.reply(&message.error_reply(&err));
                }
            });
        }
        ("config", _) => {
            for alias in message.alias.clone() {
                let (state, channel) = (Arc::clone(state), Arc::clone(channel));
                spawn(async move {
                    match state.runner.run_checked(&dir_config_for(&alias)).await {
                        Ok(output) => channel.reply(&json!({
                            "class": "alias",
                            "action": "config",
                            "alias": alias,
                            "text": output.stdout,
                        })),
                        Err(err) => error!(alias = %alias, %err, "get_dc_data failed"),
                    }
                });
            }
        }
        (action, _) => {
            let Some(command) = AliasCommand::from_action(action) else {
                warn!(action, "unknown alias action");
                channel.reply(&message.with_status(status::ERROR));
                return;
            };
            let (state, channel) = (Arc::clone(state), Arc::clone(channel));
            spawn(async move {
                let invocation = command.invocation(&message.alias);
                if let Err(err) = state.runner.run_checked(&invocation).await {
                    error!(?command, %err, "afdcmd failed");
                    channel.reply(&message.with_status(status::ERROR));
                }
            });
        }
    }
}

// ── log endpoint ────────────────────────────────────────────────────────────

fn dispatch_log(state: &Arc<AppState>, channel: &Arc<SessionChannel>, message: SessionMessage) {
    if message.class != MessageClass::Log {
        warn!(class = %message.class, "unknown class on log");
        return;
    }
    match message.action() {
        "list" => match LogFile::from_context(message.context()) {
            Some(family) => log_from_file(state, channel, message, family),
            None => log_from_alda(state, channel, message),
        },
        "info" => file_info(state, channel, &message),
        other => warn!(action = other, "unknown log action"),
    }
}

fn log_from_file(
    state: &Arc<AppState>,
    channel: &Arc<SessionChannel>,
    message: SessionMessage,
    family: LogFile,
) {
    let (state, channel) = (Arc::clone(state), Arc::clone(channel));
    spawn(async move {
        let filter = message.filter_object();
        let file = filter_text(&filter, "file").unwrap_or_else(|| "all".to_owned());
        let level = filter_text(&filter, "level").unwrap_or_else(|| ".*".to_owned());
        let log_dir = state.config.log_dir();
        match blocking(move || logs::read_filtered(&log_dir, family, &file, &level)).await {
            Ok(text) => channel.reply(&json!({
                "class": "log",
                "context": message.context,
                "action": "list",
                "append": false,
                "text": text,
            })),
            Err(err) => {
                warn!(%err, "log file filter failed");
                channel.reply(&message.error_reply(&err));
            }
        }
    });
}

fn log_from_alda(state: &Arc<AppState>, channel: &Arc<SessionChannel>, message: SessionMessage) {
    let (state, channel) = (Arc::clone(state), Arc::clone(channel));
    spawn(async move {
        let context = message.context().to_owned();
        let query = AldaQuery::build(&context, &message.filter_object());
        let mut reply = Map::new();
        reply.insert("class".into(), json!("log"));
        reply.insert("context".into(), json!(context));
        reply.insert("action".into(), json!("list"));
        reply.insert("append".into(), json!(false));

        match state.runner.run(&query.invocation).await {
            Ok(output) => {
                let lines = if context == "output" {
                    logs::resolve_archive_markers(
                        &output.stdout,
                        &state.config.archive_dir(),
                        query.archived_only,
                    )
                } else {
                    output.stdout.split('\n').map(str::to_owned).collect()
                };
                reply.insert("lines".into(), json!(lines));
                reply.insert("errno".into(), json!(output.code));
                if !output.success() {
                    reply.insert("error".into(), json!(output.stderr));
                }
            }
            Err(err) => {
                warn!(%err, "alda query failed");
                reply.insert("lines".into(), json!([]));
                reply.insert("errno".into(), json!(err.status()));
                reply.insert("error".into(), json!(err.to_string()));
            }
        }
        channel.reply(&Value::Object(reply));
    });
}

fn file_info(state: &Arc<AppState>, channel: &Arc<SessionChannel>, message: &SessionMessage) {
    let context = message.context().to_owned();
    if !matches!(context.as_str(), "input" | "output" | "delete") {
        warn!(context = %context, "file info for unsupported context");
        return;
    }
    let elements: Vec<Map<String, Value>> = match &message.filter {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_object().cloned())
            .collect(),
        Some(Value::Object(item)) => vec![item.clone()],
        _ => Vec::new(),
    };

    for element in elements {
        let jid = element.get("jid").map(value_text).unwrap_or_default();
        let Some(invocation) = logs::job_view(&context, &jid) else {
            warn!(jid = %jid, "file info without usable job id");
            continue;
        };
        let (state, channel, context) = (Arc::clone(state), Arc::clone(channel), context.clone());
        spawn(async move {
            match state.runner.run_checked(&invocation).await {
                Ok(output) => {
                    let mut data = Map::new();
                    for key in ["jid", "fnl", "uu", "fnr"] {
                        if let Some(value) = element.get(key) {
                            data.insert(key.into(), value.clone());
                        }
                    }
                    data.insert(
                        "text".into(),
                        json!(logs::file_info_text(&element, &output.stdout)),
                    );
                    channel.reply(&json!({
                        "class": "log",
                        "context": context,
                        "action": "info",
                        "data": data,
                    }));
                }
                Err(err) => error!(jid = %jid, %err, "jid_view failed"),
            }
        });
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn filter_text(filter: &Map<String, Value>, key: &str) -> Option<String> {
    filter
        .get(key)
        .map(value_text)
        .filter(|text| !text.is_empty())
}
