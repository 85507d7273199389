//! Log file filtering and `alda` / `jid_view` query building.

use std::fmt::Write as _;
use std::path::Path;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::runner::Invocation;
use crate::files::decode_latin1;
use crate::{AppError, Result};

/// Size cap on text collected from plain log files.
pub const LOG_TEXT_LIMIT: usize = 5 * 1024 * 1024;

/// Output cap in MiB for `alda` queries.
pub const ALDA_LIMIT_MB: u64 = 3;

/// Plain log families under `<work_dir>/log`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFile {
    /// `SYSTEM_LOG.<n>`
    System,
    /// `RECEIVE_LOG.<n>`
    Receive,
    /// `TRANSFER_LOG.<n>`
    Transfer,
    /// `TRANS_DB_LOG.<n>`
    TransferDebug,
}

impl LogFile {
    /// Family for a log-class `context`; other contexts are `alda` queries.
    #[must_use]
    pub fn from_context(context: &str) -> Option<Self> {
        Some(match context {
            "system" => Self::System,
            "receive" => Self::Receive,
            "transfer" => Self::Transfer,
            "transfer_debug" => Self::TransferDebug,
            _ => return None,
        })
    }

    /// File name prefix.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::System => "SYSTEM_LOG.",
            Self::Receive => "RECEIVE_LOG.",
            Self::Transfer => "TRANSFER_LOG.",
            Self::TransferDebug => "TRANS_DB_LOG.",
        }
    }
}

/// Lines of one log family whose level marker matches `level`.
///
/// `file` selects the rotation number; `all` (or `*`) reads every file in
/// name order. `level` is a regex alternation such as `I|W|E` tested as
/// `<(level)>`.
///
/// # Errors
///
/// - `AppError::Protocol` for a malformed file selector or level pattern.
/// - `AppError::PayloadTooLarge` when the result exceeds [`LOG_TEXT_LIMIT`].
pub fn read_filtered(log_dir: &Path, family: LogFile, file: &str, level: &str) -> Result<String> {
    let suffix = match file {
        "all" | "*" => "*",
        n if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => n,
        other => {
            return Err(AppError::Protocol(format!(
                "invalid log file selector {other}"
            )))
        }
    };
    let matcher = Regex::new(&format!("<({level})>"))?;
    let pattern = log_dir.join(format!("{}{suffix}", family.prefix()));
    let pattern = pattern.to_string_lossy();

    let mut paths: Vec<_> = glob::glob(&pattern)
        .map_err(|err| AppError::Protocol(format!("invalid log pattern: {err}")))?
        .filter_map(std::result::Result::ok)
        .collect();
    paths.sort();
    debug!(files = paths.len(), %pattern, "filtering log files");

    let mut text = String::new();
    for path in paths {
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %path.display(), %err, "skipping unreadable log file");
                continue;
            }
        };
        for line in decode_latin1(&bytes).lines() {
            if matcher.is_match(line) {
                text.push_str(line);
                text.push('\n');
            }
        }
        if text.len() > LOG_TEXT_LIMIT {
            return Err(AppError::PayloadTooLarge(
                "Too much data! Reduce with filter.".into(),
            ));
        }
    }
    Ok(text)
}

const INPUT_FORMAT: &str = "<tr jid='%Uj,' fnl='%IF' uu='%IU' sz='%ISB' dti='%ITy/%ITm/%ITd %ITH:%ITM:%ITS'>\
<td class='clst-dd'>%ITm.%ITd.</td><td class='clst-hh'>%ITH:%ITM:%ITS</td><td>%IF</td>\
<td class='clst-fs'>%ISB</td></tr>";

const OUTPUT_FORMAT: &str = "<tr jid='%OJ' fnl='%Of' fnr='%OF' uu='%OU' sz='%OSB' trt='%ODA' \
dto='%OTy/%OTm/%OTd %OTH:%OTM:%OTS' arc='|%OA/%xOZu_%xOU_%xOL_%Of|'>\
<td class='clst-dd'>%OTm.%OTd.</td><td class='clst-hh'>%OTH:%OTM:%OTS</td><td>%Of</td>\
<td class='clst-hn'>%OH</td><td class='clst-tr'>%OP</td><td class='clst-fs'>%OSB</td>\
<td class='clst-tt'>%ODA</td><td class='clst-aa'>|N|</td></tr>";

const DELETE_FORMAT: &str = "<tr jid='%DJ' fnl='%DF' uu='%DU' dtd='%DTy/%DTm/%DTd %DTH:%DTM:%DTS'>\
<td class='clst-dd'>%DTm.%DTd.</td><td class='clst-hh'>%DTH:%DTM:%DTS</td><td>%DF</td>\
<td class='clst-fs'>%DSB</td><td class='clst-hn'>%DH</td><td class='clst-rn'>%DR</td>\
<td class='clst-pu'>%DW</td></tr>";

fn filter_flag(key: &str) -> Option<&'static str> {
    Some(match key {
        "start" => "-t",
        "end" => "-T",
        "directory" => "-d",
        "recipient" => "-h",
        "filesize" => "-S",
        "job_id" => "-j",
        "protocol" => "-p",
        "trans-time" => "-D",
        _ => return None,
    })
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.as_str(), "on" | "yes" | "true"),
        _ => false,
    }
}

/// An `alda` query built from a log-class filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AldaQuery {
    /// Collaborator call.
    pub invocation: Invocation,
    /// Drop output rows that are not in the archive.
    pub archived_only: bool,
}

impl AldaQuery {
    /// Build the query for `context` (`input`, `output` or `delete`).
    #[must_use]
    pub fn build(context: &str, filter: &Map<String, Value>) -> Self {
        let mut log_type = if filter.get("received-only").is_some_and(is_truthy) {
            "R".to_owned()
        } else {
            context
                .chars()
                .next()
                .map(|c| c.to_ascii_uppercase().to_string())
                .unwrap_or_default()
        };
        if log_type == "I" {
            log_type.push('U');
        }

        let mut format = match context {
            "input" => Some(INPUT_FORMAT.to_owned()),
            "output" => Some(OUTPUT_FORMAT.to_owned()),
            "delete" => Some(DELETE_FORMAT.to_owned()),
            _ => None,
        };

        let mut params: Vec<String> = Vec::new();
        let mut file_name = None;
        for (key, value) in filter {
            match key.as_str() {
                "filename" => file_name = Some(value_text(value)),
                "recipient" => {
                    let recipients = value_text(value)
                        .split(',')
                        .map(|r| format!("%{r}"))
                        .collect::<Vec<_>>()
                        .join(",");
                    params.push("-h".to_owned());
                    params.push(recipients);
                }
                "output-filename-remote" if is_truthy(value) => {
                    if let Some(f) = format.as_mut() {
                        *f = f.replacen("%Of", "%OF", 1);
                    }
                }
                key => {
                    let Some(flag) = filter_flag(key) else {
                        continue;
                    };
                    match value {
                        Value::Bool(true) => params.push(flag.to_owned()),
                        Value::Bool(false) | Value::Null => {}
                        Value::String(s) if s == "true" => params.push(flag.to_owned()),
                        Value::String(s) if s.is_empty() => {}
                        other => {
                            params.push(flag.to_owned());
                            params.push(value_text(other));
                        }
                    }
                }
            }
        }

        let mut args = vec!["-f".to_owned(), "-L".to_owned(), log_type];
        args.extend(params);
        if let Some(format) = format {
            args.push("-o".to_owned());
            args.push(format);
        }
        args.extend(file_name);

        Self {
            invocation: Invocation::engine("alda", args).with_limit_mb(ALDA_LIMIT_MB),
            archived_only: filter.get("archived-only").is_some_and(is_truthy),
        }
    }
}

/// Resolve the archive marker of each `output` row.
///
/// Rows carry `|<archive path>|` and a trailing `|N|` marker. The marker
/// becomes `Y` when the archived file still exists under `archive_dir`,
/// `D` when it was removed and `N` when the file was never archived. The
/// pipes and the path are stripped from the row.
#[must_use]
pub fn resolve_archive_markers(stdout: &str, archive_dir: &Path, archived_only: bool) -> Vec<String> {
    let mut rows = Vec::new();
    for line in stdout.lines().filter(|l| !l.is_empty()) {
        let mut parts: Vec<String> = line.split('|').map(str::to_owned).collect();
        if parts.len() < 4 {
            rows.push(line.to_owned());
            continue;
        }
        let marker_index = parts.len() - 2;
        let marker = if parts[1].starts_with('/') {
            "N"
        } else if archive_dir.join(&parts[1]).exists() {
            "Y"
        } else {
            "D"
        };
        if marker != "Y" {
            parts[1].clear();
        }
        marker.clone_into(&mut parts[marker_index]);
        if !archived_only || marker == "Y" {
            rows.push(parts.concat());
        }
    }
    rows
}

/// Leading decimal digits of `raw` as a hex string, if any.
fn hex_job_id(raw: &str) -> Option<String> {
    let digits: String = raw
        .trim()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse::<u64>().ok().map(|n| format!("{n:x}"))
}

/// `jid_view` call for a file-info request, or `None` when the context has
/// no job ids or the id is unparseable.
#[must_use]
pub fn job_view(context: &str, jid: &str) -> Option<Invocation> {
    let args: Vec<String> = match context {
        "input" => jid.split(',').filter_map(hex_job_id).collect(),
        "output" | "delete" => hex_job_id(jid).into_iter().collect(),
        _ => return None,
    };
    if args.is_empty() {
        return None;
    }
    Some(Invocation::engine("jid_view", args))
}

/// Text shown in a file-info box: the row attributes followed by the
/// `jid_view` output.
#[must_use]
pub fn file_info_text(element: &Map<String, Value>, job_text: &str) -> String {
    let field = |key: &str| element.get(key).map(value_text).unwrap_or_default();
    let mut text = String::new();
    let _ = writeln!(text, "Local name : {}", field("fnl"));
    let _ = writeln!(text, "Remote name: {}", field("fnr"));
    let _ = writeln!(text, "File size  : {} Bytes", field("sz"));
    if element.contains_key("dto") {
        let _ = writeln!(text, "Output time: {}", field("dto"));
        let _ = writeln!(text, "Trans time : {} sec", field("trt"));
    } else if element.contains_key("dti") {
        let _ = writeln!(text, "Input time : {}", field("dti"));
    } else if element.contains_key("dtd") {
        let _ = writeln!(text, "Delete time : {}", field("dtd"));
    }
    text.push_str(job_text);
    text
}
