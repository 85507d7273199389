//! Per-host details from `fsa_view <alias>`.

use serde::Serialize;

use super::runner::Invocation;

/// Host details shown next to the INFO text.
///
/// Every field is optional; lines missing from the `fsa_view` output leave
/// their field unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostInfo {
    /// Alias from the `=` banner line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// First toggle target, `hostname` plus the first toggle character.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host1: Option<String>,
    /// Second toggle target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real2: Option<String>,
    /// Active toggle, e.g. `HOST_ONE`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toggle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_done: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_sent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connections: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_errors: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_interval: Option<String>,
    /// First word of the `Protocol` line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

impl HostInfo {
    /// Alias whose INFO file belongs to this host, falling back to `alias`.
    #[must_use]
    pub fn info_alias<'a>(&'a self, alias: &'a str) -> &'a str {
        self.hostname.as_deref().unwrap_or(alias)
    }
}

/// `fsa_view <alias>`.
#[must_use]
pub fn host_view(alias: &str) -> Invocation {
    Invocation::engine("fsa_view", [alias])
}

/// Parse `fsa_view` output.
///
/// Blank lines, indented lines and `-` rulers are skipped. The `=` banner
/// names the host; every other line is `Label : value`.
#[must_use]
pub fn parse_host_view(raw: &str) -> HostInfo {
    let mut info = HostInfo::default();
    for line in raw.lines() {
        if line.is_empty() || line.starts_with(' ') || line.starts_with('-') {
            continue;
        }
        if line.starts_with('=') {
            if let Some(name) = line.split_whitespace().nth(1) {
                info.hostname = Some(name.to_owned());
                info.host1 = Some(name.to_owned());
                info.host2 = Some(name.to_owned());
            }
            continue;
        }
        let parts: Vec<&str> = line.split(':').map(str::trim).collect();
        let [label, value, rest @ ..] = parts.as_slice() else {
            continue;
        };
        let value = (*value).to_owned();
        match *label {
            "Real hostname 1" => info.real1 = Some(value),
            "Real hostname 2" => info.real2 = Some(value),
            "Host toggle" => info.toggle = Some(value),
            "Host toggle string" => {
                let base = info.hostname.clone().unwrap_or_default();
                let mut chars = value.chars().skip(1);
                if let (Some(first), Some(second)) = (chars.next(), chars.next()) {
                    info.host1 = Some(format!("{base}{first}"));
                    info.host2 = Some(format!("{base}{second}"));
                }
            }
            "File counter done" => info.files_done = Some(value),
            "Bytes send" => info.bytes_sent = Some(value),
            "Last connection" => {
                let mut when = value;
                for part in rest {
                    when.push(':');
                    when.push_str(part);
                }
                info.last_connection = Some(when);
            }
            "Connections" => info.connections = Some(value),
            "Total errors" => info.total_errors = Some(value),
            "Retry interval" => info.retry_interval = Some(value),
            other if other.starts_with("Protocol") => {
                info.protocol = value.split(' ').next().map(str::to_owned);
            }
            _ => {}
        }
    }
    info
}
