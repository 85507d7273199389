//! Host selection by pattern, used by the alias `select`/`deselect` actions.

use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use crate::files::read_latin1;
use crate::hostconfig::store::HostConfigView;
use crate::hostconfig::ProtocolIndex;
use crate::Result;

fn one_or_many<'de, D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
        None => Vec::new(),
    })
}

/// Selection form as submitted by the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HostQuery {
    /// Regex; `*` or absent matches every host.
    #[serde(default)]
    pub modal_select_string: Option<String>,
    /// Protocols a host must use one of. Hosts with no known protocols pass.
    #[serde(default, deserialize_with = "one_or_many")]
    pub modal_select_protocol: Vec<String>,
    /// `info` searches the host's INFO file instead of its names.
    #[serde(default, deserialize_with = "one_or_many")]
    pub modal_select_where: Vec<String>,
    /// `alias` matches the alias; anything else the real host names.
    #[serde(default)]
    pub modal_select_hostname: Option<String>,
}

impl HostQuery {
    fn matcher(&self) -> Result<Regex> {
        let pattern = match self.modal_select_string.as_deref() {
            None | Some("*") => ".*",
            Some(pattern) => pattern,
        };
        Ok(Regex::new(pattern)?)
    }

    fn protocol_ok(&self, alias: &str, protocols: &ProtocolIndex) -> bool {
        let known = protocols.protocols_of(alias);
        known.is_empty()
            || known
                .iter()
                .any(|p| self.modal_select_protocol.iter().any(|wanted| wanted == p))
    }
}

/// Aliases, in host order, that satisfy `query`.
///
/// # Errors
///
/// Returns `AppError::Protocol` if the search pattern is not a valid regex.
pub fn search_hosts(
    query: &HostQuery,
    view: &HostConfigView,
    protocols: &ProtocolIndex,
    etc_dir: &Path,
) -> Result<Vec<String>> {
    let matcher = query.matcher()?;
    let in_info = query.modal_select_where.first().is_some_and(|w| w == "info");
    let by_alias = query.modal_select_hostname.as_deref() == Some("alias");

    let mut hits = Vec::new();
    for alias in &view.order {
        let Some(record) = view.data.get(alias) else {
            continue;
        };
        if !query.protocol_ok(alias, protocols) {
            continue;
        }
        let matched = if in_info {
            let path = etc_dir.join(format!("INFO-{alias}"));
            match read_latin1(&path) {
                Ok(text) => matcher.is_match(&text),
                Err(err) => {
                    warn!(path = %path.display(), %err, "INFO file not readable");
                    false
                }
            }
        } else if by_alias {
            record
                .text("alias")
                .is_some_and(|a| matcher.is_match(&a))
        } else {
            ["host_name_real1", "host_name_real2"]
                .iter()
                .filter_map(|name| record.text(name))
                .any(|name| matcher.is_match(&name))
        };
        if matched {
            hits.push(alias.clone());
        }
    }
    Ok(hits)
}
