//! Read and save orchestration over the HOST_CONFIG file.
//!
//! Every call parses the file afresh; nothing is cached between requests.
//! Saves rewrite the whole file through [`crate::files::write_atomic`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::codec::{fresh_record, parse_document, render_document};
use super::fields::{Schema, ALIAS};
use super::protocol::ProtocolIndex;
use super::{FieldValue, HostConfig, HostRecord};
use crate::files::{read_latin1, write_latin1};
use crate::{AppError, Result};

/// Which records a read returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSelector {
    /// Every host.
    All,
    /// A single host by alias.
    One(String),
    /// The first host in order.
    First,
}

impl HostSelector {
    /// Selector for an optional alias list as carried by a session message:
    /// no alias or an empty one means the first host.
    #[must_use]
    pub fn from_aliases(aliases: &[String]) -> Self {
        match aliases.first().map(String::as_str) {
            None | Some("") => Self::First,
            Some(alias) => Self::One(alias.to_owned()),
        }
    }
}

/// Result of a read: the full order plus the projected records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostConfigView {
    /// Aliases represented in `data`.
    pub alias: Vec<String>,
    /// Full host order, regardless of projection.
    pub order: Vec<String>,
    /// Selected records.
    pub data: BTreeMap<String, HostRecord>,
}

/// Save request: an optional new order and partial field maps per alias.
///
/// Without an order, aliases new to the store are appended to the current
/// order. With one, the order is replaced and records outside it are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SavePayload {
    /// Replacement host order; the current order is kept when absent.
    #[serde(default)]
    pub order: Option<Vec<String>>,
    /// Alias to submitted fields.
    #[serde(default)]
    pub data: BTreeMap<String, BTreeMap<String, FieldValue>>,
}

/// HOST_CONFIG store bound to one file.
#[derive(Debug, Clone)]
pub struct HostConfigStore {
    path: PathBuf,
    header_template: Option<PathBuf>,
    schema: &'static Schema,
    protocols: ProtocolIndex,
}

impl HostConfigStore {
    /// Store over `path` using the engine's HOST_CONFIG layout.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            header_template: None,
            schema: Schema::host_config(),
            protocols: ProtocolIndex::new(),
        }
    }

    /// Prepend the contents of `template` to every rewritten file.
    #[must_use]
    pub fn with_header_template(mut self, template: Option<PathBuf>) -> Self {
        self.header_template = template;
        self
    }

    /// Fill `protocol-class` from `protocols` on read.
    #[must_use]
    pub fn with_protocols(mut self, protocols: ProtocolIndex) -> Self {
        self.protocols = protocols;
        self
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the whole file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::HostConfig` if the file is missing or unreadable.
    pub fn load(&self) -> Result<HostConfig> {
        let text = read_latin1(&self.path).map_err(|err| {
            AppError::HostConfig(format!("cannot read {}: {err}", self.path.display()))
        })?;
        let config = parse_document(&text, self.schema);
        debug!(hosts = config.order.len(), "HOST_CONFIG parsed");
        Ok(config)
    }

    /// Every host.
    ///
    /// # Errors
    ///
    /// See [`Self::read`].
    pub fn read_all(&self) -> Result<HostConfigView> {
        self.read(&HostSelector::All)
    }

    /// One host by alias.
    ///
    /// # Errors
    ///
    /// See [`Self::read`].
    pub fn read_one(&self, alias: &str) -> Result<HostConfigView> {
        self.read(&HostSelector::One(alias.to_owned()))
    }

    /// The first host in order.
    ///
    /// # Errors
    ///
    /// See [`Self::read`].
    pub fn read_first(&self) -> Result<HostConfigView> {
        self.read(&HostSelector::First)
    }

    /// Projection of a fresh parse.
    ///
    /// # Errors
    ///
    /// Returns `AppError::HostConfig` if the file is missing, or if a single
    /// host was requested and it does not exist.
    pub fn read(&self, selector: &HostSelector) -> Result<HostConfigView> {
        let HostConfig {
            order, mut data, ..
        } = self.load()?;

        let selected: Vec<String> = match selector {
            HostSelector::All => order.clone(),
            HostSelector::One(alias) => {
                if !data.contains_key(alias) {
                    return Err(AppError::HostConfig(format!("unknown host {alias}")));
                }
                vec![alias.clone()]
            }
            HostSelector::First => order.first().cloned().into_iter().collect(),
        };

        let mut projected = BTreeMap::new();
        for alias in &selected {
            if let Some(mut record) = data.remove(alias) {
                record.protocol_class = self.protocols.class_for(alias);
                projected.insert(alias.clone(), record);
            }
        }

        Ok(HostConfigView {
            alias: selected,
            order,
            data: projected,
        })
    }

    /// Merge `payload` into the stored configuration and rewrite the file.
    ///
    /// Each alias named in `payload.data` gets a fresh record seeded with
    /// table defaults and then overlaid with the submitted fields, so a field
    /// the caller left out reverts to its default. Aliases not named keep
    /// their stored record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::HostConfig` if the current file cannot be read or
    /// the header template is unreadable, and `AppError::Io` if the rewrite
    /// fails.
    pub fn save(&self, payload: SavePayload) -> Result<HostConfig> {
        let mut config = self.load()?;
        match payload.order {
            Some(order) => config.order = order,
            None => {
                for alias in payload.data.keys() {
                    if !config.order.contains(alias) {
                        config.order.push(alias.clone());
                    }
                }
            }
        }

        for (alias, fields) in payload.data {
            let mut record = fresh_record(self.schema);
            record.set(ALIAS, alias.as_str());
            record.fields.extend(fields);
            config.data.insert(alias, record);
        }
        config.data.retain(|alias, _| config.order.contains(alias));

        let header = match &self.header_template {
            Some(template) => read_latin1(template).map_err(|err| {
                AppError::HostConfig(format!(
                    "cannot read header template {}: {err}",
                    template.display()
                ))
            })?,
            None => config.header.clone(),
        };

        let text = render_document(&header, &config, self.schema);
        write_latin1(&self.path, &text)?;
        info!(hosts = config.order.len(), path = %self.path.display(), "HOST_CONFIG saved");
        config.header = header;
        Ok(config)
    }
}
