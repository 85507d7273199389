//! Live fleet status as reported by the engine.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::runner::{Invocation, ToolRunner};
use crate::Result;

/// Status of one host in the fleet status array.
///
/// Fields the dashboard does not interpret are carried through in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostStatus {
    /// Position in the FSA.
    #[serde(default)]
    pub ord: u32,
    /// Host alias.
    pub alias: String,
    /// First real host name.
    #[serde(default)]
    pub real1: String,
    /// Second real host name.
    #[serde(default)]
    pub real2: String,
    /// Display name.
    #[serde(default)]
    pub display: String,
    /// `S`, `R` or both.
    #[serde(default)]
    pub direction: String,
    /// Debug level name.
    #[serde(default)]
    pub debug_mode: Option<String>,
    /// Status flag names.
    #[serde(default)]
    pub host_status: Vec<Value>,
    /// Consecutive errors.
    #[serde(default)]
    pub error_count: u64,
    /// Queued files.
    #[serde(default)]
    pub file_count: u64,
    /// Queued bytes.
    #[serde(default)]
    pub file_size: u64,
    /// Active transfers.
    #[serde(default)]
    pub transfers: u32,
    /// Per-job state.
    #[serde(default)]
    pub jobs: Vec<Value>,
    /// Protocols the host is configured for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Vec<String>>,
    /// Everything else.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Protocol list per alias from a status snapshot; hosts without one are
/// left out.
#[must_use]
pub fn protocols_by_alias(snapshot: &[HostStatus]) -> HashMap<String, Vec<String>> {
    snapshot
        .iter()
        .filter_map(|host| {
            host.protocol
                .as_ref()
                .map(|protocols| (host.alias.clone(), protocols.clone()))
        })
        .collect()
}

/// Source of live fleet status.
pub trait StatusSource: Send + Sync {
    /// Fetch the current status of every host.
    ///
    /// # Errors
    ///
    /// Returns an error if the collaborator fails or its output cannot be
    /// parsed.
    fn fetch(&self) -> Pin<Box<dyn Future<Output = Result<Vec<HostStatus>>> + Send + '_>>;
}

/// [`StatusSource`] backed by the engine's `fsa_view_json` tool.
#[derive(Debug, Clone)]
pub struct FsaViewSource {
    runner: ToolRunner,
}

impl FsaViewSource {
    /// Query status through `runner`.
    #[must_use]
    pub fn new(runner: ToolRunner) -> Self {
        Self { runner }
    }
}

impl StatusSource for FsaViewSource {
    fn fetch(&self) -> Pin<Box<dyn Future<Output = Result<Vec<HostStatus>>> + Send + '_>> {
        Box::pin(async move {
            let invocation = Invocation::engine("fsa_view_json", Vec::<String>::new());
            let output = self.runner.run_checked(&invocation).await?;
            let snapshot: Vec<HostStatus> = serde_json::from_str(output.stdout.trim())?;
            Ok(snapshot)
        })
    }
}
