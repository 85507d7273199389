//! Protocol scheme classes derived from live status.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// CSS classes for one protocol name. Unknown protocols map to nothing.
#[must_use]
pub fn scheme_class(protocol: &str) -> Option<&'static str> {
    match protocol.to_ascii_uppercase().as_str() {
        "FTP" => Some(".scheme-remote.scheme-ftp"),
        "SFTP" | "SCP" => Some(".scheme-remote.scheme-sftp"),
        "HTTP" | "SMTP" | "WMO" => Some(".scheme-remote"),
        "FILE" | "LOC" | "EXEC" => Some(".scheme-local"),
        _ => None,
    }
}

/// Last known protocol list per host alias.
///
/// Written by the live status loop after each successful poll and read when
/// a host configuration is served.
#[derive(Debug, Clone, Default)]
pub struct ProtocolIndex {
    inner: Arc<RwLock<HashMap<String, Vec<String>>>>,
}

impl ProtocolIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole index with a fresh snapshot.
    pub fn replace(&self, snapshot: HashMap<String, Vec<String>>) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = snapshot;
    }

    /// Protocols last reported for `alias`.
    #[must_use]
    pub fn protocols_of(&self, alias: &str) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(alias)
            .cloned()
            .unwrap_or_default()
    }

    /// Space separated scheme classes for `alias`, empty when unknown.
    #[must_use]
    pub fn class_for(&self, alias: &str) -> String {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .get(alias)
            .map(|protocols| {
                protocols
                    .iter()
                    .filter_map(|p| scheme_class(p))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default()
    }
}
