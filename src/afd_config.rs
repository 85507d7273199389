//! Read-only snapshot of the engine's `etc/AFD_CONFIG`.
//!
//! Loaded once at startup and shared by reference. Keys may repeat; every
//! occurrence is kept in file order.

use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use crate::files::read_latin1;
use crate::{AppError, Result};

/// Parsed `AFD_CONFIG` key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AfdConfig {
    entries: HashMap<String, Vec<String>>,
}

impl AfdConfig {
    /// Load `<work_dir>/etc/AFD_CONFIG`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read.
    pub fn load(work_dir: &Path) -> Result<Self> {
        let path = work_dir.join("etc").join("AFD_CONFIG");
        let text = read_latin1(&path).map_err(|err| {
            AppError::Config(format!("cannot read {}: {err}", path.display()))
        })?;
        let config = Self::parse(&text);
        info!(keys = config.entries.len(), "AFD_CONFIG parsed");
        Ok(config)
    }

    /// Parse the `KEY value...` line format. Blank lines, comments and
    /// lines starting with whitespace are skipped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut entries: HashMap<String, Vec<String>> = HashMap::new();
        for line in text.lines() {
            if line.is_empty() || line.starts_with('#') || line.starts_with(char::is_whitespace)
            {
                continue;
            }
            let (key, value) = match line.split_once(char::is_whitespace) {
                Some((key, value)) => (key, value.trim()),
                None => (line, ""),
            };
            entries
                .entry(key.to_owned())
                .or_default()
                .push(value.to_owned());
        }
        Self { entries }
    }

    /// First value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// All values for `key`, in file order.
    #[must_use]
    pub fn get_all(&self, key: &str) -> &[String] {
        self.entries.get(key).map_or(&[], Vec::as_slice)
    }

    /// File name patterns under `etc/` that the dashboard may edit.
    #[must_use]
    pub fn editable_file_patterns(&self) -> Vec<String> {
        let mut patterns = vec!["group.list".to_owned()];
        let rename_rules = self.get_all("RENAME_RULE_NAME");
        if rename_rules.is_empty() {
            patterns.push("rename.rule".to_owned());
        } else {
            patterns.extend(rename_rules.iter().cloned());
        }
        patterns.extend(self.get_all("DIR_CONFIG_NAME").iter().cloned());
        patterns
    }
}
