//! Global configuration parsing and validation.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Largest output limit accepted for a single collaborator invocation.
pub const MAX_OUTPUT_LIMIT_MB: u64 = 10;

/// Poll and heartbeat timing.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimingConfig {
    /// Interval between live status broadcasts.
    #[serde(default = "default_fsa_poll_interval_ms")]
    pub fsa_poll_interval_ms: u64,
    /// Interval between server-side ping sweeps.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            fsa_poll_interval_ms: default_fsa_poll_interval_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }
}

impl TimingConfig {
    /// Live status poll interval.
    #[must_use]
    pub fn fsa_poll_interval(&self) -> Duration {
        Duration::from_millis(self.fsa_poll_interval_ms)
    }

    /// Server-side heartbeat interval.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

fn default_fsa_poll_interval_ms() -> u64 {
    2000
}

fn default_heartbeat_interval_ms() -> u64 {
    10_000
}

/// External tool invocation settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ExecConfig {
    /// Seconds before a collaborator process is killed.
    #[serde(default = "default_exec_timeout")]
    pub timeout_seconds: u64,
    /// Maximum stdout size in MiB before the process is killed.
    #[serde(default = "default_output_limit_mb")]
    pub output_limit_mb: u64,
    /// Directory with canned `dummy.<cmd>.txt` outputs; replaces real execution.
    #[serde(default)]
    pub mock_dir: Option<PathBuf>,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_exec_timeout(),
            output_limit_mb: default_output_limit_mb(),
            mock_dir: None,
        }
    }
}

fn default_exec_timeout() -> u64 {
    30
}

fn default_output_limit_mb() -> u64 {
    1
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_http_port() -> u16 {
    8040
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// AFD work directory; holds `etc/`, `log/`, `archive/` and `fifodir/`.
    pub afd_work_dir: PathBuf,
    /// Address the HTTP/WebSocket listener binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    /// Port the HTTP/WebSocket listener binds to.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Comment block prepended to every rewritten HOST_CONFIG.
    ///
    /// When unset the header found in the current file is kept.
    #[serde(default)]
    pub host_config_header: Option<PathBuf>,
    /// PID file written on start and read by `stop`.
    #[serde(default)]
    pub pid_file: Option<PathBuf>,
    /// Poll and heartbeat timing.
    #[serde(default)]
    pub timing: TimingConfig,
    /// External tool invocation settings.
    #[serde(default)]
    pub exec: ExecConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration with defaults for everything but the work dir.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the work dir does not exist.
    pub fn for_work_dir(afd_work_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut config = Self {
            afd_work_dir: afd_work_dir.into(),
            bind_address: default_bind_address(),
            http_port: default_http_port(),
            host_config_header: None,
            pid_file: None,
            timing: TimingConfig::default(),
            exec: ExecConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Replace the work dir and re-validate.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the new work dir does not exist.
    pub fn override_work_dir(&mut self, afd_work_dir: PathBuf) -> Result<()> {
        self.afd_work_dir = afd_work_dir;
        self.validate()
    }

    /// Socket address for the listener.
    #[must_use]
    pub fn bind(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.http_port)
    }

    /// `<work_dir>/etc`.
    #[must_use]
    pub fn etc_dir(&self) -> PathBuf {
        self.afd_work_dir.join("etc")
    }

    /// `<work_dir>/log`.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.afd_work_dir.join("log")
    }

    /// `<work_dir>/archive`.
    #[must_use]
    pub fn archive_dir(&self) -> PathBuf {
        self.afd_work_dir.join("archive")
    }

    /// Path to the HOST_CONFIG store.
    #[must_use]
    pub fn host_config_path(&self) -> PathBuf {
        self.etc_dir().join("HOST_CONFIG")
    }

    /// Effective PID file path.
    #[must_use]
    pub fn pid_file_path(&self) -> PathBuf {
        self.pid_file
            .clone()
            .unwrap_or_else(|| self.afd_work_dir.join("fifodir").join("webui.pid"))
    }

    fn validate(&mut self) -> Result<()> {
        if self.timing.fsa_poll_interval_ms == 0 {
            return Err(AppError::Config(
                "fsa_poll_interval_ms must be greater than zero".into(),
            ));
        }

        if self.timing.heartbeat_interval_ms == 0 {
            return Err(AppError::Config(
                "heartbeat_interval_ms must be greater than zero".into(),
            ));
        }

        self.exec.output_limit_mb = self.exec.output_limit_mb.clamp(1, MAX_OUTPUT_LIMIT_MB);

        let canonical_root = self
            .afd_work_dir
            .canonicalize()
            .map_err(|err| AppError::Config(format!("afd_work_dir invalid: {err}")))?;
        self.afd_work_dir = canonical_root;

        Ok(())
    }
}
