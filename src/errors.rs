//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Numeric reply status codes carried by error replies on the session channel.
pub mod status {
    /// Referenced file or host does not exist.
    pub const NOT_FOUND: u16 = 404;
    /// Inbound frame could not be parsed.
    pub const NOT_ACCEPTABLE: u16 = 406;
    /// Collaborator output exceeded the configured limit.
    pub const PAYLOAD_TOO_LARGE: u16 = 413;
    /// Host configuration request could not be satisfied.
    pub const NOT_SATISFIABLE: u16 = 416;
    /// Any other failure.
    pub const ERROR: u16 = 500;
}

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// HOST_CONFIG read or write failure.
    HostConfig(String),
    /// Session channel failure (closed channel, send after close).
    Session(String),
    /// External tool failed to start, timed out, or exited non-zero.
    Exec(String),
    /// External tool produced more output than allowed.
    PayloadTooLarge(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// File system path failed validation against its base directory.
    PathViolation(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Malformed message on the session channel.
    Protocol(String),
}

impl AppError {
    /// Reply status code used when this error is reported to a client.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::HostConfig(_) => status::NOT_SATISFIABLE,
            Self::NotFound(_) => status::NOT_FOUND,
            Self::PayloadTooLarge(_) => status::PAYLOAD_TOO_LARGE,
            Self::Protocol(_) => status::NOT_ACCEPTABLE,
            Self::Config(_)
            | Self::Session(_)
            | Self::Exec(_)
            | Self::PathViolation(_)
            | Self::Io(_) => status::ERROR,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::HostConfig(msg) => write!(f, "host config: {msg}"),
            Self::Session(msg) => write!(f, "session: {msg}"),
            Self::Exec(msg) => write!(f, "exec: {msg}"),
            Self::PayloadTooLarge(msg) => write!(f, "payload too large: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::PathViolation(msg) => write!(f, "path violation: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(err.to_string())
        } else {
            Self::Io(err.to_string())
        }
    }
}

impl From<regex::Error> for AppError {
    fn from(err: regex::Error) -> Self {
        Self::Protocol(format!("invalid pattern: {err}"))
    }
}
