//! Control command tables.

use super::runner::Invocation;

/// Host-level action run through `afdcmd` against an alias list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasCommand {
    /// Start queue and transfer.
    Start,
    /// Stop queue and transfer.
    Stop,
    /// Toggle enable/disable.
    Able,
    /// Toggle debug.
    Debug,
    /// Toggle trace.
    Trace,
    /// Toggle full trace.
    FullTrace,
    /// Switch host.
    Switch,
    /// Retry now.
    Retry,
}

impl AliasCommand {
    /// Parse the `action` of an alias-class message.
    #[must_use]
    pub fn from_action(action: &str) -> Option<Self> {
        Some(match action {
            "start" => Self::Start,
            "stop" => Self::Stop,
            "able" => Self::Able,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            "fulltrace" => Self::FullTrace,
            "switch" => Self::Switch,
            "retry" => Self::Retry,
            _ => return None,
        })
    }

    /// `afdcmd` flags for this action.
    #[must_use]
    pub fn flags(self) -> &'static [&'static str] {
        match self {
            Self::Start => &["-t", "-q"],
            Self::Stop => &["-T", "-Q"],
            Self::Able => &["-X"],
            Self::Debug => &["-d"],
            Self::Trace => &["-c"],
            Self::FullTrace => &["-C"],
            Self::Switch => &["-s"],
            Self::Retry => &["-r"],
        }
    }

    /// Invocation for `aliases`.
    #[must_use]
    pub fn invocation(self, aliases: &[String]) -> Invocation {
        let args = self
            .flags()
            .iter()
            .map(|flag| (*flag).to_owned())
            .chain(aliases.iter().cloned());
        Invocation::engine("afdcmd", args)
    }
}

/// Engine-wide control action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfdCommand {
    /// Toggle the AMG process.
    AmgToggle,
    /// Toggle the FD process.
    FdToggle,
    /// Reload DIR_CONFIG.
    DirConfigUpdate,
    /// Reload HOST_CONFIG.
    HostConfigUpdate,
    /// Start the engine.
    AfdStart,
    /// Stop the engine.
    AfdStop,
}

impl AfdCommand {
    /// Parse the `(action, command)` pair of an afd-class message.
    #[must_use]
    pub fn from_message(action: &str, command: &str) -> Option<Self> {
        Some(match (action, command) {
            ("amg", "toggle") => Self::AmgToggle,
            ("fd", "toggle") => Self::FdToggle,
            ("dc", "update") => Self::DirConfigUpdate,
            ("hc", "update") => Self::HostConfigUpdate,
            ("afd", "start") => Self::AfdStart,
            ("afd", "stop") => Self::AfdStop,
            _ => return None,
        })
    }

    /// Invocation for this action.
    #[must_use]
    pub fn invocation(self) -> Invocation {
        let (program, args): (&str, &[&str]) = match self {
            Self::AmgToggle => ("afdcmd", &["-Y"]),
            Self::FdToggle => ("afdcmd", &["-Z"]),
            Self::DirConfigUpdate => ("udc", &[]),
            Self::HostConfigUpdate => ("uhc", &[]),
            Self::AfdStart => ("afd", &["-a"]),
            Self::AfdStop => ("afd", &["-s"]),
        };
        Invocation::engine(program, args.iter().copied())
    }
}

/// `get_dc_data -h <alias>`: DIR_CONFIG entries referencing a host.
#[must_use]
pub fn dir_config_for(alias: &str) -> Invocation {
    Invocation::engine("get_dc_data", ["-h", alias])
}
