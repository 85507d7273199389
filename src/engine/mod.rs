//! Interface to the file-transfer engine's command-line collaborators.

pub mod commands;
pub mod host_info;
pub mod logs;
pub mod runner;
pub mod status;

pub use commands::{AfdCommand, AliasCommand};
pub use host_info::HostInfo;
pub use runner::{Invocation, ToolOutput, ToolRunner};
pub use status::{FsaViewSource, HostStatus, StatusSource};
