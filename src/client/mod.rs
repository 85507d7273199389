//! Dashboard-side connection handling.

pub mod command;
pub mod supervisor;
pub mod ws;

pub use command::{send_alias_command, CommandOutcome};
pub use supervisor::{
    ClientFrame, Connection, Connector, Flow, Outcome, ReconnectPolicy, ReconnectSupervisor,
    SessionHandler, SupervisorState,
};
pub use ws::WsConnector;
