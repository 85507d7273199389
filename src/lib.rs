#![forbid(unsafe_code)]

//! Live web dashboard backend for AFD: HOST_CONFIG codec and store, the
//! WebSocket session protocol, live status publishing and the reconnecting
//! dashboard client.

pub mod afd_config;
pub mod client;
pub mod config;
pub mod engine;
pub mod errors;
pub mod files;
pub mod hostconfig;
pub mod session;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
