//! WebSocket session layer: message envelope, channels, dispatch, the live
//! status publisher and the HTTP listener.

pub mod channel;
pub mod dispatch;
pub mod heartbeat;
pub mod message;
pub mod publisher;
pub mod search;
pub mod server;

pub use channel::{ChannelClass, ChannelPool, ChannelState, Outbound, SessionChannel};
pub use message::{MessageClass, SessionMessage};
pub use publisher::LiveStatusPublisher;
pub use server::{router, serve, AppState};
