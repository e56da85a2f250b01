//! Control protocol for administering a running postbox daemon.
//!
//! Requests travel over a Unix domain socket, one request and one response
//! per connection, each a bincode document behind a 4-byte big-endian
//! length prefix.

pub mod client;
pub mod error;
mod frame;
pub mod protocol;
pub mod server;

pub use client::ControlClient;
pub use error::{ControlError, Result};
pub use protocol::{
    DrainSummary, MessageSummary, PROTOCOL_VERSION, QueueCommand, Request, RequestCommand,
    Response, ResponseData, ResponsePayload, SystemCommand, SystemInfo, UserCommand, UserDetails,
    UserSummary,
};
pub use server::{CommandHandler, ControlServer};

/// Default path for the control socket
pub const DEFAULT_CONTROL_SOCKET: &str = "/tmp/postbox.sock";
