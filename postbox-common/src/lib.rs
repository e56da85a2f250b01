pub mod address;
pub mod connections;
pub mod controller;
pub mod error;
pub mod listener;
pub mod logging;
pub mod status;
pub mod traits;

pub use tracing;

/// Broadcast to every listener, session and background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
