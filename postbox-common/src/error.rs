//! Error types shared by the protocol crates and the daemon.

use std::io;

use thiserror::Error;

/// Errors that can occur during protocol validation.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A required configuration field is missing.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A configuration value is invalid.
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("I/O error during validation: {0}")]
    Io(#[from] io::Error),
}

/// Errors that can end a client session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection error: {0}")]
    Connection(#[from] io::Error),

    /// Shutdown signal received.
    #[error("Shutdown requested")]
    Shutdown,
}

impl SessionError {
    /// Returns `true` if the error indicates a graceful shutdown.
    #[must_use]
    pub const fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }
}

/// Errors that can occur in the listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Failed to bind to {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to accept connection: {0}")]
    AcceptFailed(#[from] io::Error),
}

/// Errors that can occur in the controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Protocol validation failed: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Listener error: {0}")]
    Listener(#[from] ListenerError),
}
