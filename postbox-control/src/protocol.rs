//! Control protocol types

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Current protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// Request sent to the control server (versioned wrapper)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub version: u32,
    pub command: RequestCommand,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RequestCommand {
    System(SystemCommand),
    Queue(QueueCommand),
    User(UserCommand),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SystemCommand {
    Ping,
    /// Configuration and live counters
    Info,
    /// Set the online flag, or just report it when `None`
    Online(Option<bool>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QueueCommand {
    /// Number of pending deliveries
    Length,
    /// Run a drain pass now
    Flush,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserCommand {
    List,
    Show(String),
    Add { name: String, password: String },
    /// Clear a stuck owner lock
    Reset(String),
    /// Fetch one message, numbered from 1
    Retrieve { name: String, message: usize },
}

/// Response from the control server (versioned wrapper)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub version: u32,
    pub payload: ResponsePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponsePayload {
    /// Command succeeded
    Ok,
    /// Command succeeded with data
    Data(Box<ResponseData>),
    /// Command failed with error message
    Error(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponseData {
    SystemInfo(SystemInfo),
    Online(bool),
    QueueLength(usize),
    Drain(DrainSummary),
    Users(Vec<UserSummary>),
    User(UserDetails),
    /// Simple string message
    Message(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub version: String,
    pub hostname: String,
    pub online: bool,
    pub pop3_connections: usize,
    pub smtp_connections: usize,
    pub pop3_socket: String,
    pub smtp_socket: String,
    pub queue_length: usize,
    pub drain_interval_ms: u64,
    pub network_pattern: String,
    pub relay_host: String,
    pub relay_port: u16,
}

impl Display for SystemInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Version:        {}", self.version)?;
        writeln!(f, "Hostname:       {}", self.hostname)?;
        writeln!(
            f,
            "Online:         {}",
            if self.online { "yes" } else { "no" }
        )?;
        writeln!(
            f,
            "POP3:           {} ({} connected)",
            self.pop3_socket, self.pop3_connections
        )?;
        writeln!(
            f,
            "SMTP:           {} ({} connected)",
            self.smtp_socket, self.smtp_connections
        )?;
        writeln!(f, "Queue:          {} pending", self.queue_length)?;
        writeln!(f, "Drain interval: {}ms", self.drain_interval_ms)?;
        writeln!(f, "Network:        {}", self.network_pattern)?;
        write!(f, "Relay:          {}:{}", self.relay_host, self.relay_port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainSummary {
    pub attempted: usize,
    pub delivered: usize,
    pub removed: usize,
    pub skipped: bool,
}

impl Display for DrainSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.skipped {
            return f.write_str("A drain pass is already running");
        }

        write!(
            f,
            "Attempted {}, delivered {}, removed {} from the queue",
            self.attempted, self.delivered, self.removed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub name: String,
    pub messages: usize,
    pub locked: bool,
}

impl Display for UserSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:<14} {:>5} messages", self.name, self.messages)?;
        if self.locked {
            f.write_str("  [in use]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub size: usize,
    pub marked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetails {
    pub name: String,
    pub locked: bool,
    pub messages: Vec<MessageSummary>,
}

impl Display for UserDetails {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "User:     {}", self.name)?;
        writeln!(f, "In use:   {}", if self.locked { "yes" } else { "no" })?;
        write!(f, "Messages: {}", self.messages.len())?;

        for (i, message) in self.messages.iter().enumerate() {
            write!(f, "\n  {:>3}  {:>8} bytes", i + 1, message.size)?;
            if message.marked {
                f.write_str("  (marked)")?;
            }
        }

        Ok(())
    }
}

impl Request {
    /// Create a new request with the current protocol version
    #[must_use]
    pub const fn new(command: RequestCommand) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            command,
        }
    }

    #[must_use]
    pub const fn is_version_compatible(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}

impl Response {
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload: ResponsePayload::Error(message.into()),
        }
    }

    #[must_use]
    pub const fn ok() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload: ResponsePayload::Ok,
        }
    }

    #[must_use]
    pub fn data(data: ResponseData) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload: ResponsePayload::Data(Box::new(data)),
        }
    }

    /// Check if the response indicates success (not an error)
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self.payload, ResponsePayload::Error(_))
    }

    #[must_use]
    pub const fn is_version_compatible(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}
