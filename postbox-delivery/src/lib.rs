//! Moves accepted messages out of the delivery queue.
//!
//! A drain pass walks every pending delivery and handles each recipient on
//! its own: server-local recipients get the message appended to their
//! mailbox, everyone else is relayed over SMTP, either to the recipient's
//! own host (network-local) or to the configured relay host.

mod error;
mod format;
mod processor;
mod transport;

pub use error::DeliveryError;
pub use format::{local_message, relay_payload, trace_header};
pub use processor::{DeliveryProcessor, DrainReport, Removal};
pub use transport::RelayTransport;
