//! Outbound side of the relay: drives a peer submission server through one
//! sender/recipient transfer.
//!
//! [`RelayState`] is a pure state machine fed with the peer's status codes;
//! [`RelayClient`] owns the socket and writes whatever command the machine
//! asks for.

mod error;
mod fsm;
mod relay;

pub use error::{ClientError, Result};
pub use fsm::{ClientCommand, RelayState, RelayTransaction};
pub use relay::{RelayClient, RelayOutcome};
