use std::{fmt::Debug, net::SocketAddr};

use serde::Deserialize;
use tokio::net::TcpStream;

use crate::{
    Signal,
    error::{ProtocolError, SessionError},
};

pub trait SessionHandler {
    fn run(
        self,
        signal: tokio::sync::broadcast::Receiver<Signal>,
    ) -> impl std::future::Future<Output = Result<(), SessionError>> + Send;
}

pub trait Protocol: Default + Send + Sync {
    type Session: SessionHandler + Send + 'static;
    type Args: Default + Clone + Debug + Send + Sync + for<'a> Deserialize<'a>;

    fn handle(&self, stream: TcpStream, address: SocketAddr, args: Self::Args) -> Self::Session;

    ///
    /// Validate the arguments being provided to the protocol
    ///
    /// # Errors
    /// When a required runtime dependency was never attached to the arguments,
    /// or a configured value cannot be used.
    ///
    fn validate(&mut self, args: &mut Self::Args) -> Result<(), ProtocolError>;

    fn ty() -> &'static str;
}
