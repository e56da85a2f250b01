use std::net::SocketAddr;

use futures_util::future::join_all;
use serde::Deserialize;
use tokio::{net::TcpListener, sync::broadcast::error::RecvError};

use crate::{
    Signal,
    error::{ListenerError, ProtocolError},
    internal,
    traits::protocol::{Protocol, SessionHandler},
};

/// Accepts connections on one socket and runs a session per connection.
#[derive(Deserialize)]
pub struct Listener<Proto: Protocol> {
    #[serde(skip)]
    handler: Proto,
    socket: SocketAddr,
    #[serde(default)]
    args: Proto::Args,
}

impl<Proto: Protocol> Listener<Proto> {
    #[must_use]
    pub fn new(socket: SocketAddr, args: Proto::Args) -> Self {
        Self {
            handler: Proto::default(),
            socket,
            args,
        }
    }

    #[must_use]
    pub const fn socket(&self) -> SocketAddr {
        self.socket
    }

    /// Attach runtime state that configuration cannot carry.
    #[must_use]
    pub fn map_args(mut self, map: impl FnOnce(Proto::Args) -> Proto::Args) -> Self {
        self.args = map(self.args);
        self
    }

    #[tracing::instrument(skip(self), fields(protocol = Proto::ty()))]
    pub fn init(&mut self) -> Result<(), ProtocolError> {
        self.handler.validate(&mut self.args)
    }

    #[tracing::instrument(level = tracing::Level::TRACE, skip(self, shutdown), fields(protocol = Proto::ty()))]
    pub async fn serve(
        &self,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), ListenerError> {
        internal!(level = INFO, "Serving {} on {}", Proto::ty(), self.socket);

        let mut sessions = Vec::default();
        let listener =
            TcpListener::bind(self.socket)
                .await
                .map_err(|source| ListenerError::BindFailed {
                    address: self.socket.to_string(),
                    source,
                })?;

        loop {
            tokio::select! {
                sig = shutdown.recv() => {
                    if matches!(sig, Ok(Signal::Shutdown) | Err(RecvError::Closed)) {
                        internal!(level = INFO, "{} Listener {} Received Shutdown signal, finishing sessions ...", Proto::ty(), self.socket);
                        join_all(sessions).await;
                        return Ok(());
                    }
                }

                connection = listener.accept() => {
                    let (stream, peer) = connection?;
                    tracing::debug!("Connection received on {} from {peer}", self.socket);

                    sessions.retain(|session: &tokio::task::JoinHandle<()>| !session.is_finished());

                    let handler = self.handler.handle(stream, peer, self.args.clone());
                    let signal = shutdown.resubscribe();

                    sessions.push(tokio::spawn(async move {
                        if let Err(err) = handler.run(signal).await {
                            internal!(level = ERROR, "Error: {err}");
                        }
                    }));
                }
            }
        }
    }
}
