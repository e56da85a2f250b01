use std::net::SocketAddr;

use futures_util::future::try_join_all;
use serde::Deserialize;
use tokio::sync::broadcast::Receiver;

use crate::{
    Signal, error::ControllerError, internal, listener::Listener, traits::protocol::Protocol,
};

/// Every listener configured for one protocol.
#[derive(Deserialize)]
#[serde(transparent)]
pub struct Controller<Proto: Protocol> {
    listeners: Vec<Listener<Proto>>,
}

impl<Proto: Protocol> Default for Controller<Proto> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }
}

impl<Proto: Protocol> Controller<Proto> {
    #[must_use]
    pub const fn new(listeners: Vec<Listener<Proto>>) -> Self {
        Self { listeners }
    }

    #[must_use]
    pub fn listeners(&self) -> &[Listener<Proto>] {
        &self.listeners
    }

    /// Listen on `socket` with default arguments if nothing was configured.
    #[must_use]
    pub fn or_listen_on(mut self, socket: SocketAddr) -> Self {
        if self.listeners.is_empty() {
            self.listeners
                .push(Listener::new(socket, Proto::Args::default()));
        }
        self
    }

    /// Map over the args of all listeners, for runtime state that cannot be
    /// deserialized.
    #[must_use]
    pub fn map_args<F>(mut self, f: F) -> Self
    where
        F: Fn(Proto::Args) -> Proto::Args,
    {
        self.listeners = self
            .listeners
            .into_iter()
            .map(|listener| listener.map_args(&f))
            .collect();
        self
    }

    pub fn init(&mut self) -> Result<(), ControllerError> {
        internal!("Initialising Controller for {}", Proto::ty());

        self.listeners
            .iter_mut()
            .try_for_each(Listener::init)
            .map_err(ControllerError::from)
    }

    /// Serve every listener until shutdown. The first listener to fail ends
    /// the lot.
    #[tracing::instrument(level = tracing::Level::TRACE, skip_all, fields(protocol = Proto::ty()))]
    pub async fn control(self, signal: Receiver<Signal>) -> Result<(), ControllerError> {
        try_join_all(
            self.listeners
                .iter()
                .map(|listener| listener.serve(signal.resubscribe())),
        )
        .await?;

        Ok(())
    }
}
