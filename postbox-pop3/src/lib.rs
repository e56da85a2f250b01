pub mod command;
pub mod fsm;
pub mod reply;
pub mod session;
pub mod state;

use std::{net::SocketAddr, sync::Arc};

use postbox_common::{
    Signal,
    error::{ProtocolError, SessionError},
    traits::protocol::{Protocol, SessionHandler},
};
use postbox_store::ServerContext;
use serde::Deserialize;
use tokio::net::TcpStream;

pub use crate::{fsm::AccessSession, reply::Reply, session::Session, state::State};

const DEFAULT_BANNER: &str = "POP3 server";

#[derive(Default, Deserialize)]
pub struct Pop3;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Pop3Args {
    banner: Option<String>,
    #[serde(skip)]
    context: Option<Arc<ServerContext>>,
}

impl Pop3Args {
    #[must_use]
    pub fn builder() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = Some(banner.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: Arc<ServerContext>) -> Self {
        self.context = Some(context);
        self
    }
}

impl Protocol for Pop3 {
    type Session = Session<TcpStream>;
    type Args = Pop3Args;

    fn ty() -> &'static str {
        "POP3"
    }

    #[tracing::instrument(level = tracing::Level::TRACE, skip(self, stream, args))]
    fn handle(&self, stream: TcpStream, peer: SocketAddr, args: Self::Args) -> Self::Session {
        Session::create(
            stream,
            peer,
            args.context,
            args.banner.as_deref().unwrap_or(DEFAULT_BANNER).into(),
        )
    }

    fn validate(&mut self, args: &mut Self::Args) -> Result<(), ProtocolError> {
        if args.context.is_none() {
            return Err(ProtocolError::MissingField("context"));
        }

        if args.banner.as_deref().is_some_and(|banner| banner.contains(['\r', '\n'])) {
            return Err(ProtocolError::InvalidConfiguration {
                field: "banner".to_string(),
                reason: "must be a single line".to_string(),
            });
        }

        Ok(())
    }
}

impl SessionHandler for Session<TcpStream> {
    async fn run(self, signal: tokio::sync::broadcast::Receiver<Signal>) -> Result<(), SessionError> {
        Self::run(self, signal).await
    }
}
