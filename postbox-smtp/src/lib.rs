pub mod client;
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

pub use crate::{
    client::{RelayClient, RelayOutcome},
    fsm::SubmissionSession,
    reply::Reply,
    session::Session,
    state::State,
};

const DEFAULT_BANNER: &str = "postbox SMTP server";

#[derive(Default, Deserialize)]
pub struct Smtp;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SmtpArgs {
    banner: Option<String>,
    #[serde(skip)]
    context: Option<Arc<ServerContext>>,
}

impl SmtpArgs {
    #[must_use]
    pub fn builder() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = Some(banner.into());
        self
    }

    /// Set the server context sessions enqueue into
    #[must_use]
    pub fn with_context(mut self, context: Arc<ServerContext>) -> Self {
        self.context = Some(context);
        self
    }
}

impl Protocol for Smtp {
    type Session = Session<TcpStream>;
    type Args = SmtpArgs;

    fn ty() -> &'static str {
        "SMTP"
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
