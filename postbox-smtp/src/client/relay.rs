use postbox_common::{incoming, internal, outgoing, status::Status, traits::fsm::FiniteStateMachine};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
};

use super::{
    error::{ClientError, Result},
    fsm::{RelayState, RelayTransaction},
};

/// How a relay attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The peer accepted the message body.
    Delivered,
    /// The conversation ended without the body being accepted.
    Rejected {
        state: RelayState,
        last_reply: Option<String>,
    },
}

impl RelayOutcome {
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Hands one message for one recipient to a peer submission server.
#[derive(Debug, Clone)]
pub struct RelayClient {
    hostname: String,
}

impl RelayClient {
    /// `hostname` is announced in `HELO`.
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
        }
    }

    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Connect to `host:port` and relay `payload`.
    ///
    /// `sender` and `recipient` are bare `local@domain` addresses.
    #[tracing::instrument(level = tracing::Level::DEBUG, skip(self, payload))]
    pub async fn deliver(
        &self,
        host: &str,
        port: u16,
        sender: &str,
        recipient: &str,
        payload: &str,
    ) -> Result<RelayOutcome> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|source| ClientError::Connect {
                address: format!("{host}:{port}"),
                source,
            })?;

        self.deliver_over(stream, sender, recipient, payload).await
    }

    /// Run the relay conversation over an already connected stream.
    pub async fn deliver_over<S>(
        &self,
        stream: S,
        sender: &str,
        recipient: &str,
        payload: &str,
    ) -> Result<RelayOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut stream = BufReader::new(stream);
        let mut tx = RelayTransaction::new(self.hostname.as_str(), sender, recipient, payload);
        let mut state = RelayState::default();
        let mut last_reply = None;
        let mut line = String::new();

        while !state.is_final() {
            line.clear();
            if stream.read_line(&mut line).await? == 0 {
                internal!(level = DEBUG, "Peer closed connection in state {state:?}");
                break;
            }

            let reply = line.trim_end_matches(['\r', '\n']);
            incoming!("{reply}");

            if reply.as_bytes().get(3) == Some(&b'-') {
                continue;
            }

            state = state.transition(Status::from_reply(reply), &mut tx);
            last_reply = Some(reply.to_string());

            if let Some(command) = tx.outgoing.take() {
                outgoing!("{command}");
                stream
                    .write_all(format!("{command}\r\n").as_bytes())
                    .await?;
                stream.flush().await?;
            }
        }

        if tx.accepted {
            Ok(RelayOutcome::Delivered)
        } else {
            Ok(RelayOutcome::Rejected { state, last_reply })
        }
    }
}
