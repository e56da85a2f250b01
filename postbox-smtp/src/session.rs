use std::{net::SocketAddr, sync::Arc};

use postbox_common::{Signal, error::SessionError, incoming, internal, outgoing, status::Status};
use postbox_store::ServerContext;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    sync::broadcast::{Receiver, error::RecvError},
};

use crate::{State, fsm::SubmissionSession, reply::Reply};

/// One accepted mail-submission connection.
pub struct Session<Stream: AsyncRead + AsyncWrite + Unpin + Send> {
    peer: SocketAddr,
    stream: BufReader<Stream>,
    context: Option<Arc<ServerContext>>,
    banner: Arc<str>,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Session<Stream> {
    pub fn create(
        stream: Stream,
        peer: SocketAddr,
        context: Option<Arc<ServerContext>>,
        banner: Arc<str>,
    ) -> Self {
        Self {
            peer,
            stream: BufReader::new(stream),
            context,
            banner,
        }
    }

    async fn send(&mut self, reply: &Reply) -> Result<(), SessionError> {
        outgoing!("{reply}");
        self.stream
            .write_all(format!("{reply}\r\n").as_bytes())
            .await?;
        self.stream.flush().await?;
        Ok(())
    }

    #[tracing::instrument(level = tracing::Level::TRACE, skip_all, fields(peer = %self.peer))]
    pub async fn run(mut self, mut signal: Receiver<Signal>) -> Result<(), SessionError> {
        let context = self
            .context
            .take()
            .ok_or_else(|| SessionError::Protocol("no server context attached".to_string()))?;
        let _active = context.smtp_connections().enter();
        let mut submission =
            SubmissionSession::new(context, self.peer.ip(), Arc::clone(&self.banner));

        internal!("Connected");
        self.send(&submission.greeting()).await?;

        let mut line = String::new();
        loop {
            line.clear();

            tokio::select! {
                sig = signal.recv() => {
                    if matches!(sig, Ok(Signal::Shutdown) | Err(RecvError::Closed)) {
                        self.send(&Reply::new(Status::Unavailable, "Server shutting down")).await?;
                        internal!("Closed by shutdown in state {:?}", submission.state());
                        return Ok(());
                    }
                }

                read = self.stream.read_line(&mut line) => {
                    if read? == 0 {
                        internal!("Peer closed connection in state {:?}", submission.state());
                        return Ok(());
                    }

                    let text = line.trim_end_matches(['\r', '\n']);
                    if submission.state() == State::Data {
                        incoming!(level = TRACE, "{} body bytes", text.len());
                    } else {
                        incoming!("{text}");
                    }

                    if let Some(reply) = submission.handle(text) {
                        self.send(&reply).await?;
                    }

                    if submission.is_finished() {
                        internal!("Connection closed");
                        return Ok(());
                    }
                }
            }
        }
    }
}
