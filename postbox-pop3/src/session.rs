use std::{net::SocketAddr, sync::Arc};

use postbox_common::{Signal, error::SessionError, incoming, internal, outgoing};
use postbox_store::ServerContext;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    sync::broadcast::{Receiver, error::RecvError},
};

use crate::{fsm::AccessSession, reply::Reply};

/// One accepted mailbox-access connection.
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
        outgoing!("{}", reply.to_string().trim_end());
        self.stream.write_all(reply.to_string().as_bytes()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    #[tracing::instrument(level = tracing::Level::TRACE, skip_all, fields(peer = %self.peer))]
    pub async fn run(mut self, mut signal: Receiver<Signal>) -> Result<(), SessionError> {
        let context = self
            .context
            .take()
            .ok_or_else(|| SessionError::Protocol("no server context attached".to_string()))?;
        let _active = context.pop3_connections().enter();
        let mut access = AccessSession::new(context, Arc::clone(&self.banner));

        internal!("Connected");
        self.send(&access.greeting()).await?;

        let mut line = String::new();
        loop {
            line.clear();

            tokio::select! {
                sig = signal.recv() => {
                    if matches!(sig, Ok(Signal::Shutdown) | Err(RecvError::Closed)) {
                        self.send(&Reply::err("Server shutting down")).await?;
                        internal!("Closed by shutdown in state {}", access.state().name());
                        return Ok(());
                    }
                }

                read = self.stream.read_line(&mut line) => {
                    if read? == 0 {
                        internal!("Peer closed connection in state {}", access.state().name());
                        return Ok(());
                    }

                    let command = line.trim_end_matches(['\r', '\n']);
                    incoming!("{}", crate::command::Command::from(command));

                    let reply = access.handle(command).await;
                    self.send(&reply).await?;

                    if access.is_finished() {
                        internal!("Connection closed");
                        return Ok(());
                    }
                }
            }
        }
    }
}
