//! Control server implementation

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use postbox_common::Signal;
use tokio::{
    net::{UnixListener, UnixStream},
    sync::broadcast::{self, error::RecvError},
};
use tracing::{debug, error, info, trace, warn};

use crate::{ControlError, Request, Response, Result, frame};

/// Handler trait for processing control requests
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// An `Err` is sent back to the client as an error response.
    async fn handle_request(&self, request: Request) -> Result<Response>;
}

/// Serves control requests on a Unix domain socket
pub struct ControlServer {
    socket_path: PathBuf,
    handler: Arc<dyn CommandHandler>,
}

impl ControlServer {
    #[must_use]
    pub fn new(socket_path: impl Into<PathBuf>, handler: Arc<dyn CommandHandler>) -> Self {
        Self {
            socket_path: socket_path.into(),
            handler,
        }
    }

    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accept requests until a shutdown signal is received.
    ///
    /// A leftover socket file from a dead process is replaced; a live one is
    /// an error.
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) -> Result<()> {
        let socket_path = self.socket_path.as_path();
        if socket_path.exists() {
            if UnixStream::connect(socket_path).await.is_ok() {
                return Err(ControlError::Io(std::io::Error::new(
                    std::io::ErrorKind::AddrInUse,
                    format!(
                        "Socket already in use by running instance: {}",
                        socket_path.display()
                    ),
                )));
            }

            info!("Removing stale socket file: {}", socket_path.display());
            tokio::fs::remove_file(socket_path).await?;
        }

        let listener = UnixListener::bind(socket_path)?;

        #[cfg(unix)]
        {
            let metadata = tokio::fs::metadata(socket_path).await?;
            let mut perms = metadata.permissions();
            perms.set_mode(0o600);
            tokio::fs::set_permissions(socket_path, perms).await?;
        }
        info!("Control server listening on {}", socket_path.display());

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let handler = Arc::clone(&self.handler);
                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(stream, handler).await {
                                    error!("Error handling control connection: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            error!("Error accepting control connection: {e}");
                        }
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown) | Err(RecvError::Closed) => {
                            info!("Control server shutting down");
                            break;
                        }
                        Err(RecvError::Lagged(_)) => {}
                    }
                }
            }
        }

        if socket_path.exists() {
            debug!("Removing socket file: {}", socket_path.display());
            if let Err(e) = tokio::fs::remove_file(socket_path).await {
                warn!("Failed to remove {}: {e}", socket_path.display());
            }
        }

        Ok(())
    }

    async fn handle_connection(
        mut stream: UnixStream,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<()> {
        let timeout = Duration::from_secs(30);

        let request: Request = tokio::time::timeout(timeout, frame::read(&mut stream))
            .await
            .map_err(|_| ControlError::Timeout)??;

        trace!("Received request: {request:?}");

        let response = if request.is_version_compatible() {
            match handler.handle_request(request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Error handling request: {e}");
                    Response::error(e.to_string())
                }
            }
        } else {
            Response::error(format!(
                "Incompatible protocol version: client={}, server={}",
                request.version,
                crate::PROTOCOL_VERSION
            ))
        };

        trace!("Sending response: {response:?}");

        tokio::time::timeout(timeout, frame::write(&mut stream, &response))
            .await
            .map_err(|_| ControlError::Timeout)??;

        Ok(())
    }
}
