//! Client for connecting to the control socket

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::net::UnixStream;
use tracing::debug;

use crate::{ControlError, Request, Response, ResponsePayload, Result, frame};

pub struct ControlClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl ControlClient {
    #[must_use]
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send a request and wait for its response.
    ///
    /// Error responses from the server come back as
    /// [`ControlError::ServerError`].
    pub async fn send_request(&self, request: Request) -> Result<Response> {
        tokio::time::timeout(self.timeout, self.exchange(request))
            .await
            .map_err(|_| ControlError::Timeout)?
    }

    async fn exchange(&self, request: Request) -> Result<Response> {
        debug!("Connecting to control socket: {}", self.socket_path.display());
        let mut stream = UnixStream::connect(&self.socket_path).await?;

        frame::write(&mut stream, &request).await?;
        let response: Response = frame::read(&mut stream).await?;

        if !response.is_version_compatible() {
            return Err(ControlError::Protocol(format!(
                "Incompatible protocol version: server={}, client={}",
                response.version,
                crate::PROTOCOL_VERSION
            )));
        }

        if let ResponsePayload::Error(ref err) = response.payload {
            return Err(ControlError::ServerError(err.clone()));
        }

        Ok(response)
    }

    /// Fails early with a readable message when the daemon is not running.
    pub fn check_socket_exists(&self) -> Result<()> {
        if Path::new(&self.socket_path).exists() {
            Ok(())
        } else {
            Err(ControlError::InvalidSocketPath(format!(
                "Socket does not exist: {}",
                self.socket_path.display()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_defaults() {
        let client = ControlClient::new("/tmp/test.sock");
        assert_eq!(client.socket_path, PathBuf::from("/tmp/test.sock"));
        assert_eq!(client.timeout, Duration::from_secs(10));

        let client = client.with_timeout(Duration::from_secs(5));
        assert_eq!(client.timeout, Duration::from_secs(5));
    }

    #[test]
    fn missing_socket_is_reported() {
        let client = ControlClient::new("/nonexistent/postbox.sock");
        assert!(matches!(
            client.check_socket_exists(),
            Err(ControlError::InvalidSocketPath(_))
        ));
    }
}
