//! Length-prefixed bincode framing shared by client and server.

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{ControlError, Result};

/// Frames larger than this are refused before allocating.
pub const MAX_FRAME_SIZE: u32 = 10_000_000;

pub async fn read<T, S>(stream: &mut S) -> Result<T>
where
    T: DeserializeOwned,
    S: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ControlError::ConnectionClosed
        } else {
            ControlError::Io(e)
        }
    })?;

    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_SIZE {
        return Err(ControlError::Protocol(format!(
            "Frame too large: {len} bytes (max {MAX_FRAME_SIZE})"
        )));
    }

    let mut bytes = vec![0u8; len as usize];
    stream.read_exact(&mut bytes).await?;

    let (value, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::legacy())?;
    Ok(value)
}

pub async fn write<T, S>(stream: &mut S, value: &T) -> Result<()>
where
    T: Serialize,
    S: AsyncWrite + Unpin,
{
    let bytes = bincode::serde::encode_to_vec(value, bincode::config::legacy())?;
    let len = u32::try_from(bytes.len())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(&bytes).await?;
    stream.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Request, RequestCommand, SystemCommand};

    #[tokio::test]
    async fn oversized_frame_is_refused() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client
            .write_all(&(MAX_FRAME_SIZE + 1).to_be_bytes())
            .await
            .unwrap();

        let result: Result<Request> = read(&mut server).await;
        assert!(matches!(result, Err(ControlError::Protocol(_))));
    }

    #[tokio::test]
    async fn early_close_is_reported() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);

        let result: Result<Request> = read(&mut server).await;
        assert!(matches!(result, Err(ControlError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn frames_survive_a_stream() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write(
            &mut client,
            &Request::new(RequestCommand::System(SystemCommand::Online(Some(false)))),
        )
        .await
        .unwrap();

        let request: Request = read(&mut server).await.unwrap();
        assert!(matches!(
            request.command,
            RequestCommand::System(SystemCommand::Online(Some(false)))
        ));
    }
}
