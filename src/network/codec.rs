//! Length-prefixed bincode framing shared by both directions of a link.
//!
//! Frame layout: a 4-byte big-endian body length followed by the body.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::NetworkError;

pub const MAX_FRAME_LEN: usize = 64 * 1024;

pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), NetworkError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| NetworkError::Encode(e.to_string()))?;
    if body.len() > MAX_FRAME_LEN {
        return Err(NetworkError::FrameTooLarge(body.len()));
    }

    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);

    writer.write_all(&frame).await.map_err(NetworkError::Send)?;
    writer.flush().await.map_err(NetworkError::Send)
}

/// Read one frame. `Ok(None)` means the stream ended cleanly between frames.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, NetworkError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    let n = reader
        .read(&mut len_buf[..1])
        .await
        .map_err(NetworkError::Recv)?;
    if n == 0 {
        return Ok(None);
    }
    reader
        .read_exact(&mut len_buf[1..])
        .await
        .map_err(NetworkError::Recv)?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(NetworkError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(NetworkError::Recv)?;

    let (value, _) = bincode::serde::decode_from_slice(&body, bincode::config::standard())
        .map_err(|e| NetworkError::Decode(e.to_string()))?;
    Ok(Some(value))
}
