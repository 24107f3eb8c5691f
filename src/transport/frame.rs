//! Transport framing
//!
//! Each frame is a 4-byte big-endian length followed by a JSON body.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::rpc::RpcResponse;

/// Error type for transport operations
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Timed out waiting for peer")]
    Timeout,

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("Response id {got} does not match request id {expected}")]
    CorrelationMismatch { expected: u64, got: u64 },

    #[error("Response to {0} has the wrong shape")]
    UnexpectedResponse(String),
}

/// First frame on every connection: the identity query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeFrame {
    pub query: Option<String>,
}

/// Server answer to the handshake
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeAck {
    pub accepted: bool,
    pub error: Option<String>,
}

impl HandshakeAck {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            error: None,
        }
    }

    pub fn rejected(reason: impl ToString) -> Self {
        Self {
            accepted: false,
            error: Some(reason.to_string()),
        }
    }
}

/// RPC call, `id` correlates it with its response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: u64,
    pub procedure: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: u64,
    pub result: RpcResponse,
}

/// Write one frame
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes =
        serde_json::to_vec(message).map_err(|e| TransportError::InvalidFrame(e.to_string()))?;
    let len_bytes = (bytes.len() as u32).to_be_bytes();

    writer.write_all(&len_bytes).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;

    Ok(())
}

/// Read one frame. `None` means the peer closed the connection between frames.
pub async fn read_frame<R, T>(reader: &mut R, max_size: usize) -> Result<Option<T>, TransportError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let size = u32::from_be_bytes(len_buf) as usize;
    if size > max_size {
        return Err(TransportError::FrameTooLarge {
            size,
            max: max_size,
        });
    }

    let mut body = vec![0u8; size];
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            TransportError::ConnectionClosed
        } else {
            e.into()
        }
    })?;

    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|e| TransportError::InvalidFrame(e.to_string()))
}
