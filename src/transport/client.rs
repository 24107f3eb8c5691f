//! Outbound peer connection
//!
//! Opens a session on a remote node, then issues RPC calls one at a time.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use super::frame::{
    read_frame, write_frame, HandshakeAck, HandshakeFrame, RequestFrame, ResponseFrame,
    TransportError,
};
use crate::rpc::{Procedure, RpcResponse};

/// Time allowed for any single reply
const REPLY_TIMEOUT_SECS: u64 = 30;

/// Largest reply accepted from a remote node
const MAX_REPLY_SIZE: usize = 16 * 1024 * 1024;

/// Client side of an accepted session
pub struct PeerClient {
    stream: TcpStream,
    remote: SocketAddr,
    next_id: u64,
}

impl PeerClient {
    /// Connect and perform the handshake. `query` is the identity query string.
    pub async fn connect(addr: SocketAddr, query: Option<String>) -> Result<Self, TransportError> {
        let mut stream = TcpStream::connect(addr).await?;

        write_frame(&mut stream, &HandshakeFrame { query }).await?;

        let ack: HandshakeAck = read_reply(&mut stream).await?;
        if !ack.accepted {
            return Err(TransportError::HandshakeRejected(
                ack.error.unwrap_or_else(|| "no reason given".to_string()),
            ));
        }

        debug!("Session established with {}", addr);

        Ok(Self {
            stream,
            remote: addr,
            next_id: 1,
        })
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Call a remote procedure and wait for its response
    pub async fn call(&mut self, procedure: &str) -> Result<RpcResponse, TransportError> {
        let id = self.next_id;
        self.next_id += 1;

        let request = RequestFrame {
            id,
            procedure: procedure.to_string(),
        };
        write_frame(&mut self.stream, &request).await?;

        let response: ResponseFrame = read_reply(&mut self.stream).await?;
        if response.id != id {
            return Err(TransportError::CorrelationMismatch {
                expected: id,
                got: response.id,
            });
        }

        // Names this client does not know may come back in any shape
        if let Ok(expected) = procedure.parse::<Procedure>() {
            if !response.result.answers(expected) {
                return Err(TransportError::UnexpectedResponse(procedure.to_string()));
            }
        }

        Ok(response.result)
    }

    /// Close the session
    pub async fn disconnect(mut self) -> Result<(), TransportError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

async fn read_reply<T: serde::de::DeserializeOwned>(
    stream: &mut TcpStream,
) -> Result<T, TransportError> {
    let timeout = Duration::from_secs(REPLY_TIMEOUT_SECS);

    tokio::time::timeout(timeout, read_frame(stream, MAX_REPLY_SIZE))
        .await
        .map_err(|_| TransportError::Timeout)??
        .ok_or(TransportError::ConnectionClosed)
}
