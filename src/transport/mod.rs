//! Peer Transport
//!
//! TCP listener for peer sessions.
//!
//! ## Protocol
//!
//! 1. Peer connects and sends a `HandshakeFrame` with its identity query
//! 2. Node judges the identity and answers with a `HandshakeAck`
//! 3. On rejection the node closes the connection right away
//! 4. On acceptance the peer sends `RequestFrame`s; each gets a
//!    `ResponseFrame` carrying the same `id`
//!
//! Frames are length-prefixed JSON (see [`frame`]).

mod client;
pub mod frame;

pub use client::PeerClient;
pub use frame::TransportError;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::api::Metrics;
use crate::config::NodeConfig;
use crate::discovery::DiscoverySender;
use crate::handshake::HandshakeValidator;
use crate::rpc::RpcDispatcher;
use crate::session::Session;
use frame::{read_frame, write_frame, HandshakeAck, HandshakeFrame, RequestFrame, ResponseFrame};

/// Everything a connection task needs, shared read-only
pub struct TransportContext {
    pub config: Arc<NodeConfig>,
    pub validator: Arc<HandshakeValidator>,
    pub dispatcher: Arc<RpcDispatcher>,
    pub metrics: Arc<Metrics>,
    pub discovery: DiscoverySender,
}

/// Bind the transport listener from config
pub async fn bind(config: &NodeConfig) -> anyhow::Result<TcpListener> {
    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.ws_port).parse()?;
    Ok(TcpListener::bind(addr).await?)
}

/// Run the accept loop
pub async fn run_server(listener: TcpListener, ctx: Arc<TransportContext>) -> anyhow::Result<()> {
    info!("🔌 Peer transport listening on {}", listener.local_addr()?);

    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                let ctx = ctx.clone();

                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, peer_addr, ctx).await {
                        debug!("Connection error from {}: {}", peer_addr, e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Handle a single peer connection
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    ctx: Arc<TransportContext>,
) -> Result<(), TransportError> {
    let max_frame = ctx.config.max_frame_size;
    let timeout = Duration::from_secs(ctx.config.connection_timeout_secs);
    let mut session = Session::pending(peer_addr);

    let hello: Option<HandshakeFrame> =
        tokio::time::timeout(timeout, read_frame(&mut stream, max_frame))
            .await
            .map_err(|_| TransportError::Timeout)??;

    let hello = match hello {
        Some(hello) => hello,
        None => {
            debug!("{} closed before handshake", peer_addr);
            return Ok(());
        }
    };

    if let Err(reason) = session.judge(&ctx.validator, hello.query.as_deref()) {
        ctx.metrics.inc_handshakes_rejected();
        warn!("🚫 Handshake from {} rejected: {}", peer_addr, reason);

        // Nothing else is kept for this connection; the stream drops on return
        write_frame(&mut stream, &HandshakeAck::rejected(&reason)).await?;
        return Ok(());
    }

    ctx.metrics.inc_handshakes_accepted();
    write_frame(&mut stream, &HandshakeAck::accepted()).await?;

    match session.peer_seed() {
        Some(seed) => {
            info!("🤝 Peer {}:{} connected", seed.ip, seed.ws_port);
            if ctx.discovery.send(seed).is_err() {
                debug!("Discovery channel closed, peer not recorded");
            }
        }
        None => debug!("Self-probe session from {}", peer_addr),
    }

    ctx.metrics.session_opened();
    let result = serve_session(&mut stream, &session, &ctx).await;
    session.close();
    ctx.metrics.session_closed();

    debug!("Session with {} closed", peer_addr);
    result
}

/// Answer calls in the order they arrive until the peer hangs up
async fn serve_session(
    stream: &mut TcpStream,
    session: &Session,
    ctx: &TransportContext,
) -> Result<(), TransportError> {
    loop {
        let request: RequestFrame = match read_frame(stream, ctx.config.max_frame_size).await? {
            Some(request) => request,
            None => return Ok(()),
        };

        let result = ctx.dispatcher.handle(session, &request.procedure).await;
        ctx.metrics.record_rpc(result.is_success());

        write_frame(stream, &ResponseFrame {
            id: request.id,
            result,
        })
        .await?;
    }
}
