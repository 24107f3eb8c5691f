//! Session state machine
//!
//! ```text
//! Pending ──judge──► Accepted ──close──► Closed
//!    │
//!    └──────judge──► Rejected ──close──► Closed
//! ```
//!
//! Only an `Accepted` session may be served. The judgment happens exactly once.

use std::net::SocketAddr;

use crate::handshake::{Admission, HandshakeValidator, RejectReason};
use crate::types::{PeerRecord, PeerState};

/// Lifecycle of one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Identity received, not yet judged
    Pending,

    /// Handshake passed, RPC calls may be served
    Accepted(Admission),

    /// Handshake failed, connection is being torn down
    Rejected(RejectReason),

    /// Torn down
    Closed,
}

/// One peer connection as seen by the server
#[derive(Debug)]
pub struct Session {
    remote: SocketAddr,
    state: SessionState,
}

impl Session {
    pub fn pending(remote: SocketAddr) -> Self {
        Self {
            remote,
            state: SessionState::Pending,
        }
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Run the handshake judgment and move out of `Pending`
    pub fn judge(
        &mut self,
        validator: &HandshakeValidator,
        query: Option<&str>,
    ) -> Result<(), RejectReason> {
        if self.state != SessionState::Pending {
            return Err(RejectReason::AlreadyJudged);
        }

        match validator.judge(query) {
            Ok(admission) => {
                self.state = SessionState::Accepted(admission);
                Ok(())
            }
            Err(reason) => {
                self.state = SessionState::Rejected(reason.clone());
                Err(reason)
            }
        }
    }

    /// Admission of a servable session
    pub fn admission(&self) -> Option<&Admission> {
        match &self.state {
            SessionState::Accepted(admission) => Some(admission),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.admission().is_some()
    }

    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    /// Directory entry seeded from the handshake, if this is a real peer
    ///
    /// The seed only carries what the handshake tells us; height and
    /// broadhash stay unknown until the peer is queried.
    pub fn peer_seed(&self) -> Option<PeerRecord> {
        match self.admission()? {
            Admission::Peer(identity) => Some(PeerRecord {
                ip: self.remote.ip().to_string(),
                ws_port: identity.port,
                state: PeerState::Connected,
                height: 0,
                os: None,
                version: Some(identity.version.to_string()),
                clock: Some(chrono::Utc::now().timestamp_millis()),
                broadhash: None,
            }),
            Admission::SelfProbe => None,
        }
    }
}
