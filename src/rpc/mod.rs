//! RPC Dispatcher
//!
//! Routes named calls arriving on an accepted session to the chain state and
//! the peer directory. Nothing here mutates shared state, so calls are safe
//! to issue back-to-back or concurrently from many sessions.

mod types;

pub use types::{
    FailureResponse, HeightResponse, ListResponse, PingResponse, RpcResponse, StatusResponse,
};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::chain::ChainState;
use crate::directory::PeerStore;
use crate::session::Session;

/// Remote procedures a peer can call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Procedure {
    Ping,
    Height,
    Status,
    List,
}

impl Procedure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Procedure::Ping => "ping",
            Procedure::Height => "height",
            Procedure::Status => "status",
            Procedure::List => "list",
        }
    }
}

impl FromStr for Procedure {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ping" => Ok(Procedure::Ping),
            "height" => Ok(Procedure::Height),
            "status" => Ok(Procedure::Status),
            "list" => Ok(Procedure::List),
            other => Err(RpcError::UnknownProcedure(other.to_string())),
        }
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("session not ready")]
    SessionNotReady,

    #[error("unknown procedure: {0}")]
    UnknownProcedure(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl RpcError {
    pub fn code(&self) -> &'static str {
        match self {
            RpcError::SessionNotReady => "SessionNotReady",
            RpcError::UnknownProcedure(_) => "UnknownProcedure",
            RpcError::StorageUnavailable(_) => "StorageUnavailable",
        }
    }

    /// Structured failure response for this error
    pub fn to_failure(&self) -> RpcResponse {
        RpcResponse::failure(self.code(), self.to_string())
    }
}

/// Answers RPC calls for accepted sessions
pub struct RpcDispatcher {
    store: Arc<dyn PeerStore>,
    chain: Arc<dyn ChainState>,
}

impl RpcDispatcher {
    pub fn new(store: Arc<dyn PeerStore>, chain: Arc<dyn ChainState>) -> Self {
        Self { store, chain }
    }

    /// Dispatch a call by name
    pub async fn dispatch(&self, session: &Session, name: &str) -> Result<RpcResponse, RpcError> {
        if !session.is_ready() {
            return Err(RpcError::SessionNotReady);
        }

        let procedure: Procedure = name.parse()?;
        debug!("RPC {} from {}", procedure, session.remote());

        self.call(procedure).await
    }

    /// Dispatch a call and fold any error into a failure response
    pub async fn handle(&self, session: &Session, name: &str) -> RpcResponse {
        match self.dispatch(session, name).await {
            Ok(response) => response,
            Err(e) => {
                warn!("RPC {:?} from {} failed: {}", name, session.remote(), e);
                e.to_failure()
            }
        }
    }

    async fn call(&self, procedure: Procedure) -> Result<RpcResponse, RpcError> {
        match procedure {
            Procedure::Ping => Ok(RpcResponse::ping()),

            Procedure::Height => {
                let snapshot = self.chain.snapshot().await;
                Ok(RpcResponse::height(snapshot.height))
            }

            Procedure::Status => {
                let snapshot = self.chain.snapshot().await;
                Ok(RpcResponse::status(snapshot.height, snapshot.broadhash.to_hex()))
            }

            Procedure::List => {
                let peers = self
                    .store
                    .list()
                    .map_err(|e| RpcError::StorageUnavailable(e.to_string()))?;
                Ok(RpcResponse::list(peers))
            }
        }
    }
}
