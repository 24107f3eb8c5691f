//! Peer Directory Module
//!
//! Durable table of known peers, keyed by `(ip, wsPort)` and stored in RocksDB.
//! Writes come from the discovery task; the RPC `list` call only reads.

mod schema;
mod storage;

pub use schema::PeerSchema;
pub use storage::PeerDirectory;

use crate::types::PeerRecord;

/// Errors raised by the peer directory
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Malformed record at index {index}: {reason}")]
    MalformedRecord { index: usize, reason: String },

    #[error("Corrupt record under key {key}: {reason}")]
    CorruptRecord { key: String, reason: String },
}

impl From<rocksdb::Error> for DirectoryError {
    fn from(e: rocksdb::Error) -> Self {
        DirectoryError::StorageUnavailable(e.to_string())
    }
}

/// Storage contract for the peer directory
///
/// Implementations must make `insert_batch` and `clear` atomic with respect
/// to `list`: a reader sees either the state before a write or after it.
pub trait PeerStore: Send + Sync {
    /// All known peers, in no particular order
    fn list(&self) -> Result<Vec<PeerRecord>, DirectoryError>;

    /// Remove every peer. Clearing an empty directory is not an error.
    fn clear(&self) -> Result<(), DirectoryError>;

    /// Upsert a batch of peers by `(ip, wsPort)`
    ///
    /// Fails with `MalformedRecord` before writing anything if a single
    /// record is invalid. Returns the number of rows written.
    fn insert_batch(&self, peers: &[PeerRecord]) -> Result<usize, DirectoryError>;

    /// Record handshake seeds in one batch
    ///
    /// A seed for an unknown `(ip, wsPort)` is inserted as is. A seed for a
    /// known peer is folded into the stored row with
    /// [`PeerRecord::absorb_seed`] instead of replacing it.
    fn merge_seeds(&self, seeds: &[PeerRecord]) -> Result<usize, DirectoryError>;

    /// Number of stored peers
    fn len(&self) -> Result<usize, DirectoryError>;
}
