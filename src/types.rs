//! Core types shared by the peer directory, the handshake and the RPC surface
//!
//! External shapes (JSON on the wire and in the HTTP API) use camelCase field
//! names and hex-encoded digests. Internally digests are raw bytes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Helper module for serializing [u8; 32] digests as hex strings
mod hash_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(data: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        hex::encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        if bytes.len() != 32 {
            return Err(serde::de::Error::custom("broadhash must be 32 bytes"));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(arr)
    }
}

// =============================================================================
// PRIMITIVE TYPES
// =============================================================================

/// Chain height
pub type BlockHeight = u64;

/// Length in bytes of a broadhash digest
pub const BROADHASH_LEN: usize = 32;

/// Digest summarizing a node's current view of the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Broadhash(#[serde(with = "hash_serde")] pub [u8; BROADHASH_LEN]);

impl Broadhash {
    /// Parse a broadhash from its hex representation
    pub fn from_hex(s: &str) -> Result<Self, String> {
        let bytes = hex::decode(s).map_err(|e| format!("invalid hex: {}", e))?;
        if bytes.len() != BROADHASH_LEN {
            return Err(format!(
                "expected {} bytes, got {}",
                BROADHASH_LEN,
                bytes.len()
            ));
        }
        let mut arr = [0u8; BROADHASH_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Broadhash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// =============================================================================
// PEER RECORD
// =============================================================================

/// Connectivity status of a known peer
///
/// Serialized as its integer code so that stored and transmitted records keep
/// the numeric representation used across the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PeerState {
    Banned = 0,
    Disconnected = 1,
    Connected = 2,
}

impl From<PeerState> for u8 {
    fn from(state: PeerState) -> Self {
        state as u8
    }
}

impl TryFrom<u8> for PeerState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PeerState::Banned),
            1 => Ok(PeerState::Disconnected),
            2 => Ok(PeerState::Connected),
            other => Err(format!("unknown peer state: {}", other)),
        }
    }
}

/// One entry of the peer directory, in its external shape
///
/// `(ip, ws_port)` is the natural key. `broadhash` is hex here and raw bytes
/// once stored; `None` means unknown and is never confused with a zero digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerRecord {
    /// Dotted network address
    pub ip: String,

    /// Port the peer's transport listens on
    pub ws_port: u16,

    /// Connectivity status
    pub state: PeerState,

    /// Last known chain height of the peer
    #[serde(default)]
    pub height: BlockHeight,

    /// Peer operating system (informational)
    #[serde(default)]
    pub os: Option<String>,

    /// Peer software version (informational)
    #[serde(default)]
    pub version: Option<String>,

    /// Timestamp of last observation (milliseconds since epoch)
    #[serde(default)]
    pub clock: Option<i64>,

    /// Peer's broadhash, hex encoded
    #[serde(default)]
    pub broadhash: Option<String>,
}

impl PeerRecord {
    /// Natural key of this record
    pub fn key(&self) -> (String, u16) {
        (self.ip.clone(), self.ws_port)
    }

    /// Fold a handshake seed for the same peer into this stored record
    ///
    /// The seed refreshes state, version and clock. Height never moves
    /// backwards, and os and broadhash already known are kept.
    pub fn absorb_seed(self, seed: &PeerRecord) -> PeerRecord {
        PeerRecord {
            state: seed.state,
            height: self.height.max(seed.height),
            os: self.os.or_else(|| seed.os.clone()),
            version: seed.version.clone().or(self.version),
            clock: seed.clock.or(self.clock),
            broadhash: self.broadhash.or_else(|| seed.broadhash.clone()),
            ..self
        }
    }
}

// =============================================================================
// CHAIN STATE
// =============================================================================

/// Local chain height and broadhash as they existed at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub height: BlockHeight,
    pub broadhash: Broadhash,
}
