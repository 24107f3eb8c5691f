//! Peer Handshake
//!
//! Every inbound connection carries an identity query string:
//!
//! ```text
//! port=4002&nethash=198f...783d&version=0.9.0&nonce=ABCD
//! ```
//!
//! The validator judges it against the local node identity before a single
//! RPC call is served. Judgment is pure: no I/O, no shared mutable state, so
//! every connection task can call it concurrently through a shared reference.
//!
//! ## Rules
//!
//! 1. No query at all: rejected, no further checks
//! 2. `nethash` must equal ours exactly
//! 3. `version` must be at least the configured minimum
//! 4. `nonce` equal to ours is a self-connection: rejected, unless the
//!    identity is marked `probe=self`, which is served but never registered

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Length of the per-process nonce
pub const NONCE_LENGTH: usize = 16;

/// Query value marking an explicit self-probe
const SELF_PROBE: &str = "self";

/// Why a handshake was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("no identity attached to connection")]
    MissingIdentity,

    #[error("invalid handshake field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("network mismatch: expected {expected}, got {actual}")]
    NetworkMismatch { expected: String, actual: String },

    #[error("incompatible version {version} (minimum {minimum})")]
    IncompatibleVersion { version: String, minimum: String },

    #[error("connection from own nonce")]
    SelfConnection,

    #[error("handshake already judged")]
    AlreadyJudged,
}

// =============================================================================
// VERSIONS
// =============================================================================

/// Node software version: `MAJOR.MINOR.PATCH` with an optional trailing
/// lowercase build letter (`0.9.0a`). A lettered build sorts after the bare
/// release it extends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: Option<char>,
}

impl FromStr for NodeVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (numbers, build) = match s.chars().last() {
            Some(c) if c.is_ascii_lowercase() => (&s[..s.len() - 1], Some(c)),
            _ => (s, None),
        };

        let parts: Vec<&str> = numbers.split('.').collect();
        if parts.len() != 3 {
            return Err(format!("expected MAJOR.MINOR.PATCH, got {:?}", s));
        }

        let parse = |part: &str| {
            part.parse::<u32>()
                .map_err(|_| format!("invalid version component {:?}", part))
        };

        Ok(Self {
            major: parse(parts[0])?,
            minor: parse(parts[1])?,
            patch: parse(parts[2])?,
            build,
        })
    }
}

impl fmt::Display for NodeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(build) = self.build {
            write!(f, "{}", build)?;
        }
        Ok(())
    }
}

// =============================================================================
// IDENTITIES
// =============================================================================

/// Identity this node judges incoming connections against
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    pub nethash: String,
    pub min_version: NodeVersion,
    pub nonce: String,
    pub port: u16,
}

/// Identity advertised by a connecting node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeIdentity {
    /// Network the remote believes it belongs to
    pub nethash: String,

    /// Remote software version
    pub version: NodeVersion,

    /// Remote per-process token
    pub nonce: String,

    /// Remote listening port
    pub port: u16,

    /// Set when the remote asks to be served as a self-probe
    pub self_probe: bool,
}

impl HandshakeIdentity {
    /// Parse the connection query string
    pub fn from_query(query: &str) -> Result<Self, RejectReason> {
        let mut nethash = None;
        let mut version = None;
        let mut nonce = None;
        let mut port = None;
        let mut self_probe = false;

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "nethash" => nethash = Some(value.into_owned()),
                "version" => version = Some(value.into_owned()),
                "nonce" => nonce = Some(value.into_owned()),
                "port" => port = Some(value.into_owned()),
                "probe" => self_probe = value == SELF_PROBE,
                _ => {}
            }
        }

        let nethash = required("nethash", nethash)?;
        let nonce = required("nonce", nonce)?;

        let version = required("version", version)?
            .parse::<NodeVersion>()
            .map_err(|reason| RejectReason::InvalidField { field: "version", reason })?;

        let port = required("port", port)?
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| RejectReason::InvalidField {
                field: "port",
                reason: "expected a port between 1 and 65535".to_string(),
            })?;

        Ok(Self {
            nethash,
            version,
            nonce,
            port,
            self_probe,
        })
    }

    /// Render as a connection query string
    pub fn to_query(&self) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query
            .append_pair("port", &self.port.to_string())
            .append_pair("nethash", &self.nethash)
            .append_pair("version", &self.version.to_string())
            .append_pair("nonce", &self.nonce);
        if self.self_probe {
            query.append_pair("probe", SELF_PROBE);
        }
        query.finish()
    }
}

fn required(field: &'static str, value: Option<String>) -> Result<String, RejectReason> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(RejectReason::InvalidField {
            field,
            reason: "missing".to_string(),
        }),
    }
}

/// Outcome of an accepted handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// A distinct peer, eligible for registration
    Peer(HandshakeIdentity),

    /// This node talking to itself through a public address
    SelfProbe,
}

// =============================================================================
// VALIDATOR
// =============================================================================

/// Judges connection identities against the local node identity
#[derive(Debug, Clone)]
pub struct HandshakeValidator {
    local: LocalIdentity,
}

impl HandshakeValidator {
    pub fn new(local: LocalIdentity) -> Self {
        Self { local }
    }

    pub fn local(&self) -> &LocalIdentity {
        &self.local
    }

    /// Accept or reject a connection from its query string
    pub fn judge(&self, query: Option<&str>) -> Result<Admission, RejectReason> {
        let query = match query {
            Some(q) if !q.trim().is_empty() => q,
            _ => return Err(RejectReason::MissingIdentity),
        };

        let identity = HandshakeIdentity::from_query(query)?;

        if identity.nethash != self.local.nethash {
            return Err(RejectReason::NetworkMismatch {
                expected: self.local.nethash.clone(),
                actual: identity.nethash,
            });
        }

        if identity.version.cmp(&self.local.min_version) == Ordering::Less {
            return Err(RejectReason::IncompatibleVersion {
                version: identity.version.to_string(),
                minimum: self.local.min_version.to_string(),
            });
        }

        if identity.nonce == self.local.nonce {
            if identity.self_probe {
                return Ok(Admission::SelfProbe);
            }
            return Err(RejectReason::SelfConnection);
        }

        Ok(Admission::Peer(identity))
    }
}

/// Generate a fresh per-process nonce
pub fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LENGTH)
        .map(char::from)
        .collect()
}
