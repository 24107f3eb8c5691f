//! Peer row layout
//!
//! Built once at startup and shared by reference with the store. Converts
//! between the external `PeerRecord` shape and the stored row.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::types::{BlockHeight, PeerRecord, PeerState, BROADHASH_LEN};

/// Key prefix for peer rows
const PREFIX_PEER: &str = "peer:";

/// Stored form of a peer (bincode)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPeer {
    ip: String,
    ws_port: u16,
    state: u8,
    height: BlockHeight,
    os: Option<String>,
    version: Option<String>,
    clock: Option<i64>,
    #[serde(with = "serde_bytes")]
    broadhash: Option<Vec<u8>>,
}

/// Row layout and validation rules for the peer directory
#[derive(Debug, Clone)]
pub struct PeerSchema {
    key_prefix: Vec<u8>,
    broadhash_len: usize,
}

impl Default for PeerSchema {
    fn default() -> Self {
        Self {
            key_prefix: PREFIX_PEER.as_bytes().to_vec(),
            broadhash_len: BROADHASH_LEN,
        }
    }
}

impl PeerSchema {
    pub fn key_prefix(&self) -> &[u8] {
        &self.key_prefix
    }

    /// Exclusive upper bound of the key range holding peer rows
    pub fn key_range_end(&self) -> Vec<u8> {
        let mut end = self.key_prefix.clone();
        if let Some(last) = end.last_mut() {
            *last += 1;
        }
        end
    }

    /// Validate a record and produce its `(key, value)` row
    pub fn encode(&self, record: &PeerRecord) -> Result<(Vec<u8>, Vec<u8>), String> {
        let ip: IpAddr = record
            .ip
            .parse()
            .map_err(|_| format!("invalid ip address {:?}", record.ip))?;

        if record.ws_port == 0 {
            return Err("wsPort must be non-zero".to_string());
        }

        let broadhash = self.decode_broadhash(record.broadhash.as_deref())?;

        let row = StoredPeer {
            ip: ip.to_string(),
            ws_port: record.ws_port,
            state: record.state.into(),
            height: record.height,
            os: record.os.clone(),
            version: record.version.clone(),
            clock: record.clock,
            broadhash,
        };

        let value = bincode::serialize(&row).map_err(|e| format!("serialization failed: {}", e))?;
        Ok((self.peer_key(&ip, record.ws_port), value))
    }

    /// Decode a stored row back into its external shape
    pub fn decode(&self, value: &[u8]) -> Result<PeerRecord, String> {
        let row: StoredPeer = bincode::deserialize(value).map_err(|e| e.to_string())?;

        let state = PeerState::try_from(row.state)?;

        let broadhash = match row.broadhash {
            Some(bytes) if bytes.len() != self.broadhash_len => {
                return Err(format!("stored broadhash has {} bytes", bytes.len()));
            }
            Some(bytes) => Some(hex::encode(bytes)),
            None => None,
        };

        Ok(PeerRecord {
            ip: row.ip,
            ws_port: row.ws_port,
            state,
            height: row.height,
            os: row.os,
            version: row.version,
            clock: row.clock,
            broadhash,
        })
    }

    /// Hex to raw bytes. Absent or empty means unknown.
    ///
    /// Either hex case is accepted; only the bytes are stored, so the digest
    /// is always listed back in lowercase.
    fn decode_broadhash(&self, value: Option<&str>) -> Result<Option<Vec<u8>>, String> {
        match value {
            None | Some("") => Ok(None),
            Some(hex_str) => {
                let bytes = hex::decode(hex_str)
                    .map_err(|e| format!("broadhash is not valid hex: {}", e))?;
                if bytes.len() != self.broadhash_len {
                    return Err(format!(
                        "broadhash must be {} bytes, got {}",
                        self.broadhash_len,
                        bytes.len()
                    ));
                }
                Ok(Some(bytes))
            }
        }
    }

    fn peer_key(&self, ip: &IpAddr, ws_port: u16) -> Vec<u8> {
        let mut key = self.key_prefix.clone();
        key.extend_from_slice(format!("{}:{}", ip, ws_port).as_bytes());
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(broadhash: Option<&str>) -> PeerRecord {
        PeerRecord {
            ip: "192.168.1.10".to_string(),
            ws_port: 5000,
            state: PeerState::Disconnected,
            height: 7,
            os: None,
            version: Some("0.9.1".to_string()),
            clock: None,
            broadhash: broadhash.map(str::to_string),
        }
    }

    #[test]
    fn test_encode_decode_keeps_fields() {
        let schema = PeerSchema::default();
        let hash = "0f".repeat(32);
        let input = record(Some(&hash));

        let (key, value) = schema.encode(&input).unwrap();
        assert_eq!(key, b"peer:192.168.1.10:5000".to_vec());

        let decoded = schema.decode(&value).unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn test_empty_broadhash_is_null() {
        let schema = PeerSchema::default();
        let (_, value) = schema.encode(&record(Some(""))).unwrap();
        let decoded = schema.decode(&value).unwrap();
        assert!(decoded.broadhash.is_none());
    }

    #[test]
    fn test_zero_digest_is_not_null() {
        let schema = PeerSchema::default();
        let zero = "00".repeat(32);
        let (_, value) = schema.encode(&record(Some(&zero))).unwrap();
        let decoded = schema.decode(&value).unwrap();
        assert_eq!(decoded.broadhash, Some(zero));
    }

    #[test]
    fn test_rejects_malformed_fields() {
        let schema = PeerSchema::default();

        assert!(schema.encode(&record(Some("xyz"))).is_err());
        assert!(schema.encode(&record(Some("abcd"))).is_err());

        let mut bad_ip = record(None);
        bad_ip.ip = "not-an-ip".to_string();
        assert!(schema.encode(&bad_ip).is_err());

        let mut bad_port = record(None);
        bad_port.ws_port = 0;
        assert!(schema.encode(&bad_port).is_err());
    }

    #[test]
    fn test_uppercase_broadhash_lists_lowercase() {
        let schema = PeerSchema::default();
        let upper = "AB".repeat(32);

        let (_, value) = schema.encode(&record(Some(&upper))).unwrap();
        let decoded = schema.decode(&value).unwrap();
        assert_eq!(decoded.broadhash, Some("ab".repeat(32)));
    }

    #[test]
    fn test_key_range_end() {
        let schema = PeerSchema::default();
        assert_eq!(schema.key_range_end(), b"peer;".to_vec());
    }
}
