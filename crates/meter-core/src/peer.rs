//! Peer identity: the opaque key for ledgers, queues and sessions.
//!
//! Inside the node a `PeerId` is only ever compared and hashed. It is
//! rendered to hex at the Gateway boundary and in config files.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Length of a peer identifier in bytes.
pub const PEER_ID_LEN: usize = 32;

/// Opaque identifier of a network participant.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId([u8; PEER_ID_LEN]);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PeerIdError {
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("peer id must be {} bytes, got {0}", PEER_ID_LEN)]
    InvalidLength(usize),
}

impl PeerId {
    pub const fn new(bytes: [u8; PEER_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// A fresh random id, used when no identity is configured.
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn as_bytes(&self) -> &[u8; PEER_ID_LEN] {
        &self.0
    }

    /// Full hex rendering, as sent to the Gateway.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the hex rendering produced by [`PeerId::to_hex`].
    pub fn from_hex(s: &str) -> Result<Self, PeerIdError> {
        Self::from_slice(&hex::decode(s)?)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, PeerIdError> {
        let arr: [u8; PEER_ID_LEN] = bytes
            .try_into()
            .map_err(|_| PeerIdError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }

    /// First 8 bytes in hex, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl From<[u8; PEER_ID_LEN]> for PeerId {
    fn from(bytes: [u8; PEER_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl FromStr for PeerId {
    type Err = PeerIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.short())
    }
}

impl Serialize for PeerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PeerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PeerId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
