//! Configuration system for Meter.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $METER_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/meter/config.toml
//!   3. ~/.config/meter/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::peer::{PeerId, PeerIdError};

/// Bytes sent to a peer before settlement is requested: 50 MiB.
pub const DEFAULT_THRESHOLD_BYTES: u64 = 50 * 1024 * 1024;

/// Capacity of the coordinator's command queue.
pub const DEFAULT_COMMAND_QUEUE_CAPACITY: usize = 10;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    pub identity: IdentityConfig,
    pub network: NetworkConfig,
    pub gateway: GatewayConfig,
    pub payment: PaymentConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Hex-encoded 32-byte node id. Empty = random per run.
    pub peer_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// TCP port of the envelope transport. 0 = OS-assigned.
    pub listen_port: u16,
    /// Peers dialled on demand.
    pub peers: Vec<PeerAddress>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerAddress {
    pub peer_id: String,
    /// host:port of the peer's envelope transport.
    pub addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL of the payment gateway, e.g. "http://localhost:28080".
    pub channel_url: String,
    /// Host the gateway uses to reach our callback server.
    pub callback_host: String,
    /// Port of the inbound callback server.
    pub callback_port: u16,
    pub service_type: String,
    pub commodity_type: String,
    /// Per-request timeout for outbound gateway calls.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    pub threshold_bytes: u64,
    pub command_queue_capacity: usize,
    /// Pending payment payloads per peer before new ones are dropped.
    pub notifier_queue_capacity: usize,
    pub claim_policy: ClaimPolicy,
}

/// What to do when a peer claims more than we received from it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimPolicy {
    /// Log the violation and pay anyway.
    #[default]
    LogOnly,
    /// Refuse to pay.
    Reject,
}

impl std::str::FromStr for ClaimPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "log_only" => Ok(ClaimPolicy::LogOnly),
            "reject" => Ok(ClaimPolicy::Reject),
            other => Err(format!("unknown claim policy: {other}")),
        }
    }
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_port: 0,
            peers: Vec::new(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            channel_url: "http://localhost:28080".to_string(),
            callback_host: "localhost".to_string(),
            callback_port: 30500,
            service_type: "ipfs".to_string(),
            commodity_type: "data".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            threshold_bytes: DEFAULT_THRESHOLD_BYTES,
            command_queue_capacity: DEFAULT_COMMAND_QUEUE_CAPACITY,
            notifier_queue_capacity: 16,
            claim_policy: ClaimPolicy::LogOnly,
        }
    }
}

impl GatewayConfig {
    /// Base URL the gateway calls back into, without the `/api` suffix.
    pub fn callback_base_url(&self) -> String {
        format!("http://{}:{}", self.callback_host, self.callback_port)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("meter")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid peer id {0:?}: {1}")]
    InvalidPeerId(String, PeerIdError),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl MeterConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            MeterConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("METER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&MeterConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// This node's id: the configured one, or a random id when unset.
    pub fn local_peer_id(&self) -> Result<PeerId, ConfigError> {
        if self.identity.peer_id.is_empty() {
            return Ok(PeerId::random());
        }
        PeerId::from_hex(&self.identity.peer_id)
            .map_err(|e| ConfigError::InvalidPeerId(self.identity.peer_id.clone(), e))
    }

    /// Configured peers with parsed ids.
    pub fn known_peers(&self) -> Result<Vec<(PeerId, String)>, ConfigError> {
        self.network
            .peers
            .iter()
            .map(|p| {
                PeerId::from_hex(&p.peer_id)
                    .map(|id| (id, p.addr.clone()))
                    .map_err(|e| ConfigError::InvalidPeerId(p.peer_id.clone(), e))
            })
            .collect()
    }

    /// Apply METER_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("METER_GATEWAY__CHANNEL_URL") {
            self.gateway.channel_url = v;
        }
        if let Ok(v) = std::env::var("METER_GATEWAY__CALLBACK_PORT") {
            if let Ok(p) = v.parse() {
                self.gateway.callback_port = p;
            }
        }
        if let Ok(v) = std::env::var("METER_NETWORK__LISTEN_PORT") {
            if let Ok(p) = v.parse() {
                self.network.listen_port = p;
            }
        }
        if let Ok(v) = std::env::var("METER_PAYMENT__THRESHOLD_BYTES") {
            if let Ok(n) = v.parse() {
                self.payment.threshold_bytes = n;
            }
        }
        if let Ok(v) = std::env::var("METER_PAYMENT__CLAIM_POLICY") {
            if let Ok(p) = v.parse() {
                self.payment.claim_policy = p;
            }
        }
    }
}
