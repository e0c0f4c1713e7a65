//! Gateway boundary: what the coordinator needs from the payment gateway.
//!
//! The gateway is an external service. [`crate::HttpGateway`] reaches it
//! over HTTP; tests substitute in-memory fakes.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A negotiation step to hand to our gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub command_id: String,
    pub command_type: i32,
    pub command_body: Bytes,
    /// Hex id of the peer the command came from.
    pub node_id: String,
    pub session_id: String,
}

/// A reply to a negotiation step, to hand to our gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRequest {
    pub command_id: String,
    pub response_body: Bytes,
    /// Hex id of the peer the reply came from.
    pub node_id: String,
    pub session_id: String,
}

/// A settled transaction as reported by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PaymentTransaction {
    /// Amount credited to the payee. Reduces the requested amount.
    pub amount_out: u64,
    #[serde(default)]
    pub amount_in: u64,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub transaction_hash: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gateway returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("gateway returned no session id")]
    MissingSessionId,

    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),

    #[error("invalid gateway url {0}")]
    InvalidUrl(String),
}

#[async_trait]
pub trait Gateway: Send + Sync {
    /// Quantity of bytes a claim demands.
    async fn validate_payment(&self, payment_request: &str) -> Result<u64, GatewayError>;

    /// Produce a claim for `amount` bytes, to be sent to the debtor.
    async fn create_payment_info(&self, amount: u64) -> Result<String, GatewayError>;

    /// Start paying a claim from `node_id`. Returns the session id under
    /// which the gateway will report progress through callbacks.
    async fn process_payment(
        &self,
        payment_request: &str,
        node_id: &str,
    ) -> Result<String, GatewayError>;

    async fn process_command(&self, command: CommandRequest) -> Result<(), GatewayError>;

    async fn process_response(&self, response: ResponseRequest) -> Result<(), GatewayError>;

    async fn get_transaction(&self, session_id: &str) -> Result<PaymentTransaction, GatewayError>;
}

/// Serde adapter: `Bytes` as a standard base64 string, the way the
/// gateway encodes byte arrays in JSON.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        // JSON null stands for an empty byte array.
        let s = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        STANDARD
            .decode(s.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
