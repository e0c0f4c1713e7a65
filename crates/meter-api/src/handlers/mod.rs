//! HTTP handlers: gateway callbacks and payment state inspection.

pub mod callbacks;
pub mod status;

use std::sync::Arc;

use axum::http::StatusCode;
use serde::de::DeserializeOwned;

use meter_core::PeerId;
use meter_services::{CoordinatorHandle, PeerNotifier, SessionCorrelator};

#[derive(Clone)]
pub struct ApiState {
    pub correlator: SessionCorrelator,
    /// Callbacks route payloads straight onto peer queues.
    pub notifier: Arc<dyn PeerNotifier>,
    pub coordinator: CoordinatorHandle,
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Parse a JSON body. Any failure is a 400.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, (StatusCode, String)> {
    serde_json::from_slice(body)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("malformed body: {e}")))
}

/// Resolve the hex node id the gateway echoes back to us.
fn resolve_node(node_id: &str) -> Result<PeerId, (StatusCode, String)> {
    PeerId::from_hex(node_id)
        .map_err(|e| (StatusCode::NOT_FOUND, format!("unknown node {node_id:?}: {e}")))
}

pub use callbacks::{handle_command, handle_command_response, handle_payment_response};
pub use status::{handle_debts, handle_sessions};
