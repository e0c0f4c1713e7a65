//! Gateway callbacks: /command, /commandResponse, /paymentResponse.
//!
//! Bodies are read raw and parsed here so every malformed body is a 400,
//! whatever the content type header says.

use axum::extract::State;
use axum::http::StatusCode;
use bytes::Bytes;
use serde::Deserialize;

use meter_core::PaymentMessage;
use meter_services::gateway::base64_bytes;

use super::{parse_body, resolve_node, ApiState};

// ── /command ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandCallback {
    #[serde(alias = "SessionId")]
    pub session_id: String,
    #[serde(alias = "CommandId")]
    pub command_id: String,
    #[serde(alias = "CommandType", default)]
    pub command_type: i32,
    #[serde(alias = "CommandBody", with = "base64_bytes", default)]
    pub command_body: Bytes,
    #[serde(alias = "NodeId")]
    pub node_id: String,
}

pub async fn handle_command(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<StatusCode, (StatusCode, String)> {
    let req: CommandCallback = parse_body(&body)?;
    let peer = resolve_node(&req.node_id)?;

    tracing::debug!(
        peer = %peer.short(),
        session_id = %req.session_id,
        command_id = %req.command_id,
        "gateway command"
    );
    state.notifier.notify(
        peer,
        PaymentMessage::PaymentCommand {
            command_id: req.command_id,
            command_body: req.command_body,
            command_type: req.command_type,
            session_id: req.session_id,
        },
    );
    Ok(StatusCode::OK)
}

// ── /commandResponse ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponseCallback {
    #[serde(alias = "CommandId")]
    pub command_id: String,
    #[serde(alias = "NodeId")]
    pub node_id: String,
    #[serde(alias = "SessionId")]
    pub session_id: String,
    #[serde(
        alias = "ResponseBody",
        alias = "CommandResponse",
        with = "base64_bytes",
        default
    )]
    pub response_body: Bytes,
}

pub async fn handle_command_response(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<StatusCode, (StatusCode, String)> {
    let req: CommandResponseCallback = parse_body(&body)?;
    let peer = resolve_node(&req.node_id)?;

    tracing::debug!(
        peer = %peer.short(),
        session_id = %req.session_id,
        command_id = %req.command_id,
        "gateway command response"
    );
    state.notifier.notify(
        peer,
        PaymentMessage::PaymentResponse {
            command_id: req.command_id,
            command_reply: req.response_body,
            session_id: req.session_id,
        },
    );
    Ok(StatusCode::OK)
}

// ── /paymentResponse ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponseCallback {
    #[serde(alias = "SessionId")]
    pub session_id: String,
    /// 1 = settled.
    #[serde(alias = "Status")]
    pub status: i32,
}

pub async fn handle_payment_response(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<StatusCode, (StatusCode, String)> {
    let req: PaymentResponseCallback = parse_body(&body)?;

    let session = state.correlator.close(&req.session_id).await.map_err(|e| {
        tracing::warn!(session_id = %req.session_id, "payment response for unknown session");
        (StatusCode::NOT_FOUND, e.to_string())
    })?;

    if req.status != 1 {
        tracing::info!(
            peer = %session.origin.short(),
            session_id = %session.session_id,
            status = req.status,
            "payment not settled"
        );
        return Ok(StatusCode::OK);
    }

    tracing::info!(
        peer = %session.origin.short(),
        session_id = %session.session_id,
        "payment settled, notifying origin"
    );
    state.notifier.notify(
        session.origin,
        PaymentMessage::PaymentStatusResponse {
            session_id: session.session_id,
            status: true,
        },
    );
    Ok(StatusCode::OK)
}
