//! /debts and /sessions handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use meter_services::{DebtSnapshot, Session};

use super::ApiState;

// ── /debts ───────────────────────────────────────────────────────────────────

pub async fn handle_debts(
    State(state): State<ApiState>,
) -> Result<Json<Vec<DebtSnapshot>>, (StatusCode, String)> {
    state
        .coordinator
        .debts()
        .await
        .map(Json)
        .map_err(|e| (StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
}

// ── /sessions ────────────────────────────────────────────────────────────────

pub async fn handle_sessions(State(state): State<ApiState>) -> Json<Vec<Session>> {
    Json(state.correlator.list().await)
}
