//! Session correlator: maps gateway session ids to the peer to notify.
//!
//! Shared between the coordinator worker, which opens sessions, and the
//! callback handlers, which close them from arbitrary tasks. Both
//! operations run under one mutex.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use meter_core::PeerId;

/// An in-flight settlement this node started on a peer's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub session_id: String,
    /// The peer that claimed payment and must learn the outcome.
    pub origin: PeerId,
    /// Reserved for a retry policy on failed settlements. Always 0.
    pub retry_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorrelatorError {
    #[error("session not found: {0}")]
    SessionNotFound(String),
}

#[derive(Clone, Default)]
pub struct SessionCorrelator {
    open: Arc<Mutex<HashMap<String, Session>>>,
}

impl SessionCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `session_id` settles a claim from `origin`.
    /// A duplicate id replaces the earlier record.
    pub async fn open(&self, session_id: impl Into<String>, origin: PeerId) {
        let session_id = session_id.into();
        let mut open = self.open.lock().await;
        if let Some(previous) = open.insert(
            session_id.clone(),
            Session {
                session_id: session_id.clone(),
                origin,
                retry_count: 0,
            },
        ) {
            tracing::warn!(
                session_id = %session_id,
                previous = %previous.origin.short(),
                "session id reused, replacing open session"
            );
        }
    }

    /// Resolve and remove a session.
    pub async fn close(&self, session_id: &str) -> Result<Session, CorrelatorError> {
        self.open
            .lock()
            .await
            .remove(session_id)
            .ok_or_else(|| CorrelatorError::SessionNotFound(session_id.to_string()))
    }

    pub async fn len(&self) -> usize {
        self.open.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.open.lock().await.is_empty()
    }

    /// Currently open sessions, ordered by id.
    pub async fn list(&self) -> Vec<Session> {
        let mut all: Vec<Session> = self.open.lock().await.values().cloned().collect();
        all.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        all
    }
}
