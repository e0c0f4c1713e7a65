//! Meter integration test harness.
//!
//! Every test runs whole nodes in-process: the real coordinator, peer
//! queues, payment network and callback server, wired to a mock payment
//! gateway served over HTTP on 127.0.0.1. Nodes exchange encoded
//! envelopes through an in-memory switch.
//!
//!   cargo test --test integration

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

use meter_core::config::GatewayConfig;
use meter_core::{Envelope, PeerId};
use meter_services::{
    Coordinator, CoordinatorHandle, CoordinatorSettings, HttpGateway, PaymentNetwork, PeerQueues,
    SessionCorrelator, Transport,
};

mod callbacks;
mod settlement;
mod status;

// ── Mock gateway ──────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct GatewayState {
    /// (endpoint, body) for every call received, in order.
    pub calls: Vec<(String, Value)>,
    pub session_id: String,
    pub amount_out: u64,
    pub fail_create: bool,
}

#[derive(Clone)]
pub struct MockGateway {
    pub url: String,
    pub state: Arc<Mutex<GatewayState>>,
}

impl MockGateway {
    pub async fn start() -> Result<Self> {
        let state = Arc::new(Mutex::new(GatewayState {
            session_id: "sess-1".into(),
            ..Default::default()
        }));

        let app = Router::new()
            .route("/api/utility/validatePayment", post(validate_payment))
            .route("/api/utility/createPaymentInfo", post(create_payment_info))
            .route("/api/gateway/processPayment", post(process_payment))
            .route("/api/utility/processCommand", post(process_command))
            .route("/api/gateway/processResponse", post(process_response))
            .route("/api/gateway/transaction/{id}", get(get_transaction))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("http://{}", listener.local_addr()?);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { url, state })
    }

    pub fn calls(&self, endpoint: &str) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(e, _)| e == endpoint)
            .map(|(_, b)| b.clone())
            .collect()
    }

    pub fn set(&self, f: impl FnOnce(&mut GatewayState)) {
        f(&mut self.state.lock().unwrap());
    }
}

type Shared = State<Arc<Mutex<GatewayState>>>;

fn record(state: &Arc<Mutex<GatewayState>>, endpoint: &str, body: Value) {
    state.lock().unwrap().calls.push((endpoint.to_string(), body));
}

/// Claims are "claim-<amount>", so validation can read the amount back.
async fn validate_payment(State(s): Shared, Json(body): Json<Value>) -> Json<Value> {
    let quantity = body["PaymentRequest"]
        .as_str()
        .and_then(|c| c.strip_prefix("claim-"))
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or(0);
    record(&s, "validatePayment", body);
    Json(json!({ "Quantity": quantity }))
}

async fn create_payment_info(State(s): Shared, Json(body): Json<Value>) -> Response {
    let amount = body["Amount"].as_u64().unwrap_or(0);
    let fail = s.lock().unwrap().fail_create;
    record(&s, "createPaymentInfo", body);
    if fail {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    format!("claim-{amount}").into_response()
}

async fn process_payment(State(s): Shared, Json(body): Json<Value>) -> Json<Value> {
    let session_id = s.lock().unwrap().session_id.clone();
    record(&s, "processPayment", body);
    Json(json!({ "SessionId": session_id }))
}

async fn process_command(State(s): Shared, Json(body): Json<Value>) -> StatusCode {
    record(&s, "processCommand", body);
    StatusCode::OK
}

async fn process_response(State(s): Shared, Json(body): Json<Value>) -> StatusCode {
    record(&s, "processResponse", body);
    StatusCode::OK
}

async fn get_transaction(State(s): Shared, Path(id): Path<String>) -> Json<Value> {
    let amount_out = s.lock().unwrap().amount_out;
    record(&s, "transaction", json!({ "SessionId": id }));
    Json(json!({ "AmountOut": amount_out, "TransactionHash": "0xabc" }))
}

// ── In-memory switch ──────────────────────────────────────────────────────────

type Frame = (PeerId, Vec<u8>);

/// Routes encoded envelopes between registered peers.
#[derive(Clone, Default)]
pub struct Switch {
    inboxes: Arc<DashMap<PeerId, mpsc::UnboundedSender<Frame>>>,
}

impl Switch {
    pub fn register(&self, peer: PeerId) -> mpsc::UnboundedReceiver<Frame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.insert(peer, tx);
        rx
    }
}

pub struct SwitchTransport {
    local: PeerId,
    switch: Switch,
}

#[async_trait]
impl Transport for SwitchTransport {
    async fn send_envelope(&self, peer: PeerId, envelope: &Envelope) -> std::io::Result<()> {
        let inbox = self
            .switch
            .inboxes
            .get(&peer)
            .map(|e| e.value().clone())
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "unknown peer"))?;
        inbox
            .send((self.local, envelope.encode_to_vec()))
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "inbox closed"))
    }
}

/// A bare peer that only collects what it is sent.
pub struct Probe {
    pub id: PeerId,
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl Probe {
    pub fn new(switch: &Switch, id: PeerId) -> Self {
        Self {
            id,
            rx: switch.register(id),
        }
    }

    pub async fn next(&mut self) -> Result<(PeerId, Envelope)> {
        match tokio::time::timeout(Duration::from_secs(5), self.rx.recv()).await {
            Ok(Some((from, frame))) => Ok((from, Envelope::decode(&frame)?)),
            Ok(None) => bail!("switch closed"),
            Err(_) => bail!("no envelope within 5s"),
        }
    }

    /// Nothing arrives within a short grace period.
    pub async fn assert_silent(&mut self) {
        let got = tokio::time::timeout(Duration::from_millis(200), self.rx.recv()).await;
        assert!(got.is_err(), "expected no envelope");
    }
}

// ── Node ──────────────────────────────────────────────────────────────────────

pub struct Node {
    pub id: PeerId,
    pub handle: CoordinatorHandle,
    pub correlator: SessionCorrelator,
    pub queues: Arc<PeerQueues<SwitchTransport>>,
    pub gateway: MockGateway,
    /// Base URL of this node's callback server.
    pub callback_url: String,
    shutdown: broadcast::Sender<()>,
}

impl Node {
    pub async fn start(switch: &Switch, id: PeerId, threshold_bytes: u64) -> Result<Self> {
        let gateway = MockGateway::start().await?;
        let (shutdown, _) = broadcast::channel(1);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let callback_port = listener.local_addr()?.port();
        let client = HttpGateway::new(&GatewayConfig {
            channel_url: gateway.url.clone(),
            callback_host: "127.0.0.1".into(),
            callback_port,
            request_timeout_secs: 5,
            ..Default::default()
        })?;

        let (handle, command_rx) = CoordinatorHandle::channel(10);
        let transport = Arc::new(SwitchTransport {
            local: id,
            switch: switch.clone(),
        });
        let network = Arc::new(PaymentNetwork::new(transport, handle.clone()));
        let queues = Arc::new(PeerQueues::new(network.clone(), 16, shutdown.clone()));
        let correlator = SessionCorrelator::new();

        let settings = CoordinatorSettings {
            threshold_bytes,
            ..Default::default()
        };
        tokio::spawn(
            Coordinator::new(
                command_rx,
                Arc::new(client),
                queues.clone(),
                correlator.clone(),
                settings,
                shutdown.subscribe(),
            )
            .run(),
        );

        let state = meter_api::ApiState {
            correlator: correlator.clone(),
            notifier: queues.clone(),
            coordinator: handle.clone(),
        };
        tokio::spawn(meter_api::serve(listener, state, shutdown.subscribe()));

        let mut inbox = switch.register(id);
        tokio::spawn(async move {
            while let Some((from, frame)) = inbox.recv().await {
                if let Err(e) = network.receive_frame(from, &frame).await {
                    eprintln!("receive failed: {e}");
                }
            }
        });

        Ok(Self {
            id,
            handle,
            correlator,
            queues,
            gateway,
            callback_url: format!("http://127.0.0.1:{callback_port}"),
            shutdown,
        })
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<StatusCode> {
        self.post_raw(path, body.to_string()).await
    }

    pub async fn post_raw(&self, path: &str, body: String) -> Result<StatusCode> {
        let resp = reqwest::Client::new()
            .post(format!("{}{}", self.callback_url, path))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await?;
        Ok(StatusCode::from_u16(resp.status().as_u16())?)
    }

    pub async fn get_json(&self, path: &str) -> Result<Value> {
        let resp = reqwest::get(format!("{}{}", self.callback_url, path)).await?;
        Ok(resp.json().await?)
    }

    /// Ledger entry for `peer` as (requested, transferred, received).
    pub async fn debt(&self, peer: PeerId) -> Result<(u64, u64, u64)> {
        let debts = self.handle.debts().await?;
        Ok(debts
            .into_iter()
            .find(|d| d.peer == peer)
            .map(|d| {
                (
                    d.debt.requested_amount,
                    d.debt.transferred_bytes,
                    d.debt.received_bytes,
                )
            })
            .unwrap_or_default())
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}

/// Poll `check` until it returns true or five seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

pub fn block(len: usize) -> Envelope {
    Envelope {
        blocks: vec![Bytes::from(vec![0x42u8; len])],
        ..Default::default()
    }
}
