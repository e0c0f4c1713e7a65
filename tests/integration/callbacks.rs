use axum::http::StatusCode;
use bytes::Bytes;
use serde_json::json;

use meter_core::{PaymentMessage, PeerId};

use crate::*;

async fn node_and_probe() -> (Node, Probe) {
    let switch = Switch::default();
    let node = Node::start(&switch, PeerId::new([0x0a; 32]), 1 << 20)
        .await
        .unwrap();
    let probe = Probe::new(&switch, PeerId::new([0x0b; 32]));
    (node, probe)
}

#[tokio::test]
async fn test_command_callback_reaches_peer() {
    let (node, mut probe) = node_and_probe().await;

    let status = node
        .post(
            "/api/command",
            json!({
                "sessionId": "s1",
                "commandId": "c1",
                "commandType": 3,
                "commandBody": "Ym9keQ==",
                "nodeId": probe.id.to_hex(),
            }),
        )
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);

    let (from, envelope) = probe.next().await.unwrap();
    assert_eq!(from, node.id);
    assert_eq!(
        envelope.payment,
        Some(PaymentMessage::PaymentCommand {
            command_id: "c1".into(),
            command_body: Bytes::from_static(b"body"),
            command_type: 3,
            session_id: "s1".into(),
        })
    );
}

#[tokio::test]
async fn test_command_response_callback_reaches_peer() {
    let (node, mut probe) = node_and_probe().await;

    let status = node
        .post(
            "/api/commandResponse",
            json!({
                "CommandId": "c1",
                "NodeId": probe.id.to_hex(),
                "SessionId": "s1",
                "CommandResponse": "cmVwbHk=",
            }),
        )
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);

    let (_, envelope) = probe.next().await.unwrap();
    assert_eq!(
        envelope.payment,
        Some(PaymentMessage::PaymentResponse {
            command_id: "c1".into(),
            command_reply: Bytes::from_static(b"reply"),
            session_id: "s1".into(),
        })
    );
}

#[tokio::test]
async fn test_malformed_bodies_are_400() {
    let (node, mut probe) = node_and_probe().await;

    for path in ["/api/command", "/api/commandResponse", "/api/paymentResponse"] {
        let status = node.post_raw(path, "{\"sessionId\":".into()).await.unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST, "{path}");
    }
    // Well-formed JSON missing required fields is malformed too.
    let status = node
        .post("/api/paymentResponse", json!({ "status": 1 }))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);

    probe.assert_silent().await;
}

#[tokio::test]
async fn test_unresolvable_node_is_404() {
    let (node, mut probe) = node_and_probe().await;

    let status = node
        .post(
            "/api/command",
            json!({
                "sessionId": "s1",
                "commandId": "c1",
                "commandType": 0,
                "commandBody": "",
                "nodeId": "not-a-node",
            }),
        )
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
    probe.assert_silent().await;
}

#[tokio::test]
async fn test_payment_response_unknown_session_is_404() {
    let (node, mut probe) = node_and_probe().await;

    let status = node
        .post(
            "/api/paymentResponse",
            json!({ "sessionId": "missing", "status": 1 }),
        )
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
    probe.assert_silent().await;
}

#[tokio::test]
async fn test_payment_response_success_notifies_origin() {
    let (node, mut probe) = node_and_probe().await;
    node.correlator.open("s1", probe.id).await;

    let status = node
        .post(
            "/api/paymentResponse",
            json!({ "sessionId": "s1", "status": 1 }),
        )
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);

    let (_, envelope) = probe.next().await.unwrap();
    assert_eq!(
        envelope.payment,
        Some(PaymentMessage::PaymentStatusResponse {
            session_id: "s1".into(),
            status: true,
        })
    );

    // Closed sessions are gone: a repeat is unknown.
    let status = node
        .post(
            "/api/paymentResponse",
            json!({ "sessionId": "s1", "status": 1 }),
        )
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_payment_response_failure_is_silent() {
    let (node, mut probe) = node_and_probe().await;
    node.correlator.open("s1", probe.id).await;

    let status = node
        .post(
            "/api/paymentResponse",
            json!({ "sessionId": "s1", "status": 0 }),
        )
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);

    probe.assert_silent().await;
    assert!(node.correlator.is_empty().await);
}
