//! Two-node settlement: A serves blocks to B and claims payment.

use axum::http::StatusCode;
use serde_json::json;

use meter_core::PeerId;

use crate::*;

const THRESHOLD: u64 = 1000;

async fn pair() -> (Node, Node) {
    let switch = Switch::default();
    let a = Node::start(&switch, PeerId::new([0xa1; 32]), THRESHOLD)
        .await
        .unwrap();
    let b = Node::start(&switch, PeerId::new([0xb2; 32]), THRESHOLD)
        .await
        .unwrap();
    (a, b)
}

#[tokio::test]
async fn test_full_settlement_round_trip() {
    let (a, b) = pair().await;
    let (a, b) = (&a, &b);
    a.gateway.set(|g| g.amount_out = THRESHOLD);

    // A sends B enough block data to cross the threshold.
    a.queues.enqueue(b.id, block(600)).await;
    a.queues.enqueue(b.id, block(400)).await;

    // A claims, B validates and pays, opening a session.
    assert!(eventually(move || async move { b.correlator.len().await == 1 }).await);
    assert_eq!(a.debt(b.id).await.unwrap(), (THRESHOLD, 0, 0));
    assert_eq!(b.debt(a.id).await.unwrap(), (0, 0, THRESHOLD));

    let created = a.gateway.calls("createPaymentInfo");
    assert_eq!(created.len(), 1);
    assert_eq!(created[0]["Amount"], THRESHOLD);

    let paid = b.gateway.calls("processPayment");
    assert_eq!(paid[0]["PaymentRequest"], format!("claim-{THRESHOLD}"));
    assert_eq!(paid[0]["NodeId"], a.id.to_hex());
    assert_eq!(paid[0]["CallbackUrl"], format!("{}/api/command", b.callback_url));

    // B's gateway reports success; A learns of it and settles.
    let status = b
        .post(
            "/api/paymentResponse",
            json!({ "sessionId": "sess-1", "status": 1 }),
        )
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);

    assert!(
        eventually(move || async move { a.debt(b.id).await.unwrap().0 == 0 }).await,
        "requested amount should be settled"
    );
    assert_eq!(
        a.gateway.calls("transaction"),
        vec![json!({ "SessionId": "sess-1" })]
    );
    assert!(b.correlator.is_empty().await);
}

#[tokio::test]
async fn test_failed_settlement_leaves_debt() {
    let (a, b) = pair().await;
    let (a, b) = (&a, &b);

    a.queues.enqueue(b.id, block(THRESHOLD as usize)).await;
    assert!(eventually(move || async move { b.correlator.len().await == 1 }).await);

    let status = b
        .post(
            "/api/paymentResponse",
            json!({ "sessionId": "sess-1", "status": 0 }),
        )
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(a.debt(b.id).await.unwrap().0, THRESHOLD);
    assert!(a.gateway.calls("transaction").is_empty());
}

#[tokio::test]
async fn test_gateway_outage_defers_claim() {
    let (a, b) = pair().await;
    let (a, b) = (&a, &b);
    a.gateway.set(|g| g.fail_create = true);

    a.queues.enqueue(b.id, block(THRESHOLD as usize)).await;
    assert!(
        eventually(move || async move { a.gateway.calls("createPaymentInfo").len() == 1 }).await
    );
    assert_eq!(a.debt(b.id).await.unwrap(), (0, THRESHOLD, 0));
    assert!(b.gateway.calls("validatePayment").is_empty());

    // Once the gateway is back, the next send claims everything pending.
    a.gateway.set(|g| g.fail_create = false);
    a.queues.enqueue(b.id, block(10)).await;

    assert!(eventually(move || async move { b.correlator.len().await == 1 }).await);
    assert_eq!(a.debt(b.id).await.unwrap(), (THRESHOLD + 10, 0, 0));
    assert_eq!(
        b.gateway.calls("validatePayment")[0]["PaymentRequest"],
        format!("claim-{}", THRESHOLD + 10)
    );
}

#[tokio::test]
async fn test_negotiation_commands_relay_between_gateways() {
    let (a, b) = pair().await;
    let (a, b) = (&a, &b);

    // B's gateway issues a command for A.
    let status = b
        .post(
            "/api/command",
            json!({
                "sessionId": "sess-1",
                "commandId": "cmd-1",
                "commandType": 1,
                "commandBody": "AQID",
                "nodeId": a.id.to_hex(),
            }),
        )
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);

    assert!(eventually(move || async move { a.gateway.calls("processCommand").len() == 1 }).await);
    let command = &a.gateway.calls("processCommand")[0];
    assert_eq!(command["CommandId"], "cmd-1");
    assert_eq!(command["CommandBody"], "AQID");
    assert_eq!(command["NodeId"], b.id.to_hex());
    assert_eq!(
        command["CallbackUrl"],
        format!("{}/api/commandResponse", a.callback_url)
    );

    // A's gateway answers; the reply travels back to B's gateway.
    let status = a
        .post(
            "/api/commandResponse",
            json!({
                "commandId": "cmd-1",
                "nodeId": b.id.to_hex(),
                "sessionId": "sess-1",
                "responseBody": "BAUG",
            }),
        )
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);

    assert!(eventually(move || async move { b.gateway.calls("processResponse").len() == 1 }).await);
    let response = &b.gateway.calls("processResponse")[0];
    assert_eq!(response["ResponseBody"], "BAUG");
    assert_eq!(response["NodeId"], a.id.to_hex());
    assert_eq!(response["SessionId"], "sess-1");
}
