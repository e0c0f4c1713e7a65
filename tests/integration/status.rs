use meter_core::PeerId;

use crate::*;

#[tokio::test]
async fn test_debts_endpoint_lists_ledger() {
    let switch = Switch::default();
    let node = Node::start(&switch, PeerId::new([0x01; 32]), 1 << 30)
        .await
        .unwrap();
    let node = &node;
    let mut probe = Probe::new(&switch, PeerId::new([0x02; 32]));

    node.queues.enqueue(probe.id, block(256)).await;
    probe.next().await.unwrap();

    assert!(
        eventually(move || async move {
            node.get_json("/api/debts")
                .await
                .map(|v| v.as_array().map(|a| a.len()) == Some(1))
                .unwrap_or(false)
        })
        .await
    );

    let debts = node.get_json("/api/debts").await.unwrap();
    assert_eq!(debts[0]["peer"], probe.id.to_hex());
    assert_eq!(debts[0]["transferred_bytes"], 256);
    assert_eq!(debts[0]["requested_amount"], 0);
    assert_eq!(debts[0]["received_bytes"], 0);
}

#[tokio::test]
async fn test_sessions_endpoint_lists_open_sessions() {
    let switch = Switch::default();
    let node = Node::start(&switch, PeerId::new([0x03; 32]), 1 << 30)
        .await
        .unwrap();
    let origin = PeerId::new([0x04; 32]);
    node.correlator.open("s-2", origin).await;
    node.correlator.open("s-1", origin).await;

    let sessions = node.get_json("/api/sessions").await.unwrap();
    let sessions = sessions.as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0]["session_id"], "s-1");
    assert_eq!(sessions[0]["origin"], origin.to_hex());
    assert_eq!(sessions[0]["retry_count"], 0);
}
