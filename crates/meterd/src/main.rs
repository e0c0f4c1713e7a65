//! meterd: block-exchange payment metering daemon.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use meter_core::config::MeterConfig;
use meter_services::{
    Coordinator, CoordinatorHandle, CoordinatorSettings, HttpGateway, PaymentNetwork, PeerQueues,
    SessionCorrelator,
};

mod transport;

use transport::TcpTransport;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = MeterConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = MeterConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        MeterConfig::default()
    });

    let local = config.local_peer_id().context("invalid identity.peer_id")?;
    let peers = config.known_peers().context("invalid network.peers")?;
    tracing::info!(peer_id = %local, peers = peers.len(), "meterd starting");

    // The callback listener must come up before anything else runs.
    let callback_listener = meter_api::bind(config.gateway.callback_port).await?;

    let gateway = Arc::new(HttpGateway::new(&config.gateway).context("building gateway client")?);
    tracing::info!(
        channel = %config.gateway.channel_url,
        callback = %config.gateway.callback_base_url(),
        "gateway configured"
    );

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Wiring ───────────────────────────────────────────────────────────────
    // handle → network → queues → coordinator: the coordinator notifies
    // peers through the queues, which account sends through the handle.

    let (handle, command_rx) = CoordinatorHandle::channel(config.payment.command_queue_capacity);
    let transport = Arc::new(TcpTransport::new(local, peers));
    let network = Arc::new(PaymentNetwork::new(transport, handle.clone()));
    let queues = Arc::new(PeerQueues::new(
        network.clone(),
        config.payment.notifier_queue_capacity,
        shutdown_tx.clone(),
    ));
    let correlator = SessionCorrelator::new();

    let mut coordinator_task = tokio::spawn(
        Coordinator::new(
            command_rx,
            gateway,
            queues.clone(),
            correlator.clone(),
            CoordinatorSettings::from(&config.payment),
            shutdown_tx.subscribe(),
        )
        .run(),
    );

    let mut api_task = {
        let state = meter_api::ApiState {
            correlator,
            notifier: queues,
            coordinator: handle,
        };
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = meter_api::serve(callback_listener, state, shutdown).await {
                tracing::error!(error = %e, "callback server failed");
            }
        })
    };

    let listen_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.network.listen_port));
    let tcp_listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("binding transport on {listen_addr}"))?;
    tracing::info!(addr = %tcp_listener.local_addr()?, "transport listening");

    let mut transport_task = {
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = transport::accept_loop(tcp_listener, network, shutdown).await {
                tracing::error!(error = %e, "transport listener failed");
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    let exited = tokio::select! {
        _ = shutdown_rx.recv() => {
            tracing::info!("shutting down");
            None
        }
        r = &mut coordinator_task => {
            tracing::error!("coordinator exited: {:?}", r);
            Some("coordinator")
        }
        r = &mut api_task => {
            tracing::error!("callback server exited: {:?}", r);
            Some("callback server")
        }
        r = &mut transport_task => {
            tracing::error!("transport listener exited: {:?}", r);
            Some("transport listener")
        }
    };

    // Stop whatever is still running, then give the callback server and
    // the coordinator time to finish in-flight work.
    let _ = shutdown_tx.send(());
    let mut pending = Vec::new();
    for (name, task) in [
        ("coordinator", coordinator_task),
        ("callback server", api_task),
        ("transport listener", transport_task),
    ] {
        if exited != Some(name) {
            pending.push(task);
        }
    }
    if !drain(pending, SHUTDOWN_GRACE).await {
        tracing::warn!(grace = ?SHUTDOWN_GRACE, "tasks still running after grace period");
    }

    Ok(())
}

/// How long shutdown waits for workers before the runtime drops them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Await every task, up to `grace` in total. False if time ran out.
async fn drain(tasks: Vec<JoinHandle<()>>, grace: Duration) -> bool {
    let all = async {
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "task failed during shutdown");
            }
        }
    };
    tokio::time::timeout(grace, all).await.is_ok()
}
