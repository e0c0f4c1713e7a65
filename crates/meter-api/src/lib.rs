pub mod handlers;

use std::net::{Ipv4Addr, SocketAddr};

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use handlers::ApiState;

/// Bind the callback listener. Failing here aborts startup.
pub async fn bind(port: u16) -> anyhow::Result<TcpListener> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding callback server on {addr}"))
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/command", post(handlers::handle_command))
        .route("/commandResponse", post(handlers::handle_command_response))
        .route("/paymentResponse", post(handlers::handle_payment_response))
        .route("/debts", get(handlers::handle_debts))
        .route("/sessions", get(handlers::handle_sessions))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Serve callbacks on `listener` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    state: ApiState,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "callback server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
        .context("callback server failed")?;

    tracing::info!("callback server stopped");
    Ok(())
}
