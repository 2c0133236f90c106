//! HTTP server
//!
//! Pairing page, status polling endpoints, and the send/list API.

mod handlers;

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};

use crate::connection::SupervisorHandle;
use crate::gateway::OutboundGateway;

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: SupervisorHandle,
    pub gateway: OutboundGateway,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::index))
        .route("/login", get(handlers::login_page))
        .route("/qr", get(handlers::qr_png))
        .route("/api/qrcode", get(handlers::api_qrcode))
        .route("/api/status", get(handlers::api_status))
        .route("/status", get(handlers::liveness))
        .route("/refresh-qr", post(handlers::refresh_qr))
        .route("/send-message", post(handlers::send_message))
        .route("/send-local-image", post(handlers::send_local_image))
        .route("/get-groups", get(handlers::get_groups))
        .layer(cors)
        .with_state(state)
}

/// Bind `addr` and serve in a background task.
///
/// Returns the task handle and the address actually bound, so tests can pass
/// port 0.
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
) -> anyhow::Result<(JoinHandle<()>, SocketAddr)> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("HTTP server listening on http://{}", actual_addr);
    tracing::info!("Open http://{}/login to pair WhatsApp", actual_addr);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    Ok((handle, actual_addr))
}
