//! API Routes
//!
//! HTTP endpoints for health checks, node status, the peer directory and metrics

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::Metrics;
use crate::chain::ChainState;
use crate::config::NodeConfig;
use crate::directory::PeerStore;

/// Shared API state
pub struct ApiState {
    pub config: Arc<NodeConfig>,
    pub store: Arc<dyn PeerStore>,
    pub chain: Arc<dyn ChainState>,
    pub metrics: Arc<Metrics>,
}

/// Build the router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        // Health & Status
        .route("/health", get(health_check))
        .route("/status", get(get_status))

        // Directory
        .route("/peers", get(get_peers))

        // Metrics
        .route("/metrics", get(get_metrics_prometheus))
        .route("/metrics/json", get(get_metrics_json))

        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_api_server(state: Arc<ApiState>) -> anyhow::Result<()> {
    let addr: SocketAddr =
        format!("{}:{}", state.config.bind_address, state.config.api_port).parse()?;
    let app = router(state);

    info!("📊 HTTP API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// GET /health - Simple health check
async fn health_check() -> impl IntoResponse {
    "OK"
}

/// GET /status - Node identity and chain tip
async fn get_status(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let snapshot = state.chain.snapshot().await;
    let peer_count = state.store.len().ok();

    Json(serde_json::json!({
        "status": "healthy",
        "version": state.config.node_version,
        "os": state.config.os,
        "nethash": state.config.nethash,
        "wsPort": state.config.ws_port,
        "height": snapshot.height,
        "broadhash": snapshot.broadhash.to_hex(),
        "peers": peer_count,
        "uptime_secs": state.metrics.uptime_secs(),
    }))
}

/// GET /peers - Directory contents
async fn get_peers(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    match state.store.list() {
        Ok(peers) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "count": peers.len(),
                "peers": peers,
            })),
        ),
        Err(e) => {
            warn!("Peer directory unavailable: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        }
    }
}

/// GET /metrics - Prometheus format metrics
async fn get_metrics_prometheus(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.to_prometheus(),
    )
}

/// GET /metrics/json - JSON format metrics
async fn get_metrics_json(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.metrics.to_json())
}
