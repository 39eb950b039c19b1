//! API Routes
//!
//! HTTP endpoints for the Prometheus scrape, health checks and the
//! configured peer list

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::ScrapeCollector;
use crate::types::PeerBook;

/// Prometheus text exposition content type
const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Shared API state
pub struct ApiState {
    pub collector: Arc<ScrapeCollector>,
    pub book: Arc<PeerBook>,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        // Health
        .route("/health", get(health_check))

        // Metrics
        .route("/metrics", get(get_metrics_prometheus))
        .route("/metrics/json", get(get_metrics_json))

        // Configured peers
        .route("/peers", get(get_peers))

        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP API server until `shutdown` turns true
pub async fn run_api_server(
    port: u16,
    state: Arc<ApiState>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("📊 Metrics endpoint listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await?;

    Ok(())
}

/// GET /health - Simple health check
async fn health_check() -> impl IntoResponse {
    "OK"
}

/// GET /metrics - Prometheus format metrics
async fn get_metrics_prometheus(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        state.collector.render(),
    )
}

/// GET /metrics/json - JSON format metrics
async fn get_metrics_json(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.collector.to_json())
}

/// GET /peers - Configured peers and their display names
async fn get_peers(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let peers: Vec<_> = state
        .book
        .iter()
        .map(|p| serde_json::json!({
            "name": p.name,
            "enode_short": p.identity.short(),
            "probe_target": p.probe_target,
        }))
        .collect();

    Json(serde_json::json!({
        "count": peers.len(),
        "peers": peers,
    }))
}
