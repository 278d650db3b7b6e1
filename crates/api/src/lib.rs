//! HTTP gateway for ein investigations.
//!
//! Every write endpoint is a *signal*: it returns as soon as the event is
//! journaled and queued, with the event's sequence number. Output is read
//! by polling the message endpoint with the last cursor seen.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `POST /api/v1/investigations` - Start an investigation
//! - `GET /api/v1/investigations` - List investigation ids
//! - `GET /api/v1/investigations/{id}` - Status
//! - `DELETE /api/v1/investigations/{id}` - Archive
//! - `POST /api/v1/investigations/{id}/messages` - Send an operator message
//! - `GET /api/v1/investigations/{id}/messages?since=N` - Read output
//! - `POST /api/v1/investigations/{id}/confirmation` - Answer a handoff proposal
//! - `POST /api/v1/investigations/{id}/cancel` - Cancel the active handoff
//! - `GET /api/v1/investigations/{id}/findings` - Blackboard findings
//! - `GET /api/v1/investigations/{id}/report` - Correlation report
//! - `POST /api/v1/investigations/{id}/resume` - Reload from the store
//! - `POST /api/v1/batches`, `GET /api/v1/batches/{id}` - Multi-alert batches
//! - `POST /api/v1/route` - Routing preview
//!
//! # Architecture
//!
//! ```text
//! Client (CLI / chat bridge / Alertmanager hook)
//!    │
//!    ▼
//! ┌─────────────────┐
//! │   API Gateway   │ ◄── This crate
//! │     (Axum)      │
//! └────────┬────────┘
//!          │ signal / query
//!          ▼
//! ┌─────────────────┐      ┌─────────────────┐
//! │ SessionManager  │─────▶│   Investigation │ one task each
//! │                 │      │     runners     │
//! └─────────────────┘      └─────────────────┘
//! ```

pub mod routes;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use routes::ErrorResponse;
pub use state::AppState;

/// Request bodies above this size are rejected.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Create the API router with all routes configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        .route(
            "/api/v1/investigations",
            post(routes::create_investigation).get(routes::list_investigations),
        )
        .route(
            "/api/v1/investigations/{id}",
            get(routes::get_investigation).delete(routes::archive),
        )
        .route(
            "/api/v1/investigations/{id}/messages",
            post(routes::send_message).get(routes::get_messages),
        )
        .route(
            "/api/v1/investigations/{id}/confirmation",
            post(routes::confirm),
        )
        .route("/api/v1/investigations/{id}/cancel", post(routes::cancel))
        .route(
            "/api/v1/investigations/{id}/findings",
            get(routes::get_findings),
        )
        .route("/api/v1/investigations/{id}/report", get(routes::get_report))
        .route("/api/v1/investigations/{id}/resume", post(routes::resume))
        .route("/api/v1/batches", post(routes::create_batch))
        .route("/api/v1/batches/{id}", get(routes::get_batch))
        .route("/api/v1/route", post(routes::preview_route))
        // Middleware
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the API server on the given address.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> anyhow::Result<()> {
    let router = create_router(state);

    info!(%addr, "Starting ein API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
