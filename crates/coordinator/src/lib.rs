//! AgentLoop Coordinator
//!
//! Assigns submitted tasks to specialist agents and fans the results out to
//! connected clients over WebSocket.
//!
//! # Endpoints
//!
//! - `POST /api/assign-task` - Submit a task for assignment
//! - `GET /api/agents/status` - Roster with current load
//! - `POST /api/agents/:agent_id/update/:task_id` - Ask an agent for a status update
//! - `PUT /api/tasks/:task_id/status` - Move a task on the board
//! - `GET /api/health` - Health check
//! - `GET /metrics` - Prometheus metrics
//! - `GET /ws` - Event stream

pub mod coordinator;
pub mod fanout;
pub mod routes;
pub mod simulator;
pub mod state;

use agentloop_common::error::Result;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use coordinator::{compatibility_score, score_agent, Coordinator};
pub use fanout::{ClientChannel, ConnectionId, ConnectionManager, QueueChannel};
pub use simulator::ActivitySimulator;
pub use state::AppState;

/// Create the router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/api/assign-task", post(routes::assign_task))
        .route("/api/agents/status", get(routes::agents_status))
        .route(
            "/api/agents/:agent_id/update/:task_id",
            post(routes::request_agent_update),
        )
        .route(
            "/api/tasks/:task_id/status",
            put(routes::update_task_status),
        )
        .route("/api/health", get(routes::health))
        .route("/ws", get(routes::websocket_handler));

    if state.metrics_enabled {
        router = router.route("/metrics", get(routes::metrics));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve until `shutdown` is cancelled
pub async fn serve(
    state: Arc<AppState>,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
