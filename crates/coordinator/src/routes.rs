//! HTTP and WebSocket handlers

use crate::fanout::{ClientChannel, ConnectionId};
use crate::state::AppState;
use agentloop_common::error::{AgentLoopError, Result};
use agentloop_common::METRICS;
use agentloop_proto::{
    AgentStatus, AgentUpdate, AssignmentResult, ClientMessage, Event, HealthResponse, TaskId,
    TaskRecord, TaskStatus, TaskSubmission,
};
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// API error body
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    pub error: String,
    pub code: &'static str,
}

impl ApiError {
    pub fn agent_not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: "Agent not found".to_string(),
            code: "NOT_FOUND",
        }
    }
}

impl From<AgentLoopError> for ApiError {
    fn from(err: AgentLoopError) -> Self {
        Self {
            status: StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            error: err.to_string(),
            code: err.code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Submit a task for assignment
pub async fn assign_task(
    State(state): State<Arc<AppState>>,
    Json(submission): Json<TaskSubmission>,
) -> std::result::Result<Json<AssignmentResult>, ApiError> {
    let result = state.submit_task(submission.into()).await?;
    Ok(Json(result))
}

#[derive(Debug, Serialize)]
pub struct AgentsStatusResponse {
    pub agents: Vec<AgentStatus>,
}

pub async fn agents_status(State(state): State<Arc<AppState>>) -> Json<AgentsStatusResponse> {
    Json(AgentsStatusResponse {
        agents: state.coordinator.agent_statuses(),
    })
}

/// Ask a specific agent for a status narration on a task
pub async fn request_agent_update(
    State(state): State<Arc<AppState>>,
    Path((agent_id, task_id)): Path<(String, TaskId)>,
) -> std::result::Result<Json<AgentUpdate>, ApiError> {
    if state.coordinator.agent(&agent_id).is_none() {
        return Err(ApiError::agent_not_found());
    }

    let update = state.request_update(Some(&agent_id), task_id).await?;
    Ok(Json(update))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(state.health())
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: TaskStatus,
}

/// Move a task on the board
pub async fn update_task_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<TaskId>,
    Json(request): Json<StatusUpdateRequest>,
) -> std::result::Result<Json<TaskRecord>, ApiError> {
    let record = state.update_status(task_id, request.status).await?;
    Ok(Json(record))
}

/// Prometheus text exposition
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.gather(),
    )
}

/// Write half of an upgraded socket
pub struct SocketChannel {
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

impl SocketChannel {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self { sink: Mutex::new(sink) }
    }
}

#[async_trait]
impl ClientChannel for SocketChannel {
    async fn send_text(&self, text: String) -> Result<()> {
        self.sink
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| AgentLoopError::channel(e.to_string()))
    }
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Run one client connection until it closes
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, mut receiver) = socket.split();
    let id = state.connections.connect(Arc::new(SocketChannel::new(sender)));

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => handle_client_message(&state, id, &text).await,
            Ok(Message::Close(_)) => {
                debug!("Connection {} sent close frame", id);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive error on {}: {}", id, e);
                break;
            }
        }
    }

    state.connections.disconnect(id);
}

/// Dispatch one inbound client message
pub async fn handle_client_message(state: &AppState, id: ConnectionId, text: &str) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Ignoring malformed message from {}: {}", id, e);
            return;
        }
    };

    match message {
        ClientMessage::TaskAssignment { data } => {
            if let Err(e) = state.submit_task(data.into()).await {
                warn!("Task submission from {} failed: {}", id, e);
            }
        }
        ClientMessage::RequestUpdate { task_id, agent_id } => {
            if let Err(e) = state.request_update(agent_id.as_deref(), task_id).await {
                info!(
                    "Update request from {} for task {} not served: {}",
                    id, task_id, e
                );
            }
        }
        ClientMessage::Ping => {
            if let Err(e) = state.connections.send_event(&Event::Pong, id).await {
                debug!("Pong to {} not delivered: {}", id, e);
            }
        }
    }
}
