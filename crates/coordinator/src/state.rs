//! Shared application state
//!
//! Everything the HTTP and WebSocket handlers touch lives here, built once in
//! `main` and shared behind an `Arc`.

use crate::coordinator::Coordinator;
use crate::fanout::ConnectionManager;
use agentloop_agent::{build_model, MemoryTaskStore, TaskStore};
use agentloop_common::config::AgentLoopConfig;
use agentloop_common::error::{AgentLoopError, Result};
use agentloop_proto::{
    AgentUpdate, AssignmentResult, Event, HealthResponse, Task, TaskId, TaskRecord, TaskStatus,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub struct AppState {
    /// Scheduling authority
    pub coordinator: Arc<Coordinator>,

    /// Live client channels
    pub connections: Arc<ConnectionManager>,

    /// Whether `/metrics` is served
    pub metrics_enabled: bool,

    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    pub fn new(coordinator: Arc<Coordinator>, connections: Arc<ConnectionManager>) -> Self {
        Self {
            coordinator,
            connections,
            metrics_enabled: true,
            start_time: Instant::now(),
        }
    }

    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    /// Build the model, an in-memory store and the configured roster
    pub fn from_config(config: &AgentLoopConfig) -> Self {
        let model = build_model(&config.model);
        let store: Arc<dyn TaskStore> = Arc::new(MemoryTaskStore::new());
        let coordinator = Coordinator::from_config(config, model, store);

        Self::new(Arc::new(coordinator), Arc::new(ConnectionManager::new()))
            .with_metrics(config.observability.enable_metrics)
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        self.coordinator.store()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Record a task, assign it and broadcast the outcome
    pub async fn submit_task(&self, task: Task) -> Result<AssignmentResult> {
        if task.title.trim().is_empty() {
            return Err(AgentLoopError::invalid_input(format!(
                "task {} has an empty title",
                task.id
            )));
        }
        info!("Task submitted: {} ({})", task.id, task.title);
        self.store().upsert(TaskRecord::from(&task)).await?;

        let result = self.coordinator.assign_task(&task).await;
        self.connections
            .broadcast_event(&Event::TaskAssigned(result.clone()))
            .await;

        Ok(result)
    }

    /// Ask an agent for a status narration and broadcast it
    ///
    /// Without an agent id, the agent currently holding the task is asked.
    pub async fn request_update(
        &self,
        agent_id: Option<&str>,
        task_id: TaskId,
    ) -> Result<AgentUpdate> {
        let agent_id = match agent_id {
            Some(id) => id.to_string(),
            None => self
                .coordinator
                .holder_of(task_id)
                .map(|agent| agent.id().to_string())
                .ok_or_else(|| {
                    AgentLoopError::not_found(format!("no agent holds task {}", task_id))
                })?,
        };

        let update = self
            .coordinator
            .request_update(&agent_id, task_id)
            .await
            .ok_or_else(|| AgentLoopError::not_found("Agent not found"))?;

        self.connections
            .broadcast_event(&Event::AgentUpdate(update.clone()))
            .await;

        Ok(update)
    }

    /// Move a task to a new status
    ///
    /// Finishing a task frees the slot of whichever agent holds it.
    pub async fn update_status(&self, task_id: TaskId, status: TaskStatus) -> Result<TaskRecord> {
        let record = self
            .store()
            .set_status(task_id, status)
            .await?
            .ok_or_else(|| AgentLoopError::not_found(format!("task {}", task_id)))?;

        if status == TaskStatus::Done && self.coordinator.release_task(task_id) {
            debug!("Task {} finished; slot released", task_id);
        }

        Ok(record)
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now(),
            active_connections: self.connections.connection_count(),
            agents_count: self.coordinator.agent_count(),
            uptime_seconds: self.uptime_seconds(),
        }
    }
}
