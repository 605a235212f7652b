//! AgentLoop wire types
//!
//! Shared data model for tasks, agent judgments and the client event protocol.
//! Everything here is plain serde data; behavior lives in the agent and
//! coordinator crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Externally supplied task identifier
pub type TaskId = u64;

/// A unit of work submitted for assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    /// Free-text priority label (typically low/medium/high)
    pub priority: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Task {
    pub fn new(id: TaskId, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: description.into(),
            priority: "medium".to_string(),
            category: None,
        }
    }

    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = priority.into();
        self
    }
}

/// Board status of a stored task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Review,
    Done,
}

impl TaskStatus {
    /// Whether the task counts as actively worked on
    pub fn is_in_progress(self) -> bool {
        matches!(self, TaskStatus::InProgress | TaskStatus::Review)
    }
}

/// A task row as held by the task store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub priority: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
}

impl From<&Task> for TaskRecord {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            title: task.title.clone(),
            description: task.description.clone(),
            priority: task.priority.clone(),
            status: TaskStatus::Todo,
            assignee: None,
        }
    }
}

/// Complexity tier of an analyzed task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    #[default]
    Medium,
    High,
}

impl FromStr for Complexity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Complexity::Low),
            "medium" => Ok(Complexity::Medium),
            "high" => Ok(Complexity::High),
            other => Err(format!("unknown complexity: {}", other)),
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
        };
        f.write_str(label)
    }
}

pub const DEFAULT_ESTIMATED_HOURS: f64 = 4.0;
pub const DEFAULT_SKILL: &str = "General Development";
pub const DEFAULT_RECOMMENDED_AGENT: &str = "fullstack";

/// Derived, non-persisted judgment about a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAnalysis {
    pub complexity: Complexity,
    pub estimated_hours: f64,
    pub required_skills: Vec<String>,
    /// Lowercased agent category, e.g. "frontend"
    pub recommended_agent: String,
}

impl Default for TaskAnalysis {
    fn default() -> Self {
        Self {
            complexity: Complexity::default(),
            estimated_hours: DEFAULT_ESTIMATED_HOURS,
            required_skills: vec![DEFAULT_SKILL.to_string()],
            recommended_agent: DEFAULT_RECOMMENDED_AGENT.to_string(),
        }
    }
}

/// An agent's commitment to a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub agent_id: String,
    pub agent_name: String,
    pub response: String,
    pub confidence: f64,
    pub reasoning: String,
}

/// Outcome of an assignment attempt
///
/// `success == false` is a business negative, not a fault: `reason` says why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_response: Option<String>,
    pub analysis: TaskAnalysis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AssignmentResult {
    pub fn assigned(response: AgentResponse, analysis: TaskAnalysis) -> Self {
        Self {
            success: true,
            assigned_agent: Some(response.agent_name),
            agent_id: Some(response.agent_id),
            agent_response: Some(response.response),
            analysis,
            reason: None,
        }
    }

    pub fn unassigned(reason: impl Into<String>, analysis: TaskAnalysis) -> Self {
        Self {
            success: false,
            assigned_agent: None,
            agent_id: None,
            agent_response: None,
            analysis,
            reason: Some(reason.into()),
        }
    }
}

/// Snapshot of an agent's load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub id: String,
    pub name: String,
    pub specialization: String,
    pub current_tasks: usize,
    pub max_tasks: usize,
    pub available: bool,
}

/// Status narration requested by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentUpdate {
    pub task_id: TaskId,
    pub agent_name: String,
    pub update: String,
    pub timestamp: DateTime<Utc>,
}

/// Unsolicited status narration from the activity simulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentActivity {
    pub task_id: TaskId,
    pub agent_name: String,
    pub activity: String,
    pub timestamp: DateTime<Utc>,
}

/// Outbound event envelope, encoded as `{"type": ..., "data": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    TaskAssigned(AssignmentResult),
    AgentUpdate(AgentUpdate),
    AgentActivity(AgentActivity),
    Pong,
}

impl Event {
    /// Discriminator string used on the wire
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::TaskAssigned(_) => "task_assigned",
            Event::AgentUpdate(_) => "agent_update",
            Event::AgentActivity(_) => "agent_activity",
            Event::Pong => "pong",
        }
    }
}

/// Body of a task submission (REST and WebSocket)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSubmission {
    pub task_id: TaskId,
    pub task_title: String,
    #[serde(default)]
    pub task_description: String,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

fn default_priority() -> String {
    "medium".to_string()
}

impl From<TaskSubmission> for Task {
    fn from(submission: TaskSubmission) -> Self {
        Self {
            id: submission.task_id,
            title: submission.task_title,
            description: submission.task_description,
            priority: submission.priority,
            category: submission.category.filter(|c| !c.trim().is_empty()),
        }
    }
}

/// Inbound client message, discriminated by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    TaskAssignment {
        data: TaskSubmission,
    },
    RequestUpdate {
        task_id: TaskId,
        #[serde(default)]
        agent_id: Option<String>,
    },
    Ping,
}

/// Health check body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub active_connections: usize,
    pub agents_count: usize,
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_envelope_shape() {
        let event = Event::TaskAssigned(AssignmentResult::unassigned(
            "No available agents can handle this task",
            TaskAnalysis::default(),
        ));

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "task_assigned");
        assert_eq!(value["data"]["success"], false);
        assert_eq!(value["data"]["analysis"]["complexity"], "medium");
        assert!(value["data"].get("assigned_agent").is_none());
    }

    #[test]
    fn test_pong_has_no_data() {
        let value = serde_json::to_value(Event::Pong).unwrap();
        assert_eq!(value, json!({"type": "pong"}));
    }

    #[test]
    fn test_client_message_variants() {
        let ping: ClientMessage = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert_eq!(ping, ClientMessage::Ping);

        let update: ClientMessage =
            serde_json::from_str(r#"{"type": "request_update", "task_id": 7}"#).unwrap();
        assert_eq!(
            update,
            ClientMessage::RequestUpdate {
                task_id: 7,
                agent_id: None
            }
        );

        let assignment: ClientMessage = serde_json::from_value(json!({
            "type": "task_assignment",
            "data": {
                "task_id": 1,
                "task_title": "Build login form",
                "task_description": "Email and password",
                "priority": "high",
                "category": ""
            }
        }))
        .unwrap();
        let ClientMessage::TaskAssignment { data } = assignment else {
            panic!("expected task assignment");
        };
        let task = Task::from(data);
        assert_eq!(task.id, 1);
        assert_eq!(task.priority, "high");
        assert!(task.category.is_none());
    }

    #[test]
    fn test_unknown_client_message_rejected() {
        let shutdown = serde_json::from_str::<ClientMessage>(r#"{"type": "shutdown"}"#);
        assert!(shutdown.is_err());
    }

    #[test]
    fn test_complexity_parse() {
        assert_eq!("HIGH".parse::<Complexity>(), Ok(Complexity::High));
        assert!("extreme".parse::<Complexity>().is_err());
    }

    #[test]
    fn test_in_progress_statuses() {
        assert!(TaskStatus::InProgress.is_in_progress());
        assert!(TaskStatus::Review.is_in_progress());
        assert!(!TaskStatus::Todo.is_in_progress());
        assert!(!TaskStatus::Done.is_in_progress());
    }
}
