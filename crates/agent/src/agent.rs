//! Capacity-bounded agents
//!
//! An agent wraps one language model endpoint and holds at most `capacity`
//! task ids at a time. Every model-backed judgment degrades to a fixed
//! fallback when the model call fails; none of them return an error.

use crate::analysis::{
    acceptance_prompt, analysis_prompt, matches_specialization, parse_analysis, progress_prompt,
};
use crate::model::LanguageModel;
use crate::store::TaskStore;
use agentloop_common::config::AgentConfig;
use agentloop_common::error::Result;
use agentloop_common::{LatencyTimer, METRICS};
use agentloop_proto::{AgentResponse, AgentStatus, Task, TaskAnalysis, TaskId};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default number of tasks an agent may hold
pub const DEFAULT_CAPACITY: usize = 3;

/// Confidence reported when the model acknowledged the task
pub const ACCEPT_CONFIDENCE: f64 = 0.85;

/// Confidence reported when the acknowledgment is the templated fallback
pub const FALLBACK_CONFIDENCE: f64 = 0.70;

pub const NOT_WORKING_MESSAGE: &str = "I'm not currently working on this task.";
pub const TASK_NOT_FOUND_MESSAGE: &str = "Task not found.";

/// A specialist worker backed by a language model
pub struct Agent {
    /// Unique agent identifier
    id: String,

    /// Display name
    name: String,

    /// Specialization label
    specialization: String,

    /// Maximum number of held tasks
    capacity: usize,

    /// Model endpoint
    model: Arc<dyn LanguageModel>,

    /// Currently held task ids, in acceptance order
    held: Mutex<Vec<TaskId>>,
}

/// A capacity slot held for one task
///
/// The slot is released on drop unless `confirm` was called.
#[must_use = "an unconfirmed reservation releases its slot when dropped"]
pub struct Reservation<'a> {
    agent: &'a Agent,
    task_id: TaskId,
    confirmed: bool,
}

impl Reservation<'_> {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn agent(&self) -> &Agent {
        self.agent
    }

    /// Keep the slot permanently
    pub fn confirm(mut self) {
        self.confirmed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.confirmed {
            self.agent.release_task(self.task_id);
            debug!(
                "Released unconfirmed reservation of task {} on {}",
                self.task_id, self.agent.id
            );
        }
    }
}

impl Agent {
    /// Create a new agent with the default capacity
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        specialization: impl Into<String>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            specialization: specialization.into(),
            capacity: DEFAULT_CAPACITY,
            model,
            held: Mutex::new(Vec::new()),
        }
    }

    /// Create an agent from its roster entry
    pub fn from_config(config: &AgentConfig, model: Arc<dyn LanguageModel>) -> Self {
        Self::new(
            config.id.clone(),
            config.name.clone(),
            config.specialization.clone(),
            model,
        )
        .with_capacity(config.capacity)
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn specialization(&self) -> &str {
        &self.specialization
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of currently held tasks
    pub fn load(&self) -> usize {
        self.held.lock().len()
    }

    pub fn is_available(&self) -> bool {
        self.load() < self.capacity
    }

    pub fn holds(&self, task_id: TaskId) -> bool {
        self.held.lock().contains(&task_id)
    }

    /// Ids of held tasks, in acceptance order
    pub fn held_tasks(&self) -> Vec<TaskId> {
        self.held.lock().clone()
    }

    pub fn status(&self) -> AgentStatus {
        let load = self.load();
        AgentStatus {
            id: self.id.clone(),
            name: self.name.clone(),
            specialization: self.specialization.clone(),
            current_tasks: load,
            max_tasks: self.capacity,
            available: load < self.capacity,
        }
    }

    async fn call_model(&self, prompt: &str) -> Result<String> {
        METRICS.model.calls_total.inc();
        let _timer = LatencyTimer::start(&METRICS.model.call_duration);
        self.model.generate(prompt).await.inspect_err(|_| {
            METRICS.model.fallbacks_total.inc();
        })
    }

    /// Analyze a task from this agent's point of view
    ///
    /// Computed fresh on every call. A failed model call yields the default analysis.
    pub async fn analyze_task(&self, task: &Task) -> TaskAnalysis {
        let prompt = analysis_prompt(&self.specialization, task);

        match self.call_model(&prompt).await {
            Ok(reply) => {
                let analysis = parse_analysis(&reply);
                debug!(
                    "{} analyzed task {}: complexity={}, hours={}, recommended={}",
                    self.id,
                    task.id,
                    analysis.complexity,
                    analysis.estimated_hours,
                    analysis.recommended_agent
                );
                analysis
            }
            Err(e) => {
                warn!("{} failed to analyze task {}: {}", self.id, task.id, e);
                TaskAnalysis::default()
            }
        }
    }

    /// Whether this agent has room and its own analysis recommends its specialization
    pub async fn can_accept_task(&self, task: &Task) -> bool {
        if !self.is_available() {
            return false;
        }

        let analysis = self.analyze_task(task).await;
        matches_specialization(&self.specialization, &analysis.recommended_agent)
    }

    /// Atomically take a capacity slot for `task_id`
    ///
    /// Returns `None` when the agent is full or already holds the task.
    pub fn try_reserve(&self, task_id: TaskId) -> Option<Reservation<'_>> {
        let mut held = self.held.lock();
        if held.len() >= self.capacity || held.contains(&task_id) {
            return None;
        }
        held.push(task_id);

        Some(Reservation {
            agent: self,
            task_id,
            confirmed: false,
        })
    }

    /// Drop a held task; returns whether it was held
    pub fn release_task(&self, task_id: TaskId) -> bool {
        let mut held = self.held.lock();
        match held.iter().position(|id| *id == task_id) {
            Some(index) => {
                held.remove(index);
                true
            }
            None => false,
        }
    }

    /// Produce the acknowledgment for a task whose slot is already reserved
    pub async fn acknowledge(&self, reservation: &Reservation<'_>, task: &Task) -> AgentResponse {
        debug_assert_eq!(reservation.task_id(), task.id);
        let prompt = acceptance_prompt(&self.name, &self.specialization, task);

        match self.call_model(&prompt).await {
            Ok(reply) => AgentResponse {
                agent_id: self.id.clone(),
                agent_name: self.name.clone(),
                response: reply,
                confidence: ACCEPT_CONFIDENCE,
                reasoning: format!("Task matches my {} specialization", self.specialization),
            },
            Err(e) => {
                warn!("{} failed to acknowledge task {}: {}", self.id, task.id, e);
                AgentResponse {
                    agent_id: self.id.clone(),
                    agent_name: self.name.clone(),
                    response: format!(
                        "I'll work on '{}' using my {} expertise.",
                        task.title, self.specialization
                    ),
                    confidence: FALLBACK_CONFIDENCE,
                    reasoning: "Default response due to API error".to_string(),
                }
            }
        }
    }

    /// Take on a task and acknowledge it
    ///
    /// Returns `None` when the agent is at capacity or already holds the task.
    pub async fn accept_task(&self, task: &Task) -> Option<AgentResponse> {
        let reservation = self.try_reserve(task.id)?;
        let response = self.acknowledge(&reservation, task).await;
        reservation.confirm();

        info!(
            "{} accepted task {} ({}/{})",
            self.id,
            task.id,
            self.load(),
            self.capacity
        );
        Some(response)
    }

    /// Narrate progress on a held task
    pub async fn provide_update(&self, task_id: TaskId, store: &dyn TaskStore) -> String {
        if !self.holds(task_id) {
            return NOT_WORKING_MESSAGE.to_string();
        }

        let record = match store.get(task_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return TASK_NOT_FOUND_MESSAGE.to_string(),
            Err(e) => {
                warn!("{} could not read task {}: {}", self.id, task_id, e);
                return TASK_NOT_FOUND_MESSAGE.to_string();
            }
        };

        let prompt = progress_prompt(&self.name, &record);
        match self.call_model(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("{} failed to narrate task {}: {}", self.id, task_id, e);
                format!(
                    "Working on {}. Making steady progress on the {} aspects.",
                    record.title, self.specialization
                )
            }
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("specialization", &self.specialization)
            .field("capacity", &self.capacity)
            .field("model", &self.model.model_name())
            .field("held", &*self.held.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StaticModel, UnavailableModel};
    use crate::store::MemoryTaskStore;
    use agentloop_proto::TaskRecord;

    const FRONTEND_REPLY: &str = "Complexity: medium\n\
                                  Estimated Hours: 5\n\
                                  Required Skills: React\n\
                                  Recommended Agent Type: frontend";

    fn agent_with(reply: &str) -> Agent {
        Agent::new(
            "frontend_specialist",
            "Sarah AI",
            "Frontend",
            Arc::new(StaticModel::new(reply)),
        )
    }

    fn failing_agent() -> Agent {
        Agent::new(
            "frontend_specialist",
            "Sarah AI",
            "Frontend",
            Arc::new(UnavailableModel::new("quota exceeded")),
        )
    }

    fn task(id: TaskId) -> Task {
        Task::new(id, "Build login form", "Email and password fields")
            .with_priority("high")
    }

    #[tokio::test]
    async fn test_analyze_task_parses_reply() {
        let analysis = agent_with(FRONTEND_REPLY).analyze_task(&task(1)).await;
        assert_eq!(analysis.estimated_hours, 5.0);
        assert_eq!(analysis.recommended_agent, "frontend");
    }

    #[tokio::test]
    async fn test_analyze_task_failure_gives_defaults() {
        let analysis = failing_agent().analyze_task(&task(1)).await;
        assert_eq!(analysis, TaskAnalysis::default());
    }

    #[tokio::test]
    async fn test_can_accept_requires_matching_recommendation() {
        assert!(agent_with(FRONTEND_REPLY).can_accept_task(&task(1)).await);
        let backend = agent_with("Recommended Agent Type: backend");
        assert!(!backend.can_accept_task(&task(1)).await);
    }

    #[tokio::test]
    async fn test_can_accept_false_at_capacity() {
        let agent = agent_with(FRONTEND_REPLY).with_capacity(1);
        assert!(agent.accept_task(&task(1)).await.is_some());

        assert!(!agent.can_accept_task(&task(2)).await);
        assert!(!agent.is_available());
    }

    #[tokio::test]
    async fn test_accept_task_uses_model_reply() {
        let agent = agent_with("On it: starting with the form layout.");
        let response = agent.accept_task(&task(1)).await.unwrap();

        assert_eq!(response.response, "On it: starting with the form layout.");
        assert_eq!(response.confidence, ACCEPT_CONFIDENCE);
        assert_eq!(response.agent_name, "Sarah AI");
        assert!(agent.holds(1));
    }

    #[tokio::test]
    async fn test_accept_task_fallback_keeps_slot() {
        let agent = failing_agent();
        let response = agent.accept_task(&task(1)).await.unwrap();

        assert_eq!(
            response.response,
            "I'll work on 'Build login form' using my Frontend expertise."
        );
        assert_eq!(response.confidence, FALLBACK_CONFIDENCE);
        assert_eq!(response.reasoning, "Default response due to API error");
        assert_eq!(agent.load(), 1);
    }

    #[tokio::test]
    async fn test_accept_never_exceeds_capacity() {
        let agent = agent_with(FRONTEND_REPLY).with_capacity(2);
        for id in 1..=5 {
            let _ = agent.accept_task(&task(id)).await;
            assert!(agent.load() <= agent.capacity());
        }
        assert_eq!(agent.held_tasks(), vec![1, 2]);
    }

    #[test]
    fn test_dropped_reservation_releases_slot() {
        let agent = agent_with(FRONTEND_REPLY).with_capacity(1);
        {
            let reservation = agent.try_reserve(1).unwrap();
            assert_eq!(agent.load(), 1);
            assert!(agent.try_reserve(2).is_none());
            drop(reservation);
        }
        assert_eq!(agent.load(), 0);

        agent.try_reserve(2).unwrap().confirm();
        assert!(agent.holds(2));
    }

    #[test]
    fn test_reserve_same_task_twice_refused() {
        let agent = agent_with(FRONTEND_REPLY);
        agent.try_reserve(1).unwrap().confirm();
        assert!(agent.try_reserve(1).is_none());
        assert_eq!(agent.load(), 1);
    }

    #[tokio::test]
    async fn test_provide_update_messages() {
        let store = MemoryTaskStore::new();
        let agent = agent_with("Form layout done, wiring validation next.");

        assert_eq!(agent.provide_update(1, &store).await, NOT_WORKING_MESSAGE);

        agent.accept_task(&task(1)).await.unwrap();
        assert_eq!(agent.provide_update(1, &store).await, TASK_NOT_FOUND_MESSAGE);

        store.upsert(TaskRecord::from(&task(1))).await.unwrap();
        assert_eq!(
            agent.provide_update(1, &store).await,
            "Form layout done, wiring validation next."
        );
    }

    #[tokio::test]
    async fn test_provide_update_fallback() {
        let store = MemoryTaskStore::new();
        store.upsert(TaskRecord::from(&task(1))).await.unwrap();
        let agent = failing_agent();
        agent.accept_task(&task(1)).await.unwrap();

        assert_eq!(
            agent.provide_update(1, &store).await,
            "Working on Build login form. Making steady progress on the Frontend aspects."
        );
    }

    #[test]
    fn test_status_reports_load() {
        let agent = agent_with(FRONTEND_REPLY).with_capacity(1);
        agent.try_reserve(4).unwrap().confirm();

        let status = agent.status();
        assert_eq!(status.current_tasks, 1);
        assert_eq!(status.max_tasks, 1);
        assert!(!status.available);
    }
}
