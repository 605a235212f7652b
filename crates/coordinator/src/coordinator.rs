//! Task assignment and agent scoring
//!
//! The coordinator owns the agent roster and picks a single agent for each
//! submitted task. Selection is score-based; capacity is taken through an
//! atomic reservation so concurrent assignments can never overfill an agent.

use agentloop_agent::{matches_specialization, Agent, LanguageModel, TaskStore};
use agentloop_common::config::AgentLoopConfig;
use agentloop_common::{LatencyTimer, METRICS};
use agentloop_proto::{AgentStatus, AgentUpdate, AssignmentResult, Task, TaskAnalysis, TaskId};
use chrono::Utc;
use futures_util::future::join_all;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Awarded when the agent's specialization matches the recommended category
pub const SPECIALIZATION_BONUS: f64 = 50.0;

/// Scaled by the fraction of free capacity
pub const CAPACITY_WEIGHT: f64 = 30.0;

/// Added to every eligible candidate; does not change the ranking
pub const BASELINE_BONUS: f64 = 20.0;

pub const NO_AGENT_REASON: &str = "No available agents can handle this task";

pub const COORDINATOR_ID: &str = "coordinator";
pub const COORDINATOR_NAME: &str = "AI Coordinator";
pub const COORDINATOR_SPECIALIZATION: &str = "Task Management and Assignment";

/// Compatibility score of one candidate
pub fn compatibility_score(
    specialization: &str,
    recommended: &str,
    load: usize,
    capacity: usize,
) -> f64 {
    let mut score = 0.0;

    if matches_specialization(specialization, recommended) {
        score += SPECIALIZATION_BONUS;
    }

    // Prefer agents with fewer current tasks
    if capacity > 0 {
        let free = capacity.saturating_sub(load) as f64;
        score += free / capacity as f64 * CAPACITY_WEIGHT;
    }

    score + BASELINE_BONUS
}

/// Score an agent against a recommended category using its current load
pub fn score_agent(agent: &Agent, recommended: &str) -> f64 {
    compatibility_score(
        agent.specialization(),
        recommended,
        agent.load(),
        agent.capacity(),
    )
}

/// Single scheduling authority for the process
pub struct Coordinator {
    /// The coordinator's own analysis agent
    analyst: Agent,

    /// Registered specialists, in registration order
    agents: Vec<Arc<Agent>>,

    /// Task store receiving assignee updates
    store: Arc<dyn TaskStore>,

    /// Task ids with an assignment currently running
    in_flight: Mutex<HashSet<TaskId>>,
}

/// Exclusive right to assign one task id; dropped when the attempt ends
struct TaskClaim<'a> {
    in_flight: &'a Mutex<HashSet<TaskId>>,
    task_id: TaskId,
}

impl Drop for TaskClaim<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.task_id);
    }
}

/// Why a task id could not be claimed
enum ClaimRefusal {
    Held(String),
    InFlight,
}

impl Coordinator {
    /// Create a coordinator with an empty roster
    pub fn new(model: Arc<dyn LanguageModel>, store: Arc<dyn TaskStore>) -> Self {
        Self {
            analyst: Agent::new(
                COORDINATOR_ID,
                COORDINATOR_NAME,
                COORDINATOR_SPECIALIZATION,
                model,
            ),
            agents: Vec::new(),
            store,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Create a coordinator and register the configured roster
    ///
    /// All agents share `model`.
    pub fn from_config(
        config: &AgentLoopConfig,
        model: Arc<dyn LanguageModel>,
        store: Arc<dyn TaskStore>,
    ) -> Self {
        let mut coordinator = Self::new(model.clone(), store);
        for agent_config in &config.agents {
            coordinator.register_agent(Agent::from_config(agent_config, model.clone()));
        }
        coordinator
    }

    /// Register an agent; an existing agent with the same id is replaced in place
    pub fn register_agent(&mut self, agent: Agent) -> Arc<Agent> {
        let agent = Arc::new(agent);

        match self.agents.iter_mut().find(|a| a.id() == agent.id()) {
            Some(slot) => {
                warn!("Replacing registered agent {}", agent.id());
                *slot = agent.clone();
            }
            None => {
                info!(
                    "Registered agent: {} ({}, capacity {})",
                    agent.id(),
                    agent.specialization(),
                    agent.capacity()
                );
                self.agents.push(agent.clone());
            }
        }

        agent
    }

    pub fn agent(&self, id: &str) -> Option<&Arc<Agent>> {
        self.agents.iter().find(|a| a.id() == id)
    }

    pub fn agents(&self) -> &[Arc<Agent>] {
        &self.agents
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn agent_statuses(&self) -> Vec<AgentStatus> {
        self.agents.iter().map(|a| a.status()).collect()
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Agent currently holding `task_id`, if any
    pub fn holder_of(&self, task_id: TaskId) -> Option<&Arc<Agent>> {
        self.agents.iter().find(|a| a.holds(task_id))
    }

    /// Claim `task_id` for one assignment attempt
    ///
    /// Refused while another attempt for the id is running or an agent holds it.
    fn claim(&self, task_id: TaskId) -> std::result::Result<TaskClaim<'_>, ClaimRefusal> {
        let mut in_flight = self.in_flight.lock();
        if in_flight.contains(&task_id) {
            return Err(ClaimRefusal::InFlight);
        }
        if let Some(holder) = self.holder_of(task_id) {
            return Err(ClaimRefusal::Held(holder.name().to_string()));
        }
        in_flight.insert(task_id);

        Ok(TaskClaim {
            in_flight: &self.in_flight,
            task_id,
        })
    }

    /// Assign a task to the best eligible agent
    ///
    /// Never fails: upstream errors degrade inside the agents, and "nobody can
    /// take it" is reported as an unsuccessful result. A task id that is held
    /// or being assigned is refused without consulting the model.
    pub async fn assign_task(&self, task: &Task) -> AssignmentResult {
        METRICS.assignment.requests_total.inc();
        let _timer = LatencyTimer::start(&METRICS.assignment.duration);

        let _claim = match self.claim(task.id) {
            Ok(claim) => claim,
            Err(refusal) => {
                let reason = match refusal {
                    ClaimRefusal::Held(holder) => {
                        format!("Task {} is already assigned to {}", task.id, holder)
                    }
                    ClaimRefusal::InFlight => format!("Task {} is already being assigned", task.id),
                };
                info!("{}", reason);
                return AssignmentResult::unassigned(reason, TaskAnalysis::default());
            }
        };

        let analysis = self.analyst.analyze_task(task).await;

        // Every agent judges the task on its own
        let eligibility =
            join_all(self.agents.iter().map(|agent| agent.can_accept_task(task))).await;

        let mut ranked: Vec<(f64, &Arc<Agent>)> = self
            .agents
            .iter()
            .zip(eligibility)
            .filter(|(_, eligible)| *eligible)
            .map(|(agent, _)| (score_agent(agent, &analysis.recommended_agent), agent))
            .collect();

        // Stable sort: equal scores keep registration order
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

        for (score, agent) in ranked {
            let Some(reservation) = agent.try_reserve(task.id) else {
                METRICS.assignment.reservation_conflicts.inc();
                debug!(
                    "{} lost its slot for task {} to a concurrent assignment",
                    agent.id(),
                    task.id
                );
                continue;
            };

            let response = agent.acknowledge(&reservation, task).await;

            match self.store.set_assignee(task.id, agent.name()).await {
                Ok(found) => {
                    if !found {
                        debug!(
                            "Task {} is not in the store; assignee not recorded",
                            task.id
                        );
                    }
                    reservation.confirm();
                }
                Err(e) => {
                    warn!(
                        "Failed to record assignment of task {} to {}: {}",
                        task.id,
                        agent.id(),
                        e
                    );
                    return AssignmentResult::unassigned(
                        format!("Failed to record assignment: {}", e),
                        analysis,
                    );
                }
            }

            METRICS.assignment.assigned_total.inc();
            info!(
                "Assigned task {} to {} (score {:.1}, load {}/{})",
                task.id,
                agent.id(),
                score,
                agent.load(),
                agent.capacity()
            );
            return AssignmentResult::assigned(response, analysis);
        }

        METRICS.assignment.no_agent_available.inc();
        info!("No agent available for task {}", task.id);
        AssignmentResult::unassigned(NO_AGENT_REASON, analysis)
    }

    /// Ask a named agent for a status narration
    ///
    /// Returns `None` when no agent has that id.
    pub async fn request_update(&self, agent_id: &str, task_id: TaskId) -> Option<AgentUpdate> {
        let agent = self.agent(agent_id)?;
        let update = agent.provide_update(task_id, self.store.as_ref()).await;

        Some(AgentUpdate {
            task_id,
            agent_name: agent.name().to_string(),
            update,
            timestamp: Utc::now(),
        })
    }

    /// Release `task_id` from whichever agent holds it
    pub fn release_task(&self, task_id: TaskId) -> bool {
        let mut released = false;
        for agent in &self.agents {
            if agent.release_task(task_id) {
                info!("{} released task {}", agent.id(), task_id);
                released = true;
            }
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentloop_agent::{MemoryTaskStore, StaticModel, UnavailableModel};
    use agentloop_proto::TaskRecord;
    use std::time::Duration;

    fn reply(recommended: &str) -> String {
        format!(
            "Complexity: medium\nEstimated Hours: 3\nRequired Skills: Rust\n\
             Recommended Agent Type: {}",
            recommended
        )
    }

    fn model(recommended: &str) -> Arc<dyn LanguageModel> {
        Arc::new(StaticModel::new(reply(recommended)))
    }

    fn frontend_agent(id: &str, name: &str) -> Agent {
        Agent::new(id, name, "Frontend", model("frontend"))
    }

    fn slow_model() -> Arc<dyn LanguageModel> {
        let model = StaticModel::new(reply("frontend"));
        Arc::new(model.with_latency(Duration::from_millis(50)))
    }

    fn store() -> Arc<dyn TaskStore> {
        Arc::new(MemoryTaskStore::new())
    }

    fn task(id: TaskId) -> Task {
        Task::new(id, "Build login form", "Email and password fields")
            .with_priority("high")
    }

    #[test]
    fn test_specialization_bonus_is_the_only_difference() {
        let frontend = frontend_agent("fe", "Sarah AI");
        let backend = Agent::new("be", "Mike AI", "Backend", model("frontend"));

        let fe_score = score_agent(&frontend, "frontend");
        let be_score = score_agent(&backend, "frontend");

        assert_eq!(fe_score - be_score, SPECIALIZATION_BONUS);
        assert_eq!(fe_score, 100.0);
    }

    #[test]
    fn test_capacity_term_scales_with_free_slots() {
        assert_eq!(compatibility_score("Backend", "frontend", 0, 3), 50.0);
        assert_eq!(compatibility_score("Backend", "frontend", 3, 3), 20.0);
        let partial = compatibility_score("Backend", "frontend", 1, 3);
        assert!((partial - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_register_replaces_in_place() {
        let mut coordinator = Coordinator::new(model("frontend"), store());
        coordinator.register_agent(frontend_agent("a", "First"));
        coordinator.register_agent(Agent::new("b", "Second", "Backend", model("frontend")));
        coordinator.register_agent(frontend_agent("a", "Replacement"));

        assert_eq!(coordinator.agent_count(), 2);
        assert_eq!(coordinator.agents()[0].name(), "Replacement");
        assert_eq!(coordinator.agents()[1].name(), "Second");
    }

    #[tokio::test]
    async fn test_tie_goes_to_first_registered() {
        let mut coordinator = Coordinator::new(model("frontend"), store());
        coordinator.register_agent(frontend_agent("fe_1", "Sarah AI"));
        coordinator.register_agent(frontend_agent("fe_2", "Nina AI"));

        let result = coordinator.assign_task(&task(1)).await;

        assert!(result.success);
        assert_eq!(result.assigned_agent.as_deref(), Some("Sarah AI"));
    }

    #[tokio::test]
    async fn test_lower_load_wins_among_matches() {
        let mut coordinator = Coordinator::new(model("frontend"), store());
        let busy = coordinator.register_agent(frontend_agent("fe_1", "Sarah AI"));
        coordinator.register_agent(frontend_agent("fe_2", "Nina AI"));
        busy.try_reserve(99).unwrap().confirm();

        let result = coordinator.assign_task(&task(1)).await;

        assert_eq!(result.agent_id.as_deref(), Some("fe_2"));
    }

    #[tokio::test]
    async fn test_no_eligible_agent_is_a_negative_result() {
        let mut coordinator = Coordinator::new(model("devops"), store());
        coordinator.register_agent(Agent::new("fe", "Sarah AI", "Frontend", model("devops")));

        let result = coordinator.assign_task(&task(1)).await;

        assert!(!result.success);
        assert_eq!(result.reason.as_deref(), Some(NO_AGENT_REASON));
        assert_eq!(result.analysis.recommended_agent, "devops");
        assert_eq!(coordinator.agents()[0].load(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_assignments_respect_capacity() {
        let slow = slow_model();
        let mut coordinator = Coordinator::new(slow.clone(), store());
        let sarah = Agent::new("fe", "Sarah AI", "Frontend", slow);
        let agent = coordinator.register_agent(sarah.with_capacity(1));

        let (task_1, task_2) = (task(1), task(2));
        let (first, second) = tokio::join!(
            coordinator.assign_task(&task_1),
            coordinator.assign_task(&task_2)
        );

        let successes = [&first, &second].iter().filter(|r| r.success).count();
        assert_eq!(successes, 1);
        assert_eq!(agent.load(), 1);
        assert!(agent.load() <= agent.capacity());
    }

    #[tokio::test]
    async fn test_failing_model_still_returns_structured_result() {
        let failing: Arc<dyn LanguageModel> = Arc::new(UnavailableModel::new("quota exceeded"));
        let mut coordinator = Coordinator::new(failing.clone(), store());
        coordinator.register_agent(Agent::new("fe", "Sarah AI", "Frontend", failing.clone()));
        coordinator.register_agent(Agent::new("fs", "Alex AI", "Fullstack", failing));

        let result = coordinator.assign_task(&task(1)).await;

        assert_eq!(result.analysis, TaskAnalysis::default());
        assert!(result.success);
        assert_eq!(result.assigned_agent.as_deref(), Some("Alex AI"));
        assert_eq!(
            result.agent_response.as_deref(),
            Some("I'll work on 'Build login form' using my Fullstack expertise.")
        );
    }

    #[tokio::test]
    async fn test_request_update_unknown_agent() {
        let coordinator = Coordinator::new(model("frontend"), store());
        assert!(coordinator.request_update("ghost", 1).await.is_none());
    }

    #[tokio::test]
    async fn test_request_update_and_release() {
        let store = store();
        store.upsert(TaskRecord::from(&task(1))).await.unwrap();
        let mut coordinator = Coordinator::new(model("frontend"), store.clone());
        coordinator.register_agent(frontend_agent("fe", "Sarah AI"));

        assert!(coordinator.assign_task(&task(1)).await.success);
        assert_eq!(coordinator.holder_of(1).map(|a| a.id()), Some("fe"));

        let update = coordinator.request_update("fe", 1).await.unwrap();
        assert_eq!(update.agent_name, "Sarah AI");
        assert_eq!(update.task_id, 1);

        assert!(coordinator.release_task(1));
        assert!(coordinator.holder_of(1).is_none());
        assert!(!coordinator.release_task(1));
    }

    #[tokio::test]
    async fn test_resubmitted_task_stays_with_holder() {
        let store = store();
        store.upsert(TaskRecord::from(&task(1))).await.unwrap();
        let mut coordinator = Coordinator::new(model("frontend"), store.clone());
        let first = coordinator.register_agent(frontend_agent("fe_1", "Sarah AI"));
        let second = coordinator.register_agent(frontend_agent("fe_2", "Nina AI"));

        assert!(coordinator.assign_task(&task(1)).await.success);
        let again = coordinator.assign_task(&task(1)).await;

        assert!(!again.success);
        assert_eq!(
            again.reason.as_deref(),
            Some("Task 1 is already assigned to Sarah AI")
        );
        assert!(first.holds(1));
        assert!(!second.holds(1));
        assert_eq!(
            store.get(1).await.unwrap().unwrap().assignee.as_deref(),
            Some("Sarah AI")
        );

        // Once released, the task can be assigned again
        assert!(coordinator.release_task(1));
        assert!(coordinator.assign_task(&task(1)).await.success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_submissions_of_one_task() {
        let slow = slow_model();
        let mut coordinator = Coordinator::new(slow.clone(), store());
        let first =
            coordinator.register_agent(Agent::new("fe_1", "Sarah AI", "Frontend", slow.clone()));
        let second = coordinator.register_agent(Agent::new("fe_2", "Nina AI", "Frontend", slow));

        let (task_a, task_b) = (task(1), task(1));
        let (a, b) = tokio::join!(
            coordinator.assign_task(&task_a),
            coordinator.assign_task(&task_b)
        );

        let successes = [&a, &b].iter().filter(|r| r.success).count();
        assert_eq!(successes, 1);
        assert_eq!(first.holds(1) as usize + second.holds(1) as usize, 1);
        assert_eq!(first.load() + second.load(), 1);
    }
}
