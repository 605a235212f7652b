//! Background activity simulator
//!
//! On a fixed interval, asks agents for unsolicited progress narrations on
//! the in-progress tasks they hold and broadcasts them as `agent_activity`.

use crate::coordinator::Coordinator;
use crate::fanout::ConnectionManager;
use agentloop_common::METRICS;
use agentloop_proto::{AgentActivity, Event};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Periodic narration of in-progress work
pub struct ActivitySimulator {
    coordinator: Arc<Coordinator>,
    connections: Arc<ConnectionManager>,
    interval: Duration,
}

impl ActivitySimulator {
    pub fn new(
        coordinator: Arc<Coordinator>,
        connections: Arc<ConnectionManager>,
        interval: Duration,
    ) -> Self {
        Self {
            coordinator,
            connections,
            interval,
        }
    }

    /// Run one pass; returns the number of activities broadcast
    pub async fn tick(&self) -> usize {
        if self.connections.connection_count() == 0 {
            return 0;
        }
        METRICS.fanout.simulator_ticks.inc();

        let tasks = match self.coordinator.store().list_in_progress().await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!("Simulator could not list active tasks: {}", e);
                return 0;
            }
        };

        let mut broadcast = 0;
        for task in tasks {
            let Some(assignee) = task.assignee.as_deref() else {
                continue;
            };

            let Some(agent) = self
                .coordinator
                .agents()
                .iter()
                .find(|a| a.name() == assignee && a.holds(task.id))
            else {
                continue;
            };

            // Clients may have left while earlier narrations were generated
            if self.connections.connection_count() == 0 {
                break;
            }

            let store = self.coordinator.store();
            let activity = agent.provide_update(task.id, store.as_ref()).await;
            let event = Event::AgentActivity(AgentActivity {
                task_id: task.id,
                agent_name: agent.name().to_string(),
                activity,
                timestamp: Utc::now(),
            });
            self.connections.broadcast_event(&event).await;
            broadcast += 1;
        }

        debug!("Simulator tick broadcast {} activities", broadcast);
        broadcast
    }

    /// Spawn the periodic loop; it stops when `shutdown` is cancelled
    pub fn start(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("Activity simulator running every {:?}", self.interval);

            // First pass happens one full interval after start
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Activity simulator stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                }
            }
        })
    }
}
