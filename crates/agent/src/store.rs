//! Task store interface
//!
//! The row store itself is an external collaborator. The coordination engine
//! only needs reads by id, a listing of in-progress work and assignee updates.

use agentloop_common::error::Result;
use agentloop_proto::{TaskId, TaskRecord, TaskStatus};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Persistent task store
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Read a task by id
    async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>>;

    /// Tasks that are in progress and have a non-empty assignee
    async fn list_in_progress(&self) -> Result<Vec<TaskRecord>>;

    /// Set the assignee of a task; returns false when no such task exists
    async fn set_assignee(&self, id: TaskId, assignee: &str) -> Result<bool>;

    /// Insert a task, or refresh its title/description/priority if present
    async fn upsert(&self, record: TaskRecord) -> Result<TaskRecord>;

    /// Move a task to a new status; returns the updated row
    async fn set_status(&self, id: TaskId, status: TaskStatus) -> Result<Option<TaskRecord>>;
}

/// In-process task store
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, TaskRecord>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tasks
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>> {
        Ok(self.tasks.read().get(&id).cloned())
    }

    async fn list_in_progress(&self) -> Result<Vec<TaskRecord>> {
        let tasks = self.tasks.read();
        let mut active: Vec<TaskRecord> = tasks
            .values()
            .filter(|t| t.status.is_in_progress())
            .filter(|t| t.assignee.as_deref().is_some_and(|a| !a.trim().is_empty()))
            .cloned()
            .collect();
        active.sort_by_key(|t| t.id);
        Ok(active)
    }

    async fn set_assignee(&self, id: TaskId, assignee: &str) -> Result<bool> {
        let mut tasks = self.tasks.write();
        match tasks.get_mut(&id) {
            Some(task) => {
                task.assignee = Some(assignee.to_string());
                debug!("Task {} assignee set to {}", id, assignee);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn upsert(&self, record: TaskRecord) -> Result<TaskRecord> {
        let mut tasks = self.tasks.write();
        let stored = tasks
            .entry(record.id)
            .and_modify(|existing| {
                existing.title = record.title.clone();
                existing.description = record.description.clone();
                existing.priority = record.priority.clone();
            })
            .or_insert_with(|| record.clone());
        Ok(stored.clone())
    }

    async fn set_status(&self, id: TaskId, status: TaskStatus) -> Result<Option<TaskRecord>> {
        let mut tasks = self.tasks.write();
        Ok(tasks.get_mut(&id).map(|task| {
            task.status = status;
            task.clone()
        }))
    }
}
