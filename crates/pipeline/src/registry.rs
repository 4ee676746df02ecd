//! In-memory registry of generation tasks.
//!
//! The registry is the only owner of [`GenerationTask`] values. Reads are
//! scoped to the owning credential unless the caller is privileged.
//! Terminal tasks are dropped by [`TaskRegistry::evict_expired`] once they
//! have been finished for longer than the configured TTL; the durable
//! summary lives in the record store.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;

use relay_core::account::Caller;
use relay_core::error::CoreError;
use relay_core::image::ImageReference;
use relay_core::records::GenerationTask;
use relay_core::types::{TaskId, Timestamp};

pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, GenerationTask>>,
    ttl: Duration,
}

fn not_found(id: &str) -> CoreError {
    CoreError::NotFound {
        entity: "task",
        id: id.to_string(),
    }
}

impl TaskRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn insert(&self, task: GenerationTask) {
        self.tasks.write().await.insert(task.id.clone(), task);
    }

    /// Fetch a task visible to `caller`.
    pub async fn get(&self, id: &str, caller: &Caller) -> Result<GenerationTask, CoreError> {
        let tasks = self.tasks.read().await;
        let task = tasks.get(id).ok_or_else(|| not_found(id))?;
        if !caller.can_access(&task.owner) {
            return Err(CoreError::Forbidden("Task belongs to another account".into()));
        }
        Ok(task.clone())
    }

    /// Fetch a task without ownership checks.
    pub async fn peek(&self, id: &str) -> Option<GenerationTask> {
        self.tasks.read().await.get(id).cloned()
    }

    /// Tasks visible to `caller`, newest first.
    pub async fn list(&self, caller: &Caller) -> Vec<GenerationTask> {
        let mut visible: Vec<GenerationTask> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| caller.can_access(&t.owner))
            .cloned()
            .collect();
        visible.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        visible
    }

    pub async fn mark_processing(&self, id: &str) -> Result<(), CoreError> {
        let mut tasks = self.tasks.write().await;
        tasks.get_mut(id).ok_or_else(|| not_found(id))?.mark_processing()
    }

    /// Apply a progress report. Returns `false` if the task is gone or
    /// already terminal.
    pub async fn update_progress(&self, id: &str, percent: u8) -> bool {
        let mut tasks = self.tasks.write().await;
        tasks.get_mut(id).is_some_and(|t| t.set_progress(percent))
    }

    pub async fn complete(&self, id: &str, image: ImageReference) -> Result<(), CoreError> {
        let mut tasks = self.tasks.write().await;
        tasks.get_mut(id).ok_or_else(|| not_found(id))?.complete(image)
    }

    pub async fn fail(&self, id: &str, error: impl Into<String>) -> Result<(), CoreError> {
        let mut tasks = self.tasks.write().await;
        tasks.get_mut(id).ok_or_else(|| not_found(id))?.fail(error)
    }

    /// Drop terminal tasks finished at least `ttl` before `now`.
    pub async fn evict_expired(&self, now: Timestamp) -> usize {
        let ttl = self.ttl;
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, task| match task.finished_at {
            Some(finished) if task.status.is_terminal() => {
                (now - finished).to_std().map_or(true, |age| age < ttl)
            }
            _ => true,
        });
        before - tasks.len()
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
