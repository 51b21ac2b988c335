//! Task registry: identifier to task state, for the lifetime of the process.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::model::Task;
use crate::error::TaskError;

/// In-place mutation applied to a stored task under the registry's lock.
///
/// Runs synchronously; no lock is ever held across an await point.
pub type TaskUpdate<'a> = Box<dyn FnOnce(&mut Task) + Send + 'a>;

/// Storage seam for task state.
#[async_trait]
pub trait TaskRegistry: Send + Sync {
    /// Store a new task. An existing entry with the same id is replaced.
    async fn insert(&self, task: Task);

    /// Snapshot of a task.
    async fn get(&self, task_id: &str) -> Option<Task>;

    /// Apply `f` to the stored task.
    async fn update<'a>(&self, task_id: &str, f: TaskUpdate<'a>) -> Result<(), TaskError>;

    /// Snapshots of every task, in insertion order.
    async fn list(&self) -> Vec<Task>;

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[derive(Default)]
struct Entries {
    tasks: HashMap<String, Task>,
    order: Vec<String>,
}

/// Process-local registry behind a single `RwLock`.
#[derive(Default)]
pub struct InMemoryTaskRegistry {
    entries: RwLock<Entries>,
}

impl InMemoryTaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRegistry for InMemoryTaskRegistry {
    async fn insert(&self, task: Task) {
        let mut entries = self.entries.write().await;
        let task_id = task.task_id.clone();
        if entries.tasks.insert(task_id.clone(), task).is_none() {
            entries.order.push(task_id);
        }
    }

    async fn get(&self, task_id: &str) -> Option<Task> {
        self.entries.read().await.tasks.get(task_id).cloned()
    }

    async fn update<'a>(&self, task_id: &str, f: TaskUpdate<'a>) -> Result<(), TaskError> {
        let mut entries = self.entries.write().await;
        let task = entries
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskError::NotFound {
                id: task_id.to_string(),
            })?;
        f(task);
        Ok(())
    }

    async fn list(&self) -> Vec<Task> {
        let entries = self.entries.read().await;
        entries
            .order
            .iter()
            .filter_map(|id| entries.tasks.get(id))
            .cloned()
            .collect()
    }

    async fn len(&self) -> usize {
        self.entries.read().await.tasks.len()
    }
}
