//! Client-side task projection and idempotent merge
//!
//! The cache holds a derived copy of the server's task collection, never
//! the authoritative one. Two unordered input streams mutate it: direct
//! responses to this client's own requests, and the broadcast event stream,
//! which also echoes this client's own mutations. Both go through the same
//! merge functions, so the echo arriving before or after the direct
//! response makes no difference.

use shared::Task;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct TaskCache {
    tasks: HashMap<u64, Task>,
}

impl TaskCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole projection with a fresh full-collection fetch.
    /// This is the only recovery path for events missed while disconnected.
    pub fn hydrate(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks.into_iter().map(|task| (task.id, task)).collect();
    }

    /// Merges a Created event. A task already present under the same id is
    /// left alone; this dedup is the sole defense against the author
    /// double-inserting via its own broadcast echo.
    pub fn apply_created(&mut self, task: Task) {
        self.tasks.entry(task.id).or_insert(task);
    }

    /// Merges an Updated event. An unknown id is inserted rather than
    /// dropped, so a missed Created event cannot permanently hide a row.
    pub fn apply_updated(&mut self, task: Task) {
        self.tasks.insert(task.id, task);
    }

    /// Merges a Deleted event. Absent ids are a no-op.
    pub fn apply_deleted(&mut self, id: u64) {
        self.tasks.remove(&id);
    }

    pub fn get(&self, id: u64) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Snapshot ordered newest first, matching the server's listing order.
    pub fn tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
