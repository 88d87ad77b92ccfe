//! Authoritative task store and mutation logic
//!
//! The store owns the canonical task records. It is held exclusively by the
//! server's main event loop, so every check-then-act (ownership check
//! followed by a write) runs to completion before the next request is
//! looked at. Id assignment is a monotonic counter under the same loop,
//! which is what makes ids unique and never reused.

use log::info;
use shared::{StoreError, Task, TaskDraft, TaskPatch};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct TaskStore {
    tasks: HashMap<u64, Task>,
    next_task_id: u64,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            next_task_id: 1,
        }
    }

    /// Creates a task owned by `owner_id`, assigning its id and creation
    /// timestamp. Fails with a validation error when the title is empty.
    pub fn create(&mut self, owner_id: u64, draft: TaskDraft) -> Result<Task, StoreError> {
        if draft.title.is_empty() {
            return Err(StoreError::Validation(
                "title must not be empty".to_string(),
            ));
        }
        if matches!(draft.category.as_deref(), Some("")) {
            return Err(StoreError::Validation(
                "category must not be empty".to_string(),
            ));
        }

        let id = self.next_task_id;
        self.next_task_id += 1;

        let task = Task::new(id, owner_id, unix_millis(), draft);
        info!("Created task {} for user {}", id, owner_id);
        self.tasks.insert(id, task.clone());

        Ok(task)
    }

    /// Applies a partial patch to a task. Only supplied fields change.
    /// A missing record and a record owned by another user both report
    /// `NotFound`.
    pub fn update(&mut self, id: u64, owner_id: u64, patch: TaskPatch) -> Result<Task, StoreError> {
        if matches!(patch.title.as_deref(), Some("")) {
            return Err(StoreError::Validation(
                "title must not be empty".to_string(),
            ));
        }
        if matches!(patch.category.as_deref(), Some("")) {
            return Err(StoreError::Validation(
                "category must not be empty".to_string(),
            ));
        }

        let task = self
            .tasks
            .get_mut(&id)
            .filter(|task| task.owner_id == owner_id)
            .ok_or(StoreError::NotFound)?;

        patch.apply(task);
        info!("Updated task {} for user {}", id, owner_id);

        Ok(task.clone())
    }

    /// Removes a task, with the same conflated not-found/not-owned check
    /// as `update`. Returns the removed id for broadcast.
    pub fn delete(&mut self, id: u64, owner_id: u64) -> Result<u64, StoreError> {
        let owned = self
            .tasks
            .get(&id)
            .map(|task| task.owner_id == owner_id)
            .unwrap_or(false);

        if !owned {
            return Err(StoreError::NotFound);
        }

        self.tasks.remove(&id);
        info!("Deleted task {} for user {}", id, owner_id);

        Ok(id)
    }

    /// Returns every task regardless of owner, newest first. Ids break
    /// timestamp ties since they increase monotonically.
    pub fn list_all(&self) -> Vec<Task> {
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

fn unix_millis() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    millis.min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(title: &str) -> TaskDraft {
        TaskDraft {
            title: title.to_string(),
            description: None,
            category: None,
        }
    }

    #[test]
    fn test_create_assigns_unique_ids() {
        let mut store = TaskStore::new();

        let first = store.create(1, draft("Buy milk")).unwrap();
        let second = store.create(1, draft("Walk dog")).unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_create_rejects_empty_title() {
        let mut store = TaskStore::new();

        let result = store.create(1, draft(""));
        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_create_defaults_category() {
        let mut store = TaskStore::new();

        let task = store.create(1, draft("Buy milk")).unwrap();
        assert_eq!(task.category, shared::DEFAULT_CATEGORY);
        assert!(!task.completed);
    }

    #[test]
    fn test_id_not_reused_after_delete() {
        let mut store = TaskStore::new();

        let first = store.create(1, draft("Buy milk")).unwrap();
        store.delete(first.id, 1).unwrap();
        let second = store.create(1, draft("Walk dog")).unwrap();

        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_update_applies_partial_patch() {
        let mut store = TaskStore::new();
        let task = store
            .create(
                1,
                TaskDraft {
                    title: "Buy milk".to_string(),
                    description: Some("semi-skimmed".to_string()),
                    category: Some("Personal".to_string()),
                },
            )
            .unwrap();

        let updated = store
            .update(
                task.id,
                1,
                TaskPatch {
                    completed: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(updated.completed);
        assert_eq!(updated.title, "Buy milk");
        assert_eq!(updated.description.as_deref(), Some("semi-skimmed"));
        assert_eq!(updated.category, "Personal");
    }

    #[test]
    fn test_update_rejects_empty_title_patch() {
        let mut store = TaskStore::new();
        let task = store.create(1, draft("Buy milk")).unwrap();

        let result = store.update(
            task.id,
            1,
            TaskPatch {
                title: Some(String::new()),
                ..Default::default()
            },
        );

        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert_eq!(store.list_all()[0].title, "Buy milk");
    }

    #[test]
    fn test_update_foreign_task_reports_not_found() {
        let mut store = TaskStore::new();
        let task = store.create(2, draft("Buy milk")).unwrap();

        let result = store.update(
            task.id,
            1,
            TaskPatch {
                completed: Some(true),
                ..Default::default()
            },
        );

        assert_eq!(result, Err(StoreError::NotFound));
        assert!(!store.list_all()[0].completed);
    }

    #[test]
    fn test_update_missing_task_reports_not_found() {
        let mut store = TaskStore::new();

        let result = store.update(999, 1, TaskPatch::default());
        assert_eq!(result, Err(StoreError::NotFound));
    }

    #[test]
    fn test_delete_owned_task() {
        let mut store = TaskStore::new();
        let task = store.create(1, draft("Buy milk")).unwrap();

        assert_eq!(store.delete(task.id, 1), Ok(task.id));
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_foreign_task_reports_not_found() {
        let mut store = TaskStore::new();
        let task = store.create(2, draft("Buy milk")).unwrap();

        assert_eq!(store.delete(task.id, 1), Err(StoreError::NotFound));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_list_all_is_shared_across_owners() {
        let mut store = TaskStore::new();
        store.create(1, draft("Buy milk")).unwrap();
        store.create(2, draft("Walk dog")).unwrap();

        let tasks = store.list_all();
        assert_eq!(tasks.len(), 2);
    }

    #[test]
    fn test_list_all_newest_first() {
        let mut store = TaskStore::new();
        let first = store.create(1, draft("Buy milk")).unwrap();
        let second = store.create(1, draft("Walk dog")).unwrap();
        let third = store.create(1, draft("Water plants")).unwrap();

        // created_at can collide at millisecond resolution, so the id
        // tiebreak must keep later creations first
        let ids: Vec<u64> = store.list_all().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);
    }

    #[test]
    fn test_rapid_updates_last_write_wins() {
        let mut store = TaskStore::new();
        let task = store.create(1, draft("Buy milk")).unwrap();

        store
            .update(
                task.id,
                1,
                TaskPatch {
                    description: Some(Some("oat".to_string())),
                    ..Default::default()
                },
            )
            .unwrap();
        let final_state = store
            .update(
                task.id,
                1,
                TaskPatch {
                    completed: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();

        // second patch lands on top of the first; untouched fields survive
        assert!(final_state.completed);
        assert_eq!(final_state.description.as_deref(), Some("oat"));
        assert_eq!(final_state.title, "Buy milk");
    }
}
