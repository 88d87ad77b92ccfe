use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_CATEGORY: &str = "General";
pub const MAX_PACKET_SIZE: usize = 2048;
pub const SUBSCRIBER_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
        user_id: u64,
    },
    CreateTask {
        request_id: u32,
        draft: TaskDraft,
    },
    UpdateTask {
        request_id: u32,
        id: u64,
        patch: TaskPatch,
    },
    DeleteTask {
        request_id: u32,
        id: u64,
    },
    ListTasks {
        request_id: u32,
    },
    Ping,
    Disconnect,

    Connected {
        client_id: u32,
    },
    TaskOk {
        request_id: u32,
        task: Task,
    },
    DeleteOk {
        request_id: u32,
        id: u64,
    },
    TaskList {
        request_id: u32,
        tasks: Vec<Task>,
    },
    RequestFailed {
        request_id: u32,
        error: StoreError,
    },
    TaskCreated {
        task: Task,
    },
    TaskUpdated {
        task: Task,
    },
    TaskDeleted {
        id: u64,
    },
    Pong,
    Disconnected {
        reason: String,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: u64,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub completed: bool,
    pub owner_id: u64,
    pub created_at: u64,
}

impl Task {
    pub fn new(id: u64, owner_id: u64, created_at: u64, draft: TaskDraft) -> Self {
        Self {
            id,
            title: draft.title,
            description: draft.description,
            category: draft
                .category
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            completed: false,
            owner_id,
            created_at,
        }
    }
}

/// Creation payload. Category falls back to `DEFAULT_CATEGORY` when omitted.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
}

/// Partial update. Fields left as `None` are untouched; `description` is
/// doubly optional so a patch can clear it (`Some(None)`).
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub category: Option<String>,
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn apply(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(category) = &self.category {
            task.category = category.clone();
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.completed.is_none()
    }
}

/// Errors a mutation request can return to its caller. A missing record and
/// a record owned by someone else are reported identically so that callers
/// cannot probe for other users' task ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("task not found")]
    NotFound,
}

/// Send-path failures. These never reach a mutation's caller: a broadcast
/// that cannot be delivered to some subscriber is logged and dropped.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode packet: {0}")]
    Encode(#[from] bincode::Error),
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}
