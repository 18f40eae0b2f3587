//! Asynchronous push payloads

use crate::types::TaskId;
use serde::{Deserialize, Serialize};

/// Discriminant of a push notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushKind {
    Task,
    Account,
    Contact,
}

/// Completion record for a queued task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskComplete {
    pub version: u32,
    pub id: TaskId,
    pub result: bool,
}

/// A push notification
///
/// The engine emits these on its push topic; the agent re-emits a
/// re-addressed copy toward the owning client connection. For `Task`
/// pushes `id` names the nym that owns the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcPush {
    pub version: u32,
    pub kind: PushKind,
    pub id: String,
    pub task_complete: Option<TaskComplete>,
}

impl RpcPush {
    /// The task-complete payload the engine publishes when a queued
    /// operation finishes
    #[must_use]
    pub fn engine_task_complete(task: TaskId, result: bool) -> Self {
        Self {
            version: 1,
            kind: PushKind::Task,
            id: String::new(),
            task_complete: Some(TaskComplete {
                version: 1,
                id: task,
                result,
            }),
        }
    }
}
