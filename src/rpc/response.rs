//! Engine-originated response payloads

use crate::types::TaskId;
use serde::{Deserialize, Serialize};

/// Outcome code attached to a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    Success,
    /// The operation was accepted and will complete asynchronously as a
    /// task
    Queued,
    BadSession,
    Unnecessary,
    Error,
}

/// One status entry; responses carry one per addressed item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseStatus {
    pub code: StatusCode,
}

/// A queued task handle returned by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEntry {
    pub id: TaskId,
}

/// The engine's reply to an [`RpcCommand`](super::RpcCommand)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub version: u32,
    pub status: Vec<ResponseStatus>,
    /// Identifiers minted by the command (fresh nyms for CreateNym)
    pub identifiers: Vec<String>,
    /// Tasks queued by the command
    pub tasks: Vec<TaskEntry>,
}

impl RpcResponse {
    /// A response whose single status is `code`
    #[must_use]
    pub fn with_status(code: StatusCode) -> Self {
        Self {
            version: 1,
            status: vec![ResponseStatus { code }],
            identifiers: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// True when the leading status reports success
    #[must_use]
    pub fn succeeded(&self) -> bool {
        matches!(
            self.status.first(),
            Some(ResponseStatus {
                code: StatusCode::Success
            })
        )
    }

    /// True when at least one status reports a queued task
    #[must_use]
    pub fn queued(&self) -> bool {
        self.status
            .iter()
            .any(|status| status.code == StatusCode::Queued)
    }

    /// The first queued task handle, if the engine returned one
    #[must_use]
    pub fn first_task(&self) -> Option<&TaskEntry> {
        self.tasks.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_succeeded_reads_leading_status() {
        let mut response = RpcResponse::with_status(StatusCode::Success);
        assert!(response.succeeded());
        assert!(!response.queued());

        response.status.insert(
            0,
            ResponseStatus {
                code: StatusCode::Error,
            },
        );
        assert!(!response.succeeded());
    }

    #[test]
    fn test_queued_scans_all_statuses() {
        let mut response = RpcResponse::with_status(StatusCode::Success);
        response.status.push(ResponseStatus {
            code: StatusCode::Queued,
        });
        assert!(response.queued());
    }

    #[test]
    fn test_first_task() {
        let mut response = RpcResponse::with_status(StatusCode::Queued);
        assert!(response.first_task().is_none());

        response.tasks.push(TaskEntry {
            id: TaskId::new("task-1"),
        });
        assert_eq!(response.first_task().unwrap().id.as_str(), "task-1");
    }
}
