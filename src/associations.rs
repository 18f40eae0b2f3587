//! Connection association tables
//!
//! Two maps tie engine-originated events back to the client connection
//! that caused them: task id to (connection, nym) for queued
//! operations, and nym id to connection for nym-addressed events. Each
//! map has its own mutex so the hot task path never contends with the
//! nym path.

use crate::types::{ConnectionId, NymId, TaskId};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

/// Association state shared between the worker pool (writer) and the
/// push bridge (reader)
#[derive(Default)]
pub struct AssociationTables {
    tasks: Mutex<HashMap<TaskId, TaskAssociation>>,
    nyms: Mutex<HashMap<NymId, ConnectionId>>,
}

/// The connection and nym waiting on a queued task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskAssociation {
    pub connection: ConnectionId,
    pub nym: NymId,
}

impl AssociationTables {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `connection` is waiting for `task` on behalf of
    /// `nym`
    ///
    /// All three must be non-empty: the caller only learns a task id
    /// from a queued engine response, which always names an owner.
    /// Duplicate task ids overwrite; the engine guarantees uniqueness,
    /// so the overwrite never fires in practice.
    ///
    /// Entries for tasks whose completion never arrives are not
    /// reclaimed. The table is bounded only by engine task volume
    /// within one process lifetime.
    pub fn associate_task(&self, connection: ConnectionId, nym: NymId, task: TaskId) {
        assert!(!connection.is_empty());
        assert!(!nym.is_empty());
        assert!(!task.is_empty());

        debug!(connection = %connection, task = %task, "Connection is waiting for task");
        self.tasks
            .lock()
            .insert(task, TaskAssociation { connection, nym });
    }

    /// Bind `nym` to `connection` for push delivery
    ///
    /// First write wins: a later different connection for an
    /// already-known nym cannot hijack push delivery. Empty nym ids are
    /// ignored.
    pub fn associate_nym(&self, connection: &ConnectionId, nym: &NymId) {
        if nym.is_empty() {
            return;
        }

        let mut nyms = self.nyms.lock();
        if !nyms.contains_key(nym) {
            nyms.insert(nym.clone(), connection.clone());
            drop(nyms);
            debug!(connection = %connection, nym = %nym, "Connection is associated with nym");
        }
    }

    /// Atomically look up and remove the association for `task`
    pub fn take_task(&self, task: &TaskId) -> Option<TaskAssociation> {
        self.tasks.lock().remove(task)
    }

    /// Look up the connection bound to `nym`, if any
    ///
    /// Never removes: nyms persist across reconnects within a run.
    pub fn lookup_nym(&self, nym: &NymId) -> Option<ConnectionId> {
        self.nyms.lock().get(nym).cloned()
    }

    /// Number of outstanding task associations
    pub fn pending_tasks(&self) -> usize {
        self.tasks.lock().len()
    }
}
