//! Engine session lifecycle
//!
//! Starts the configured client and server sessions, keeps the
//! persisted session counters in step with successful Add*Session
//! commands, and schedules the periodic refresh of every client
//! session.

use crate::constants::{settings as keys, REFRESH_INTERVAL};
use crate::engine::Engine;
use crate::error::AgentError;
use crate::settings::SettingsStore;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{error, info};

/// Session bookkeeping shared with the worker pool
///
/// The counters only grow: sessions are never torn down during a run.
pub struct SessionManager {
    engine: Arc<dyn Engine>,
    settings: Arc<SettingsStore>,
    clients: AtomicI64,
    servers: AtomicI64,
}

impl SessionManager {
    #[must_use]
    pub fn new(engine: Arc<dyn Engine>, settings: Arc<SettingsStore>, clients: i64, servers: i64) -> Self {
        Self {
            engine,
            settings,
            clients: AtomicI64::new(clients),
            servers: AtomicI64::new(servers),
        }
    }

    /// Start every configured session on the engine
    ///
    /// Server sessions first, then clients, mirroring the engine's own
    /// startup expectations.
    pub fn start_sessions(&self) -> Result<(), AgentError> {
        let servers = self.servers.load(Ordering::Relaxed);
        for index in 0..servers {
            self.engine
                .start_server(index as u64)
                .map_err(|e| AgentError::Engine {
                    reason: e.to_string(),
                })?;
        }

        let clients = self.clients.load(Ordering::Relaxed);
        for index in 0..clients {
            self.engine
                .start_client(index as u64)
                .map_err(|e| AgentError::Engine {
                    reason: e.to_string(),
                })?;
        }

        info!(clients, servers, "Engine sessions started");

        Ok(())
    }

    /// Refresh every client session once and schedule its recurring
    /// refresh
    pub fn schedule_all(&self) {
        let clients = self.clients.load(Ordering::Relaxed);
        for index in 0..clients {
            self.schedule_refresh(index as u64);
        }
    }

    /// A client session was added through the RPC path: bump the
    /// persisted counter and bring the new session into the refresh
    /// rotation
    pub fn on_client_added(&self) {
        if let Err(e) = self.settings.increment(keys::SECTION, keys::CLIENTS) {
            error!(error = %e, "Failed to persist client session count");
        }
        let count = self.clients.fetch_add(1, Ordering::SeqCst) + 1;
        self.schedule_refresh((count - 1) as u64);
    }

    /// A server session was added through the RPC path
    pub fn on_server_added(&self) {
        if let Err(e) = self.settings.increment(keys::SECTION, keys::SERVERS) {
            error!(error = %e, "Failed to persist server session count");
        }
        self.servers.fetch_add(1, Ordering::SeqCst);
    }

    /// Current client session count
    pub fn client_count(&self) -> i64 {
        self.clients.load(Ordering::Relaxed)
    }

    /// Current server session count
    pub fn server_count(&self) -> i64 {
        self.servers.load(Ordering::Relaxed)
    }

    /// One immediate refresh, then a recurring one anchored at the
    /// wall clock observed now (next fire = anchor + interval)
    fn schedule_refresh(&self, index: u64) {
        if let Err(e) = self.engine.refresh(index) {
            error!(index, error = %e, "Initial refresh failed");
        }
        self.engine
            .schedule_refresh(index, REFRESH_INTERVAL, SystemTime::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SimEngine;
    use std::sync::Arc;

    fn fixture(clients: i64, servers: i64) -> (tempfile::TempDir, Arc<SimEngine>, SessionManager) {
        let dir = tempfile::tempdir().unwrap();
        let settings =
            Arc::new(SettingsStore::open(dir.path().join("otagent.ini")).unwrap());
        settings
            .put_int(keys::SECTION, keys::CLIENTS, clients)
            .unwrap();
        settings
            .put_int(keys::SECTION, keys::SERVERS, servers)
            .unwrap();

        let engine = Arc::new(SimEngine::new(Arc::new(zmq::Context::new())).unwrap());
        let manager = SessionManager::new(
            Arc::clone(&engine) as Arc<dyn Engine>,
            settings,
            clients,
            servers,
        );
        (dir, engine, manager)
    }

    #[test]
    fn test_start_sessions_starts_servers_then_clients() {
        let (_dir, engine, manager) = fixture(2, 1);
        manager.start_sessions().unwrap();

        assert_eq!(engine.started_servers(), vec![0]);
        assert_eq!(engine.started_clients(), vec![0, 1]);
    }

    #[test]
    fn test_schedule_all_refreshes_each_client_once() {
        let (_dir, engine, manager) = fixture(2, 0);
        manager.schedule_all();

        assert_eq!(engine.refreshed(), vec![0, 1]);
        let schedules = engine.schedules();
        assert_eq!(schedules.len(), 2);
        assert!(schedules
            .iter()
            .all(|s| s.interval == REFRESH_INTERVAL));
    }

    #[test]
    fn test_on_client_added_persists_and_schedules_new_index() {
        let (_dir, engine, manager) = fixture(1, 0);
        manager.on_client_added();

        assert_eq!(manager.client_count(), 2);
        assert_eq!(manager.settings.client_sessions(), 2);
        // The fresh index, not an existing one
        assert_eq!(engine.refreshed(), vec![1]);
        assert_eq!(engine.schedules()[0].client_index, 1);
    }

    #[test]
    fn test_on_server_added_does_not_schedule() {
        let (_dir, engine, manager) = fixture(0, 1);
        manager.on_server_added();

        assert_eq!(manager.server_count(), 2);
        assert_eq!(manager.settings.server_sessions(), 2);
        assert!(engine.schedules().is_empty());
    }

    #[test]
    fn test_counters_never_decrease() {
        let (_dir, _engine, manager) = fixture(1, 1);
        manager.on_client_added();
        manager.on_server_added();
        manager.on_client_added();

        assert_eq!(manager.client_count(), 3);
        assert_eq!(manager.server_count(), 2);
    }
}
