//! Agent orchestration
//!
//! Owns every component and wires them together in dependency order:
//! settings, association tables, ZAP handler, session manager, worker
//! pool, internal broker, frontend, push bridge. The ZAP handler is
//! registered before the frontend binds so no connection is ever
//! admitted unauthenticated.

use crate::associations::AssociationTables;
use crate::auth::{ZapAuthenticator, ZapHandler};
use crate::broker::InternalBroker;
use crate::constants::settings as keys;
use crate::engine::Engine;
use crate::error::AgentError;
use crate::frontend::Frontend;
use crate::keys::KeyMaterial;
use crate::push_bridge::PushBridge;
use crate::session::SessionManager;
use crate::settings::SettingsStore;
use crate::worker::{self, WorkerContext, WorkerPool};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Startup parameters for the agent
#[derive(Debug)]
pub struct AgentConfig {
    /// Client sessions to start at boot
    pub clients: i64,
    /// Server sessions to start at boot
    pub servers: i64,
    /// Local filesystem socket path for the frontend
    pub socket_path: String,
    /// Additional public frontend endpoints
    pub endpoints: Vec<String>,
    /// Path of the persistent settings file
    pub settings_path: PathBuf,
    /// Curve keypairs for the frontend and its single trusted client
    pub keys: KeyMaterial,
}

/// The assembled agent
///
/// Components shut down in reverse dependency order on drop: the
/// frontend stops accepting work first, then the broker drains, the
/// workers stop, the push bridge closes, and the sessions are left to
/// the engine.
pub struct Agent {
    settings: Arc<SettingsStore>,
    associations: Arc<AssociationTables>,
    sessions: Arc<SessionManager>,
    frontend: Frontend,
    broker: InternalBroker,
    workers: Option<WorkerPool>,
    push_bridge: Option<PushBridge>,
    zap: Option<ZapHandler>,
}

impl Agent {
    /// Construct and start the agent
    ///
    /// The context must be the one the engine's push endpoint lives
    /// in, or the inproc subscription will not resolve.
    pub fn new(
        config: AgentConfig,
        engine: Arc<dyn Engine>,
        context: Arc<zmq::Context>,
    ) -> Result<Self, AgentError> {
        if config.socket_path.is_empty() {
            return Err(AgentError::InvalidConfig {
                reason: "frontend socket path is empty".to_string(),
            });
        }

        // A: settings, with key material persisted on first startup so
        // external tooling can read it
        let settings = Arc::new(SettingsStore::open(&config.settings_path)?);
        persist_startup_state(&settings, &config)?;

        // B: association tables
        let associations = Arc::new(AssociationTables::new());

        // C: authentication, before anything binds
        let authenticator = ZapAuthenticator::new(config.keys.client.public_z85());
        let zap = ZapHandler::start(&context, authenticator)?;

        // H: engine sessions
        let sessions = Arc::new(SessionManager::new(
            Arc::clone(&engine),
            Arc::clone(&settings),
            config.clients,
            config.servers,
        ));
        sessions.start_sessions()?;

        // D: worker pool
        let worker_endpoints = worker::backend_endpoints();
        assert!(!worker_endpoints.is_empty());

        let workers = WorkerPool::start(
            &context,
            &worker_endpoints,
            WorkerContext {
                engine: Arc::clone(&engine),
                associations: Arc::clone(&associations),
                sessions: Arc::clone(&sessions),
            },
        )?;

        // E + F: broker and frontend, wired to each other
        let frontend = Frontend::new(Arc::clone(&context), config.keys.server.clone());
        let broker = InternalBroker::new(Arc::clone(&context));

        {
            let frontend = frontend.clone();
            broker.start(&worker_endpoints, move |reply| {
                if let Err(e) = frontend.send(reply) {
                    warn!(error = %e, "Reply delivery failed");
                }
            })?;
        }
        {
            let broker = broker.clone();
            frontend.start(&config.socket_path, &config.endpoints, move |request| {
                if let Err(e) = broker.send(request) {
                    warn!(error = %e, "Request forwarding failed");
                }
            })?;
        }

        // The frontend is reachable; bring the clients into the
        // refresh rotation
        sessions.schedule_all();

        // G: push subscription comes up last, once every delivery path
        // below it exists
        let push_bridge = PushBridge::start(
            &context,
            &engine.push_endpoint(),
            Arc::clone(&associations),
            frontend.clone(),
        )?;

        info!(
            endpoints = ?frontend.bound_endpoints(),
            workers = worker_endpoints.len(),
            "Agent started"
        );

        Ok(Self {
            settings,
            associations,
            sessions,
            frontend,
            broker,
            workers: Some(workers),
            push_bridge: Some(push_bridge),
            zap: Some(zap),
        })
    }

    /// Endpoints the frontend actually bound
    pub fn frontend_endpoints(&self) -> Vec<String> {
        self.frontend.bound_endpoints()
    }

    /// The persistent settings store
    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    /// The association tables
    pub fn associations(&self) -> &Arc<AssociationTables> {
        &self.associations
    }

    /// The session manager
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Tear the agent down: refuse new work, drain, stop
    pub fn shutdown(&mut self) {
        info!("Agent shutting down");
        self.frontend.stop();
        self.broker.stop();
        if let Some(mut workers) = self.workers.take() {
            workers.stop();
        }
        if let Some(mut push_bridge) = self.push_bridge.take() {
            push_bridge.stop();
        }
        if let Some(mut zap) = self.zap.take() {
            zap.stop();
        }
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn persist_startup_state(
    settings: &SettingsStore,
    config: &AgentConfig,
) -> Result<(), AgentError> {
    let section = keys::SECTION;
    settings.put_int(section, keys::CLIENTS, config.clients)?;
    settings.put_int(section, keys::SERVERS, config.servers)?;
    settings.put_string(
        section,
        keys::SERVER_PRIVKEY,
        &config.keys.server.secret_z85(),
    )?;
    settings.put_string(
        section,
        keys::SERVER_PUBKEY,
        &config.keys.server.public_z85(),
    )?;
    settings.put_string(
        section,
        keys::CLIENT_PRIVKEY,
        &config.keys.client.secret_z85(),
    )?;
    settings.put_string(
        section,
        keys::CLIENT_PUBKEY,
        &config.keys.client.public_z85(),
    )?;

    Ok(())
}
