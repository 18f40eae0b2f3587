//! Reply worker pool
//!
//! A fixed pool of REP sockets on process-internal endpoints, one per
//! hardware thread. Each worker deserializes a command, records the
//! associations the command and its response imply, calls the engine,
//! and replies with the serialized response. The association for a
//! queued task is installed before the reply is sent, so a client can
//! never observe a reply whose task-complete push would find no
//! association.

use crate::associations::AssociationTables;
use crate::constants::{transport, POLL_INTERVAL_MS};
use crate::engine::Engine;
use crate::error::AgentError;
use crate::rpc::{self, CommandPayload, RpcCommand, RpcResponse};
use crate::session::SessionManager;
use crate::types::{ConnectionId, NymId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info, warn};

/// Generate one endpoint per worker
///
/// Pool size is `max(hardware_parallelism, 1)`; endpoints are stable
/// for the agent's lifetime.
#[must_use]
pub fn backend_endpoints() -> Vec<String> {
    let threads = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    info!(threads, "Starting handler threads");

    (0..threads)
        .map(|i| format!("{}{}", transport::WORKER_ENDPOINT_PREFIX, i))
        .collect()
}

/// State a worker needs to process one request
///
/// Shared across the pool; every field is internally synchronized.
#[derive(Clone)]
pub struct WorkerContext {
    pub engine: Arc<dyn Engine>,
    pub associations: Arc<AssociationTables>,
    pub sessions: Arc<SessionManager>,
}

impl WorkerContext {
    /// Process one decoded request body
    ///
    /// Steps: record explicit nym associations, run the command on the
    /// engine, classify the task owner, record the task association
    /// for queued work, maintain session counters, and hand back the
    /// response for serialization.
    pub fn handle(&self, command: &RpcCommand, connection: &ConnectionId) -> RpcResponse {
        for nym in &command.associate_nym {
            self.associations.associate_nym(connection, nym);
        }

        let response = self.engine.rpc(command);

        match &command.payload {
            CommandPayload::AddClientSession => {
                if response.succeeded() {
                    self.sessions.on_client_added();
                }
            }
            CommandPayload::AddServerSession => {
                if response.succeeded() {
                    self.sessions.on_server_added();
                }
            }
            CommandPayload::CreateNym { .. } => {
                if response.succeeded() {
                    for id in &response.identifiers {
                        self.associations
                            .associate_nym(connection, &NymId::new(id.clone()));
                    }
                }
            }
            _ => {}
        }

        if response.queued() {
            if let Some(task) = response.first_task() {
                match self.task_nym(command, &response) {
                    Some(nym) => self.associations.associate_task(
                        connection.clone(),
                        nym,
                        task.id.clone(),
                    ),
                    None => warn!(
                        task = %task.id,
                        "Queued task with no resolvable owner; no association recorded"
                    ),
                }
            }
        }

        response
    }

    /// The nym that owns a command's asynchronous outcome
    ///
    /// A closed set, so a match rather than a handler table. Commands
    /// outside the set never own a task.
    fn task_nym(&self, command: &RpcCommand, response: &RpcResponse) -> Option<NymId> {
        match &command.payload {
            CommandPayload::RegisterNym
            | CommandPayload::IssueUnitDefinition
            | CommandPayload::CreateAccount
            | CommandPayload::CreateCompatibleAccount => command.owner.clone(),
            CommandPayload::SendPayment { source_account } if response.queued() => self
                .engine
                .account_owner(session_to_client_index(command.session), source_account),
            CommandPayload::AcceptPendingPayments {
                destination_accounts,
            } if response.queued() => {
                let account = destination_accounts.first()?;
                self.engine
                    .account_owner(session_to_client_index(command.session), account)
            }
            _ => None,
        }
    }
}

/// Map an engine session number to a client index
///
/// Even sessions are clients in the engine's numbering convention; a
/// command that queues client-side work can never address an odd
/// session.
#[must_use]
pub fn session_to_client_index(session: u32) -> u64 {
    assert!(session % 2 == 0, "session {} is not a client session", session);

    u64::from(session / 2)
}

/// The running pool
pub struct WorkerPool {
    running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Bind one REP socket per endpoint and start the workers
    pub fn start(
        context: &Arc<zmq::Context>,
        endpoints: &[String],
        worker_context: WorkerContext,
    ) -> Result<Self, AgentError> {
        let running = Arc::new(AtomicBool::new(true));
        let mut handles = Vec::with_capacity(endpoints.len());

        for (index, endpoint) in endpoints.iter().enumerate() {
            // Bind on the caller's thread so startup failures are fatal
            // before any traffic is accepted
            let socket = bind_worker(context, endpoint)?;

            let flag = Arc::clone(&running);
            let ctx = Arc::clone(context);
            let endpoint = endpoint.clone();
            let state = worker_context.clone();

            let handle = std::thread::Builder::new()
                .name(format!("otagent-worker-{}", index))
                .spawn(move || worker_loop(socket, &ctx, &endpoint, &state, &flag))
                .map_err(|e| AgentError::InvalidConfig {
                    reason: format!("failed to spawn worker thread: {}", e),
                })?;
            handles.push(handle);
        }

        Ok(Self { running, handles })
    }

    /// Stop every worker and join the threads
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!("Worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bind_worker(context: &Arc<zmq::Context>, endpoint: &str) -> Result<zmq::Socket, AgentError> {
    let transport_err = |e| AgentError::Transport {
        endpoint: endpoint.to_string(),
        source: e,
    };

    let socket = context.socket(zmq::REP).map_err(transport_err)?;
    socket.set_linger(0).map_err(transport_err)?;
    socket.bind(endpoint).map_err(transport_err)?;

    Ok(socket)
}

fn worker_loop(
    mut socket: zmq::Socket,
    context: &Arc<zmq::Context>,
    endpoint: &str,
    state: &WorkerContext,
    running: &AtomicBool,
) {
    while running.load(Ordering::Relaxed) {
        let mut items = [socket.as_poll_item(zmq::POLLIN)];
        if let Err(e) = zmq::poll(&mut items, POLL_INTERVAL_MS) {
            error!(error = %e, endpoint, "Worker poll failed");
            break;
        }
        if !items[0].is_readable() {
            continue;
        }

        let frames = match socket.recv_multipart(0) {
            Ok(frames) => frames,
            Err(e) => {
                error!(error = %e, endpoint, "Worker receive failed");
                continue;
            }
        };

        let reply = match parse_request(&frames) {
            Ok((command, connection)) => {
                let response = state.handle(&command, &connection);
                rpc::encode("response", &response)
            }
            Err(e) => {
                // No reply is synthesized for garbage, which leaves
                // this REP mid-conversation; rebind to resynchronize.
                // The old socket must release the endpoint first.
                warn!(error = %e, endpoint, "Dropping malformed request");
                drop(socket);
                socket = match bind_worker(context, endpoint) {
                    Ok(fresh) => fresh,
                    Err(e) => {
                        error!(error = %e, endpoint, "Failed to rebind worker");
                        break;
                    }
                };
                continue;
            }
        };

        match reply {
            Ok(bytes) => {
                if let Err(e) = socket.send(&bytes, 0) {
                    error!(error = %e, endpoint, "Worker reply send failed");
                }
            }
            Err(e) => {
                error!(error = %e, endpoint, "Failed to encode response");
                // An empty reply keeps the REP state machine moving;
                // the client sees a decode failure rather than a stall
                if let Err(e) = socket.send(&[][..], 0) {
                    error!(error = %e, endpoint, "Worker reply send failed");
                }
            }
        }
    }
}

/// Decode a worker request body: command frame plus the connection
/// identity the frontend appended
fn parse_request(frames: &[Vec<u8>]) -> Result<(RpcCommand, ConnectionId), AgentError> {
    if frames.len() < 2 {
        return Err(AgentError::Codec {
            context: "worker request",
            reason: format!("expected 2 body frames, got {}", frames.len()),
        });
    }

    let command: RpcCommand = rpc::decode("command", &frames[0])?;
    let connection = ConnectionId::from(frames[1].as_slice());
    if connection.is_empty() {
        return Err(AgentError::Codec {
            context: "worker request",
            reason: "empty connection identity".to_string(),
        });
    }

    Ok((command, connection))
}
