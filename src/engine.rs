//! The engine interface the agent consumes
//!
//! The embedded transaction engine is an external collaborator; the
//! agent only touches the operations named here. [`SimEngine`] is an
//! in-process stand-in with scripted outcomes, used by the development
//! binary and the integration tests.

use crate::rpc::{
    CommandPayload, ResponseStatus, RpcCommand, RpcPush, RpcResponse, StatusCode, TaskEntry,
};
use crate::types::{AccountId, NymId, TaskId};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

/// Failure reported by an engine session operation
#[derive(Debug)]
pub struct EngineError {
    pub reason: String,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Engine operation failed: {}", self.reason)
    }
}

impl std::error::Error for EngineError {}

/// Operations the agent invokes on the engine
///
/// Implementations must be callable from multiple worker threads
/// concurrently; the agent performs no serialization of its own around
/// engine calls.
pub trait Engine: Send + Sync {
    /// Start the client session with the given index
    fn start_client(&self, index: u64) -> Result<(), EngineError>;

    /// Start the server session with the given index
    fn start_server(&self, index: u64) -> Result<(), EngineError>;

    /// Synchronously refresh the given client session
    fn refresh(&self, client_index: u64) -> Result<(), EngineError>;

    /// Arrange for the client session to refresh every `interval`,
    /// with the next fire at `anchor + interval`
    fn schedule_refresh(&self, client_index: u64, interval: Duration, anchor: SystemTime);

    /// Owner of `account` according to the client session's storage
    fn account_owner(&self, client_index: u64, account: &AccountId) -> Option<NymId>;

    /// Execute a command and return the engine's response
    fn rpc(&self, command: &RpcCommand) -> RpcResponse;

    /// Endpoint of the engine's push topic
    fn push_endpoint(&self) -> String;
}

/// A recorded refresh schedule, for inspection in tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledRefresh {
    pub client_index: u64,
    pub interval: Duration,
    pub anchor: SystemTime,
}

/// In-memory engine simulator
///
/// Sessions, nyms, and accounts live in maps; queued operations mint
/// task ids; pushes go out on a real PUB socket so the agent's
/// subscriber path is exercised end to end. Outcomes are deterministic
/// and can be preloaded (`queue_nym_id`, `queue_task_id`,
/// `set_account_owner`).
pub struct SimEngine {
    context: Arc<zmq::Context>,
    endpoint: String,
    push: Mutex<zmq::Socket>,
    state: Mutex<SimState>,
}

#[derive(Default)]
struct SimState {
    client_sessions: Vec<u64>,
    server_sessions: Vec<u64>,
    refreshed: Vec<u64>,
    schedules: Vec<ScheduledRefresh>,
    account_owners: HashMap<(u64, AccountId), NymId>,
    rpc_calls: u64,
    next_nym: u64,
    next_task: u64,
    queued_nym_ids: VecDeque<String>,
    queued_task_ids: VecDeque<String>,
}

impl SimEngine {
    /// Create the simulator and bind its push topic
    ///
    /// The context must be shared with the agent or the inproc push
    /// endpoint will not resolve.
    pub fn new(context: Arc<zmq::Context>) -> Result<Self, EngineError> {
        Self::with_endpoint(context, "inproc://otagent/sim/rpc/push")
    }

    /// Create the simulator on a specific push endpoint
    pub fn with_endpoint(
        context: Arc<zmq::Context>,
        endpoint: &str,
    ) -> Result<Self, EngineError> {
        let push = context.socket(zmq::PUB).map_err(|e| EngineError {
            reason: format!("push socket: {}", e),
        })?;
        push.set_linger(0).map_err(|e| EngineError {
            reason: format!("push socket options: {}", e),
        })?;
        push.bind(endpoint).map_err(|e| EngineError {
            reason: format!("push bind '{}': {}", endpoint, e),
        })?;

        info!(endpoint, "Simulator engine push topic bound");

        Ok(Self {
            context,
            endpoint: endpoint.to_string(),
            push: Mutex::new(push),
            state: Mutex::new(SimState::default()),
        })
    }

    /// The shared transport context
    #[must_use]
    pub fn context(&self) -> Arc<zmq::Context> {
        Arc::clone(&self.context)
    }

    /// Preload the identifier the next CreateNym will mint
    pub fn queue_nym_id(&self, id: &str) {
        self.state.lock().queued_nym_ids.push_back(id.to_string());
    }

    /// Preload the id the next queued operation will use
    pub fn queue_task_id(&self, id: &str) {
        self.state.lock().queued_task_ids.push_back(id.to_string());
    }

    /// Declare `nym` the owner of `account` on a client session
    pub fn set_account_owner(&self, client_index: u64, account: AccountId, nym: NymId) {
        self.state
            .lock()
            .account_owners
            .insert((client_index, account), nym);
    }

    /// Client session indices started so far
    pub fn started_clients(&self) -> Vec<u64> {
        self.state.lock().client_sessions.clone()
    }

    /// Server session indices started so far
    pub fn started_servers(&self) -> Vec<u64> {
        self.state.lock().server_sessions.clone()
    }

    /// Client sessions refreshed so far, in call order
    pub fn refreshed(&self) -> Vec<u64> {
        self.state.lock().refreshed.clone()
    }

    /// Refresh schedules recorded so far
    pub fn schedules(&self) -> Vec<ScheduledRefresh> {
        self.state.lock().schedules.clone()
    }

    /// Number of commands that reached the engine
    pub fn rpc_count(&self) -> u64 {
        self.state.lock().rpc_calls
    }

    /// Publish a task completion on the push topic (1-frame shape)
    pub fn complete_task(&self, task: &str, result: bool) -> Result<(), EngineError> {
        let push = RpcPush::engine_task_complete(TaskId::new(task), result);
        let bytes = crate::rpc::encode("push", &push).map_err(|e| EngineError {
            reason: e.to_string(),
        })?;

        self.push
            .lock()
            .send(&bytes, 0)
            .map_err(|e| EngineError {
                reason: format!("push send: {}", e),
            })
    }

    /// Publish a nym-addressed event on the push topic (3-frame shape)
    pub fn emit_nym_event(
        &self,
        nym: &str,
        payload: &[u8],
        instance: &[u8],
    ) -> Result<(), EngineError> {
        self.push
            .lock()
            .send_multipart([nym.as_bytes(), payload, instance], 0)
            .map_err(|e| EngineError {
                reason: format!("push send: {}", e),
            })
    }

    fn mint_nym(state: &mut SimState) -> String {
        state.queued_nym_ids.pop_front().unwrap_or_else(|| {
            state.next_nym += 1;
            format!("nym-{}", state.next_nym)
        })
    }

    fn mint_task(state: &mut SimState) -> String {
        state.queued_task_ids.pop_front().unwrap_or_else(|| {
            state.next_task += 1;
            format!("task-{}", state.next_task)
        })
    }

    fn queued_response(state: &mut SimState) -> RpcResponse {
        let mut response = RpcResponse::with_status(StatusCode::Queued);
        response.tasks.push(TaskEntry {
            id: TaskId::new(Self::mint_task(state)),
        });
        response
    }
}

impl Engine for SimEngine {
    fn start_client(&self, index: u64) -> Result<(), EngineError> {
        debug!(index, "Starting client session");
        self.state.lock().client_sessions.push(index);
        Ok(())
    }

    fn start_server(&self, index: u64) -> Result<(), EngineError> {
        debug!(index, "Starting server session");
        self.state.lock().server_sessions.push(index);
        Ok(())
    }

    fn refresh(&self, client_index: u64) -> Result<(), EngineError> {
        self.state.lock().refreshed.push(client_index);
        Ok(())
    }

    fn schedule_refresh(&self, client_index: u64, interval: Duration, anchor: SystemTime) {
        self.state.lock().schedules.push(ScheduledRefresh {
            client_index,
            interval,
            anchor,
        });
    }

    fn account_owner(&self, client_index: u64, account: &AccountId) -> Option<NymId> {
        self.state
            .lock()
            .account_owners
            .get(&(client_index, account.clone()))
            .cloned()
    }

    fn rpc(&self, command: &RpcCommand) -> RpcResponse {
        let mut state = self.state.lock();
        state.rpc_calls += 1;

        match &command.payload {
            CommandPayload::AddClientSession => {
                let index = state.client_sessions.len() as u64;
                state.client_sessions.push(index);
                RpcResponse::with_status(StatusCode::Success)
            }
            CommandPayload::AddServerSession => {
                let index = state.server_sessions.len() as u64;
                state.server_sessions.push(index);
                RpcResponse::with_status(StatusCode::Success)
            }
            CommandPayload::CreateNym { .. } => {
                let mut response = RpcResponse::with_status(StatusCode::Success);
                response.identifiers.push(Self::mint_nym(&mut state));
                response
            }
            CommandPayload::RegisterNym
            | CommandPayload::IssueUnitDefinition
            | CommandPayload::CreateAccount
            | CommandPayload::CreateCompatibleAccount => Self::queued_response(&mut state),
            CommandPayload::SendPayment { source_account } => {
                let client = u64::from(command.session / 2);
                if state
                    .account_owners
                    .contains_key(&(client, source_account.clone()))
                {
                    Self::queued_response(&mut state)
                } else {
                    RpcResponse::with_status(StatusCode::Error)
                }
            }
            CommandPayload::AcceptPendingPayments {
                destination_accounts,
            } => {
                let client = u64::from(command.session / 2);
                let known = destination_accounts.first().map_or(false, |account| {
                    state
                        .account_owners
                        .contains_key(&(client, account.clone()))
                });
                if known {
                    Self::queued_response(&mut state)
                } else {
                    RpcResponse::with_status(StatusCode::Error)
                }
            }
            CommandPayload::ListNyms
            | CommandPayload::ListAccounts
            | CommandPayload::GetAccountBalance { .. } => {
                let mut response = RpcResponse::with_status(StatusCode::Success);
                response.status.push(ResponseStatus {
                    code: StatusCode::Unnecessary,
                });
                response
            }
        }
    }

    fn push_endpoint(&self) -> String {
        self.endpoint.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim() -> SimEngine {
        SimEngine::new(Arc::new(zmq::Context::new())).unwrap()
    }

    #[test]
    fn test_add_client_session_succeeds() {
        let engine = sim();
        let response = engine.rpc(&RpcCommand::bare(0, CommandPayload::AddClientSession));
        assert!(response.succeeded());
        assert_eq!(engine.started_clients(), vec![0]);
    }

    #[test]
    fn test_create_nym_uses_queued_id() {
        let engine = sim();
        engine.queue_nym_id("N1");

        let response = engine.rpc(&RpcCommand::bare(
            0,
            CommandPayload::CreateNym {
                name: "alice".to_string(),
            },
        ));
        assert_eq!(response.identifiers, vec!["N1".to_string()]);
    }

    #[test]
    fn test_send_payment_requires_known_account() {
        let engine = sim();
        let command = RpcCommand::bare(
            4,
            CommandPayload::SendPayment {
                source_account: AccountId::new("A"),
            },
        );

        assert!(!engine.rpc(&command).queued());

        engine.set_account_owner(2, AccountId::new("A"), NymId::new("NymX"));
        engine.queue_task_id("T1");
        let response = engine.rpc(&command);
        assert!(response.queued());
        assert_eq!(response.first_task().unwrap().id.as_str(), "T1");
    }

    #[test]
    fn test_schedule_recording() {
        let engine = sim();
        let anchor = SystemTime::now();
        engine.schedule_refresh(3, Duration::from_secs(30), anchor);

        let schedules = engine.schedules();
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].client_index, 3);
        assert_eq!(schedules[0].anchor, anchor);
    }
}
