//! Engine push subscriber
//!
//! Consumes the engine's push topic and turns each event into a
//! frontend push aimed at the right client connection. Two shapes
//! arrive on the topic: a single-frame serialized task completion, and
//! a three-frame nym-addressed event. Pushes for tasks and nyms this
//! agent never associated are normal (sibling clients share the
//! topic) and are dropped quietly.

use crate::associations::AssociationTables;
use crate::constants::{version, POLL_INTERVAL_MS};
use crate::error::AgentError;
use crate::frontend::Frontend;
use crate::rpc::{self, PushKind, RpcPush, TaskComplete};
use crate::types::NymId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// The subscriber bridging engine pushes onto the frontend
pub struct PushBridge {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PushBridge {
    /// Connect to the push topic and start translating events
    pub fn start(
        context: &Arc<zmq::Context>,
        endpoint: &str,
        associations: Arc<AssociationTables>,
        frontend: Frontend,
    ) -> Result<Self, AgentError> {
        let transport_err = |e| AgentError::Transport {
            endpoint: endpoint.to_string(),
            source: e,
        };

        let socket = context.socket(zmq::SUB).map_err(transport_err)?;
        socket.set_linger(0).map_err(transport_err)?;
        socket.set_subscribe(b"").map_err(transport_err)?;
        socket.connect(endpoint).map_err(transport_err)?;

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name("otagent-push".to_string())
            .spawn(move || subscriber_loop(&socket, &associations, &frontend, &flag))
            .map_err(|e| AgentError::InvalidConfig {
                reason: format!("failed to spawn push thread: {}", e),
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Stop the subscriber and join the thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Push bridge thread panicked");
            }
        }
    }
}

impl Drop for PushBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

fn subscriber_loop(
    socket: &zmq::Socket,
    associations: &AssociationTables,
    frontend: &Frontend,
    running: &AtomicBool,
) {
    while running.load(Ordering::Relaxed) {
        let mut items = [socket.as_poll_item(zmq::POLLIN)];
        if let Err(e) = zmq::poll(&mut items, POLL_INTERVAL_MS) {
            error!(error = %e, "Push poll failed");
            break;
        }
        if !items[0].is_readable() {
            continue;
        }

        let frames = match socket.recv_multipart(0) {
            Ok(frames) => frames,
            Err(e) => {
                error!(error = %e, "Push receive failed");
                continue;
            }
        };

        match frames.len() {
            1 => process_task_push(&frames[0], associations, frontend),
            3 => process_nym_push(&frames, associations, frontend),
            other => warn!(frames = other, "Invalid push message"),
        }
    }
}

/// A task finished: deliver the completion to whoever queued it
fn process_task_push(payload: &[u8], associations: &AssociationTables, frontend: &Frontend) {
    let push: RpcPush = match rpc::decode("push", payload) {
        Ok(push) => push,
        Err(e) => {
            warn!(error = %e, "Undecodable task push");
            return;
        }
    };
    let Some(complete) = push.task_complete else {
        warn!("Task push without completion record");
        return;
    };

    let Some(association) = associations.take_task(&complete.id) else {
        // Sibling clients' tasks arrive here too
        debug!(task = %complete.id, "No association for task");
        return;
    };

    assert!(!association.nym.is_empty());

    let outgoing = RpcPush {
        version: version::RPC_PUSH,
        kind: PushKind::Task,
        id: association.nym.as_str().to_string(),
        task_complete: Some(TaskComplete {
            version: version::TASK_COMPLETE,
            id: complete.id.clone(),
            result: complete.result,
        }),
    };

    let bytes = match rpc::encode("push", &outgoing) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "Failed to encode task push");
            return;
        }
    };

    match frontend.send_push(&association.connection, vec![bytes]) {
        Ok(()) => info!(
            task = %complete.id,
            connection = %association.connection,
            "Task completion delivered"
        ),
        Err(e) => error!(error = %e, "Push notification delivery failed"),
    }
}

/// A nym-addressed event: frames are nym id, opaque payload, instance
fn process_nym_push(frames: &[Vec<u8>], associations: &AssociationTables, frontend: &Frontend) {
    let nym = NymId::new(String::from_utf8_lossy(&frames[0]).into_owned());
    let payload = &frames[1];
    let instance = &frames[2];

    let Some(connection) = associations.lookup_nym(&nym) else {
        info!(nym = %nym, "No connection associated with nym");
        return;
    };

    match frontend.send_push(&connection, vec![payload.clone(), instance.clone()]) {
        Ok(()) => info!(nym = %nym, connection = %connection, "Push notification delivered"),
        Err(e) => error!(error = %e, "Push notification delivery failed"),
    }
}
