//! Internal request broker
//!
//! A DEALER socket connected to every worker endpoint. Frames from the
//! frontend are forwarded verbatim and the dealer's round-robin picks
//! the worker; replies come back with their routing headers intact and
//! are forwarded verbatim to the frontend. No payload is parsed here.

use crate::constants::POLL_INTERVAL_MS;
use crate::error::AgentError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::error;

/// The dealer between the frontend and the worker pool
#[derive(Clone)]
pub struct InternalBroker {
    context: Arc<zmq::Context>,
    socket: Arc<Mutex<Option<zmq::Socket>>>,
    running: Arc<AtomicBool>,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl InternalBroker {
    #[must_use]
    pub fn new(context: Arc<zmq::Context>) -> Self {
        Self {
            context,
            socket: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Connect to every worker endpoint and start forwarding replies
    ///
    /// `deliver` receives each worker reply; the orchestrator wires it
    /// to the frontend's send path.
    pub fn start<F>(&self, worker_endpoints: &[String], deliver: F) -> Result<(), AgentError>
    where
        F: Fn(Vec<Vec<u8>>) + Send + 'static,
    {
        let socket = self
            .context
            .socket(zmq::DEALER)
            .map_err(|e| AgentError::Transport {
                endpoint: "internal dealer".to_string(),
                source: e,
            })?;
        socket.set_linger(0).map_err(|e| AgentError::Transport {
            endpoint: "internal dealer".to_string(),
            source: e,
        })?;

        for endpoint in worker_endpoints {
            socket.connect(endpoint).map_err(|e| AgentError::Transport {
                endpoint: endpoint.to_string(),
                source: e,
            })?;
        }

        *self.socket.lock() = Some(socket);
        self.running.store(true, Ordering::Relaxed);

        let shared = Arc::clone(&self.socket);
        let running = Arc::clone(&self.running);
        let handle = std::thread::Builder::new()
            .name("otagent-broker".to_string())
            .spawn(move || reply_loop(&shared, &running, &deliver))
            .map_err(|e| AgentError::InvalidConfig {
                reason: format!("failed to spawn broker thread: {}", e),
            })?;
        *self.handle.lock() = Some(handle);

        Ok(())
    }

    /// Forward a frontend request to the worker pool
    pub fn send(&self, frames: Vec<Vec<u8>>) -> Result<(), AgentError> {
        let guard = self.socket.lock();
        let socket = guard.as_ref().ok_or(AgentError::NotStarted {
            component: "internal broker",
        })?;

        socket
            .send_multipart(frames, 0)
            .map_err(|e| AgentError::Send {
                target: "internal broker".to_string(),
                source: e,
            })
    }

    /// Stop the reply loop and close the socket
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                error!("Broker thread panicked");
            }
        }
        *self.socket.lock() = None;
    }
}

fn reply_loop<F>(shared: &Arc<Mutex<Option<zmq::Socket>>>, running: &AtomicBool, deliver: &F)
where
    F: Fn(Vec<Vec<u8>>),
{
    while running.load(Ordering::Relaxed) {
        let frames = {
            let guard = shared.lock();
            let Some(socket) = guard.as_ref() else { break };

            let mut items = [socket.as_poll_item(zmq::POLLIN)];
            if let Err(e) = zmq::poll(&mut items, POLL_INTERVAL_MS) {
                error!(error = %e, "Broker poll failed");
                break;
            }
            if !items[0].is_readable() {
                continue;
            }

            match socket.recv_multipart(0) {
                Ok(frames) => frames,
                Err(e) => {
                    error!(error = %e, "Broker receive failed");
                    continue;
                }
            }
        };

        // Replies route back to the original requestor via the
        // frontend socket
        deliver(frames);
    }
}
