//! Authenticated frontend router
//!
//! A ROUTER socket in Curve server role, bound to a local socket path
//! and every configured public endpoint. The router preserves
//! per-connection identity: each incoming message carries the sender's
//! identity in its routing header, and the handler appends a copy of
//! that identity to the body so the worker can record associations.
//! Replies and pushes travel back through the same socket, which keeps
//! delivery FIFO per peer.

use crate::constants::{transport, POLL_INTERVAL_MS};
use crate::error::AgentError;
use crate::keys::CurveKeys;
use crate::types::ConnectionId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, trace, warn};

/// The client-facing router socket
///
/// Clones share the underlying socket; the receive loop runs on its
/// own thread while the broker and push bridge send through the same
/// handle under the socket mutex.
#[derive(Clone)]
pub struct Frontend {
    context: Arc<zmq::Context>,
    server_keys: CurveKeys,
    socket: Arc<Mutex<Option<zmq::Socket>>>,
    running: Arc<AtomicBool>,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
    bound: Arc<Mutex<Vec<String>>>,
}

impl Frontend {
    #[must_use]
    pub fn new(context: Arc<zmq::Context>, server_keys: CurveKeys) -> Self {
        Self {
            context,
            server_keys,
            socket: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            handle: Arc::new(Mutex::new(None)),
            bound: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Bind the router and start the receive loop
    ///
    /// `forward` receives each well-formed request with the sender's
    /// identity appended to the body. The ZAP handler must already be
    /// running: the domain is set here, and the transport consults the
    /// handler on every new connection.
    pub fn start<F>(
        &self,
        socket_path: &str,
        endpoints: &[String],
        forward: F,
    ) -> Result<(), AgentError>
    where
        F: Fn(Vec<Vec<u8>>) + Send + 'static,
    {
        let socket = self.create_socket()?;

        let mut bound = Vec::new();
        let ipc = as_endpoint(socket_path);
        bind(&socket, &ipc, &mut bound)?;
        for endpoint in endpoints {
            bind(&socket, endpoint, &mut bound)?;
        }
        *self.bound.lock() = bound;

        *self.socket.lock() = Some(socket);
        self.running.store(true, Ordering::Relaxed);

        let shared = Arc::clone(&self.socket);
        let running = Arc::clone(&self.running);
        let handle = std::thread::Builder::new()
            .name("otagent-frontend".to_string())
            .spawn(move || receive_loop(&shared, &running, &forward))
            .map_err(|e| AgentError::InvalidConfig {
                reason: format!("failed to spawn frontend thread: {}", e),
            })?;
        *self.handle.lock() = Some(handle);

        Ok(())
    }

    /// Send raw frames through the router
    ///
    /// Used by the broker for replies: the routing header the frames
    /// still carry delivers them to the right client.
    pub fn send(&self, frames: Vec<Vec<u8>>) -> Result<(), AgentError> {
        let guard = self.socket.lock();
        let socket = guard.as_ref().ok_or(AgentError::NotStarted {
            component: "frontend",
        })?;

        socket
            .send_multipart(frames, 0)
            .map_err(|e| AgentError::Send {
                target: "frontend".to_string(),
                source: e,
            })
    }

    /// Send a push message to one connection
    ///
    /// Body layout: `"PUSH"` followed by the caller's payload frames.
    pub fn send_push(
        &self,
        connection: &ConnectionId,
        payload: Vec<Vec<u8>>,
    ) -> Result<(), AgentError> {
        assert!(!connection.is_empty());

        let mut frames = Vec::with_capacity(3 + payload.len());
        frames.push(connection.as_bytes().to_vec());
        frames.push(Vec::new());
        frames.push(transport::PUSH_FRAME.to_vec());
        frames.extend(payload);

        self.send(frames)
    }

    /// Endpoints actually bound, with wildcard ports resolved
    pub fn bound_endpoints(&self) -> Vec<String> {
        self.bound.lock().clone()
    }

    /// Stop the receive loop and close the socket
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                error!("Frontend thread panicked");
            }
        }
        *self.socket.lock() = None;
    }

    fn create_socket(&self) -> Result<zmq::Socket, AgentError> {
        let transport_err = |e| AgentError::Transport {
            endpoint: "frontend router".to_string(),
            source: e,
        };

        let socket = self.context.socket(zmq::ROUTER).map_err(transport_err)?;
        socket.set_linger(0).map_err(transport_err)?;
        socket.set_curve_server(true).map_err(transport_err)?;
        socket
            .set_curve_secretkey(&self.server_keys.secret)
            .map_err(transport_err)?;
        socket
            .set_zap_domain(transport::ZAP_DOMAIN)
            .map_err(transport_err)?;

        Ok(socket)
    }
}

fn as_endpoint(socket_path: &str) -> String {
    if socket_path.contains("://") {
        socket_path.to_string()
    } else {
        format!("ipc://{}", socket_path)
    }
}

fn bind(socket: &zmq::Socket, endpoint: &str, bound: &mut Vec<String>) -> Result<(), AgentError> {
    socket.bind(endpoint).map_err(|e| AgentError::Transport {
        endpoint: endpoint.to_string(),
        source: e,
    })?;

    // Resolve wildcard ports to the address peers can actually reach
    let actual = socket
        .get_last_endpoint()
        .ok()
        .and_then(|r| r.ok())
        .unwrap_or_else(|| endpoint.to_string());
    debug!(endpoint = %actual, "Frontend listening");
    bound.push(actual);

    Ok(())
}

fn receive_loop<F>(
    shared: &Arc<Mutex<Option<zmq::Socket>>>,
    running: &AtomicBool,
    forward: &F,
) where
    F: Fn(Vec<Vec<u8>>),
{
    while running.load(Ordering::Relaxed) {
        let frames = {
            let guard = shared.lock();
            let Some(socket) = guard.as_ref() else { break };

            let mut items = [socket.as_poll_item(zmq::POLLIN)];
            if let Err(e) = zmq::poll(&mut items, POLL_INTERVAL_MS) {
                error!(error = %e, "Frontend poll failed");
                break;
            }
            if !items[0].is_readable() {
                continue;
            }

            match socket.recv_multipart(0) {
                Ok(frames) => frames,
                Err(e) => {
                    error!(error = %e, "Frontend receive failed");
                    continue;
                }
            }
        };

        handle_incoming(frames, forward);
    }
}

/// Append the sender's identity to the body and hand the message to
/// the broker
fn handle_incoming<F>(mut frames: Vec<Vec<u8>>, forward: &F)
where
    F: Fn(Vec<Vec<u8>>),
{
    let (header, body) = split_envelope(&frames);

    if header.is_empty() {
        warn!("Message without routing header");
        return;
    }
    if body.is_empty() {
        warn!("Empty command");
        return;
    }

    let identity = header[header.len() - 1].clone();
    if identity.is_empty() {
        warn!("Message with empty identity frame");
        return;
    }

    trace!(connection = %ConnectionId::from(identity.as_slice()), "Request received");

    // The worker reads this copy; the routing header is consumed by
    // the reply path before the body reaches it.
    frames.push(identity);
    forward(frames);
}

/// Split router frames at the empty delimiter into header and body
///
/// A message with no delimiter is treated as a bare identity plus
/// body.
fn split_envelope(frames: &[Vec<u8>]) -> (&[Vec<u8>], &[Vec<u8>]) {
    match frames.iter().position(|frame| frame.is_empty()) {
        Some(i) => (&frames[..i], &frames[i + 1..]),
        None if frames.is_empty() => (&[], &[]),
        None => (&frames[..1], &frames[1..]),
    }
}
