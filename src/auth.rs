//! ZAP authentication
//!
//! The transport invokes the ZAP handler once per connecting peer. The
//! agent accepts exactly one mechanism (CURVE) and exactly one client
//! public key; everything else is refused. Authentication failures are
//! expected under probing and are not logged at error level.
//!
//! [`ZapAuthenticator`] is the pure decision function;
//! [`ZapHandler`] owns the REP socket on the well-known ZAP endpoint
//! and must be running before the frontend binds.

use crate::constants::{transport, POLL_INTERVAL_MS};
use crate::error::AgentError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, warn};

/// ZAP protocol version the handler speaks
const ZAP_VERSION: &str = "1.0";

/// A parsed authentication request
#[derive(Debug, Clone)]
pub struct ZapRequest {
    pub version: String,
    pub request_id: Vec<u8>,
    pub domain: String,
    pub address: String,
    pub identity: Vec<u8>,
    pub mechanism: String,
    pub credentials: Vec<Vec<u8>>,
}

impl ZapRequest {
    /// Parse the frames of a ZAP request
    ///
    /// Layout: version, request id, domain, address, identity,
    /// mechanism, then zero or more credential frames.
    pub fn parse(frames: &[Vec<u8>]) -> Result<Self, AgentError> {
        if frames.len() < 6 {
            return Err(AgentError::Codec {
                context: "zap request",
                reason: format!("expected at least 6 frames, got {}", frames.len()),
            });
        }

        Ok(Self {
            version: String::from_utf8_lossy(&frames[0]).into_owned(),
            request_id: frames[1].clone(),
            domain: String::from_utf8_lossy(&frames[2]).into_owned(),
            address: String::from_utf8_lossy(&frames[3]).into_owned(),
            identity: frames[4].clone(),
            mechanism: String::from_utf8_lossy(&frames[5]).into_owned(),
            credentials: frames[6..].to_vec(),
        })
    }
}

/// Authentication verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZapReply {
    pub status_code: &'static str,
    pub status_text: &'static str,
}

impl ZapReply {
    const SUCCESS: Self = Self {
        status_code: "200",
        status_text: "OK",
    };

    const fn failure(status_text: &'static str) -> Self {
        Self {
            status_code: "400",
            status_text,
        }
    }

    /// True for an accepting verdict
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code == "200"
    }

    /// Frames to send back on the ZAP socket
    #[must_use]
    pub fn into_frames(self, request_id: &[u8]) -> Vec<Vec<u8>> {
        vec![
            ZAP_VERSION.as_bytes().to_vec(),
            request_id.to_vec(),
            self.status_code.as_bytes().to_vec(),
            self.status_text.as_bytes().to_vec(),
            Vec::new(), // user id
            Vec::new(), // metadata
        ]
    }
}

/// Accepts CURVE connections from a single configured public key
pub struct ZapAuthenticator {
    client_pubkey_z85: String,
}

impl ZapAuthenticator {
    #[must_use]
    pub fn new(client_pubkey_z85: String) -> Self {
        Self { client_pubkey_z85 }
    }

    /// Decide a request
    ///
    /// Only one client key is accepted: the agent assumes a single
    /// trusted peer identity.
    pub fn evaluate(&self, request: &ZapRequest) -> ZapReply {
        if request.version != ZAP_VERSION {
            return ZapReply::failure("Invalid version");
        }

        // The raw ZAP endpoint hears every domain in the process; only
        // the frontend's domain is ours to answer affirmatively.
        if request.domain != transport::ZAP_DOMAIN {
            return ZapReply::failure("Unknown domain");
        }

        if request.mechanism != "CURVE" {
            return ZapReply::failure("Unsupported mechanism");
        }

        let presented = request
            .credentials
            .first()
            .and_then(|key| zmq::z85_encode(key).ok());

        match presented {
            Some(key) if key == self.client_pubkey_z85 => ZapReply::SUCCESS,
            _ => ZapReply::failure("Incorrect pubkey"),
        }
    }
}

impl std::fmt::Debug for ZapAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZapAuthenticator")
            .field("client_pubkey_z85", &self.client_pubkey_z85)
            .finish()
    }
}

/// The REP loop on `inproc://zeromq.zap.01`
pub struct ZapHandler {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ZapHandler {
    /// Bind the ZAP endpoint and start answering requests
    ///
    /// Must complete before the frontend binds, or early connections
    /// race the handler registration.
    pub fn start(
        context: &Arc<zmq::Context>,
        authenticator: ZapAuthenticator,
    ) -> Result<Self, AgentError> {
        let socket = context
            .socket(zmq::REP)
            .map_err(|e| AgentError::Transport {
                endpoint: transport::ZAP_ENDPOINT.to_string(),
                source: e,
            })?;
        socket.set_linger(0).map_err(|e| AgentError::Transport {
            endpoint: transport::ZAP_ENDPOINT.to_string(),
            source: e,
        })?;
        socket
            .bind(transport::ZAP_ENDPOINT)
            .map_err(|e| AgentError::Transport {
                endpoint: transport::ZAP_ENDPOINT.to_string(),
                source: e,
            })?;

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name("otagent-zap".to_string())
            .spawn(move || zap_loop(&socket, &authenticator, &flag))
            .map_err(|e| AgentError::InvalidConfig {
                reason: format!("failed to spawn ZAP thread: {}", e),
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Stop answering and join the thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("ZAP handler thread panicked");
            }
        }
    }
}

impl Drop for ZapHandler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn zap_loop(socket: &zmq::Socket, authenticator: &ZapAuthenticator, running: &AtomicBool) {
    while running.load(Ordering::Relaxed) {
        let mut items = [socket.as_poll_item(zmq::POLLIN)];
        if let Err(e) = zmq::poll(&mut items, POLL_INTERVAL_MS) {
            error!(error = %e, "ZAP poll failed");
            break;
        }
        if !items[0].is_readable() {
            continue;
        }

        let frames = match socket.recv_multipart(0) {
            Ok(frames) => frames,
            Err(e) => {
                error!(error = %e, "ZAP receive failed");
                continue;
            }
        };

        let (request_id, reply) = match ZapRequest::parse(&frames) {
            Ok(request) => {
                let reply = authenticator.evaluate(&request);
                if reply.is_success() {
                    debug!(address = %request.address, "Authenticated peer");
                } else {
                    debug!(
                        address = %request.address,
                        mechanism = %request.mechanism,
                        status = reply.status_text,
                        "Refused peer"
                    );
                }
                (request.request_id, reply)
            }
            Err(e) => {
                warn!(error = %e, "Malformed ZAP request");
                (Vec::new(), ZapReply::failure("Malformed request"))
            }
        };

        if let Err(e) = socket.send_multipart(reply.into_frames(&request_id), 0) {
            error!(error = %e, "Failed to send ZAP reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve_request(domain: &str, mechanism: &str, credential: &[u8]) -> ZapRequest {
        ZapRequest {
            version: ZAP_VERSION.to_string(),
            request_id: b"1".to_vec(),
            domain: domain.to_string(),
            address: "127.0.0.1".to_string(),
            identity: Vec::new(),
            mechanism: mechanism.to_string(),
            credentials: vec![credential.to_vec()],
        }
    }

    fn authenticator_for(key: &[u8; 32]) -> ZapAuthenticator {
        ZapAuthenticator::new(zmq::z85_encode(key).unwrap())
    }

    #[test]
    fn test_accepts_configured_curve_key() {
        let key = [7u8; 32];
        let auth = authenticator_for(&key);

        let reply = auth.evaluate(&curve_request("otagent", "CURVE", &key));
        assert!(reply.is_success());
        assert_eq!(reply.status_text, "OK");
    }

    #[test]
    fn test_rejects_non_curve_mechanism() {
        let key = [7u8; 32];
        let auth = authenticator_for(&key);

        let reply = auth.evaluate(&curve_request("otagent", "NULL", &key));
        assert!(!reply.is_success());
        assert_eq!(reply.status_text, "Unsupported mechanism");
    }

    #[test]
    fn test_rejects_wrong_pubkey() {
        let auth = authenticator_for(&[7u8; 32]);

        let reply = auth.evaluate(&curve_request("otagent", "CURVE", &[8u8; 32]));
        assert!(!reply.is_success());
        assert_eq!(reply.status_text, "Incorrect pubkey");
    }

    #[test]
    fn test_rejects_missing_credentials() {
        let auth = authenticator_for(&[7u8; 32]);
        let mut request = curve_request("otagent", "CURVE", &[7u8; 32]);
        request.credentials.clear();

        assert_eq!(auth.evaluate(&request).status_text, "Incorrect pubkey");
    }

    #[test]
    fn test_rejects_foreign_domain() {
        let key = [7u8; 32];
        let auth = authenticator_for(&key);

        let reply = auth.evaluate(&curve_request("other", "CURVE", &key));
        assert_eq!(reply.status_text, "Unknown domain");
    }

    #[test]
    fn test_rejects_wrong_version() {
        let key = [7u8; 32];
        let auth = authenticator_for(&key);
        let mut request = curve_request("otagent", "CURVE", &key);
        request.version = "2.0".to_string();

        assert_eq!(auth.evaluate(&request).status_text, "Invalid version");
    }

    #[test]
    fn test_reply_frame_layout() {
        let frames = ZapReply::SUCCESS.into_frames(b"req-9");
        assert_eq!(frames.len(), 6);
        assert_eq!(frames[0], b"1.0");
        assert_eq!(frames[1], b"req-9");
        assert_eq!(frames[2], b"200");
        assert_eq!(frames[3], b"OK");
    }

    #[test]
    fn test_parse_rejects_short_request() {
        let frames = vec![b"1.0".to_vec(), b"1".to_vec()];
        assert!(ZapRequest::parse(&frames).is_err());
    }
}
