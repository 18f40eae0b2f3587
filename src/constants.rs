//! Constants used throughout the agent
//!
//! This module centralizes protocol literals and configuration keys
//! so that the wire format and the settings schema live in one place.

use std::time::Duration;

/// Persisted settings schema (INI)
pub mod settings {
    /// Section holding every agent setting
    pub const SECTION: &str = "otagent";

    /// Number of client sessions started at boot
    pub const CLIENTS: &str = "clients";

    /// Number of server sessions started at boot
    pub const SERVERS: &str = "servers";

    /// Z85-encoded Curve server secret key
    pub const SERVER_PRIVKEY: &str = "server_privkey";

    /// Z85-encoded Curve server public key
    pub const SERVER_PUBKEY: &str = "server_pubkey";

    /// Z85-encoded Curve client secret key
    pub const CLIENT_PRIVKEY: &str = "client_privkey";

    /// Z85-encoded Curve client public key
    pub const CLIENT_PUBKEY: &str = "client_pubkey";
}

/// Transport endpoints and authentication literals
pub mod transport {
    /// ZAP domain the frontend router is registered under
    pub const ZAP_DOMAIN: &str = "otagent";

    /// Well-known ZAP handler endpoint defined by the transport
    pub const ZAP_ENDPOINT: &str = "inproc://zeromq.zap.01";

    /// Prefix for per-worker reply socket endpoints
    pub const WORKER_ENDPOINT_PREFIX: &str = "inproc://opentxs/agent/backend/";

    /// First body frame of every frontend push message
    pub const PUSH_FRAME: &[u8] = b"PUSH";
}

/// Wire versions stamped on outgoing push payloads
pub mod version {
    /// Version of an agent-constructed push payload
    pub const RPC_PUSH: u32 = 2;

    /// Version of the task-complete record embedded in a push
    pub const TASK_COMPLETE: u32 = 1;
}

/// Interval between scheduled client session refreshes
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Poll timeout for every socket handler loop
pub const POLL_INTERVAL_MS: i64 = 100;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_prefix_is_inproc() {
        assert!(transport::WORKER_ENDPOINT_PREFIX.starts_with("inproc://"));
    }

    #[test]
    fn test_refresh_interval() {
        assert_eq!(REFRESH_INTERVAL, Duration::from_secs(30));
    }
}
