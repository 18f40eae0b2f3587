//! Error types for the agent
//!
//! Transport errors at startup are fatal; runtime message errors are
//! contained to the offending message and logged where they occur.

use std::fmt;

/// Errors raised by the agent's own machinery
#[derive(Debug)]
pub enum AgentError {
    /// Socket creation, bind, or connect failed
    Transport {
        endpoint: String,
        source: zmq::Error,
    },

    /// A send on an agent socket failed
    Send { target: String, source: zmq::Error },

    /// A socket operation was attempted before the component was started
    NotStarted { component: &'static str },

    /// Key material could not be generated or decoded
    KeyMaterial { reason: String },

    /// A payload could not be encoded or decoded
    Codec { context: &'static str, reason: String },

    /// The settings file could not be read or written
    Settings {
        path: String,
        source: std::io::Error,
    },

    /// A required configuration value is missing or invalid
    InvalidConfig { reason: String },

    /// The engine rejected a session operation
    Engine { reason: String },
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { endpoint, source } => {
                write!(f, "Transport failure on '{}': {}", endpoint, source)
            }
            Self::Send { target, source } => {
                write!(f, "Failed to send to {}: {}", target, source)
            }
            Self::NotStarted { component } => {
                write!(f, "{} has not been started", component)
            }
            Self::KeyMaterial { reason } => {
                write!(f, "Invalid key material: {}", reason)
            }
            Self::Codec { context, reason } => {
                write!(f, "Failed to encode/decode {}: {}", context, reason)
            }
            Self::Settings { path, source } => {
                write!(f, "Settings persistence failed for '{}': {}", path, source)
            }
            Self::InvalidConfig { reason } => {
                write!(f, "Invalid configuration: {}", reason)
            }
            Self::Engine { reason } => {
                write!(f, "Engine error: {}", reason)
            }
        }
    }
}

impl std::error::Error for AgentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport { source, .. } | Self::Send { source, .. } => Some(source),
            Self::Settings { source, .. } => Some(source),
            _ => None,
        }
    }
}
