//! Command-line argument parsing

use clap::Parser;
use std::path::PathBuf;

/// Multiplexing RPC agent for an embedded transaction engine
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Persistent settings file path
    #[arg(short, long, default_value = "otagent.ini", env = "OTAGENT_SETTINGS")]
    pub settings: PathBuf,

    /// Local frontend socket path
    #[arg(
        long,
        default_value = "/tmp/otagent.sock",
        env = "OTAGENT_SOCKET_PATH"
    )]
    pub socket_path: String,

    /// Public frontend endpoint (repeatable), e.g. tcp://0.0.0.0:9090
    #[arg(short, long = "endpoint", env = "OTAGENT_ENDPOINT")]
    pub endpoints: Vec<String>,

    /// Client sessions to start (overrides the persisted count)
    #[arg(long, env = "OTAGENT_CLIENTS")]
    pub clients: Option<i64>,

    /// Server sessions to start (overrides the persisted count)
    #[arg(long, env = "OTAGENT_SERVERS")]
    pub servers: Option<i64>,
}

impl Args {
    /// Effective client session count: argument, else persisted value
    #[must_use]
    pub fn effective_clients(&self, persisted: i64) -> i64 {
        self.clients.unwrap_or(persisted).max(0)
    }

    /// Effective server session count: argument, else persisted value
    #[must_use]
    pub fn effective_servers(&self, persisted: i64) -> i64 {
        self.servers.unwrap_or(persisted).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_args() -> Args {
        Args {
            settings: PathBuf::from("otagent.ini"),
            socket_path: "/tmp/otagent.sock".to_string(),
            endpoints: Vec::new(),
            clients: None,
            servers: None,
        }
    }

    #[test]
    fn test_effective_counts_fall_back_to_persisted() {
        let args = default_args();
        assert_eq!(args.effective_clients(2), 2);
        assert_eq!(args.effective_servers(1), 1);
    }

    #[test]
    fn test_effective_counts_prefer_arguments() {
        let args = Args {
            clients: Some(4),
            servers: Some(0),
            ..default_args()
        };
        assert_eq!(args.effective_clients(2), 4);
        assert_eq!(args.effective_servers(1), 0);
    }

    #[test]
    fn test_negative_counts_clamp_to_zero() {
        let args = Args {
            clients: Some(-3),
            ..default_args()
        };
        assert_eq!(args.effective_clients(0), 0);
    }
}
