//! RPC payload model
//!
//! The agent treats commands, responses, and pushes as opaque blobs on
//! the wire and only reads the handful of discriminants and fields
//! needed for association bookkeeping. The types here define exactly
//! that surface plus the bincode codec used on every socket.

mod command;
mod push;
mod response;

pub use command::{CommandPayload, RpcCommand};
pub use push::{PushKind, RpcPush, TaskComplete};
pub use response::{ResponseStatus, RpcResponse, StatusCode, TaskEntry};

use crate::error::AgentError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode a payload for the wire
pub fn encode<T: Serialize>(context: &'static str, value: &T) -> Result<Vec<u8>, AgentError> {
    bincode::serialize(value).map_err(|e| AgentError::Codec {
        context,
        reason: e.to_string(),
    })
}

/// Decode a payload received from the wire
pub fn decode<T: DeserializeOwned>(context: &'static str, bytes: &[u8]) -> Result<T, AgentError> {
    bincode::deserialize(bytes).map_err(|e| AgentError::Codec {
        context,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountId, NymId};

    #[test]
    fn test_command_round_trip() {
        let command = RpcCommand {
            version: 1,
            session: 4,
            owner: Some(NymId::new("owner-nym")),
            associate_nym: vec![NymId::new("n1")],
            payload: CommandPayload::SendPayment {
                source_account: AccountId::new("acct-1"),
            },
        };

        let bytes = encode("command", &command).unwrap();
        let decoded: RpcCommand = decode("command", &bytes).unwrap();
        assert_eq!(decoded.session, 4);
        assert!(matches!(
            decoded.payload,
            CommandPayload::SendPayment { .. }
        ));
    }

    #[test]
    fn test_decode_garbage_is_error() {
        let result: Result<RpcCommand, _> = decode("command", b"\xff\xfe\xfd");
        assert!(result.is_err());
    }
}
