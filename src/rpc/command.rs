//! Client-originated command payloads

use crate::types::{AccountId, NymId};
use serde::{Deserialize, Serialize};

/// A command submitted by a remote client for the engine
///
/// The agent reads `session`, `owner`, `associate_nym`, and the payload
/// discriminant; everything else passes through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcCommand {
    pub version: u32,
    /// Engine session the command addresses. Even numbers are client
    /// sessions, odd numbers are server sessions.
    pub session: u32,
    /// Nym the command acts on behalf of, where the operation has one
    pub owner: Option<NymId>,
    /// Nyms the client explicitly wants bound to this connection for
    /// push delivery
    pub associate_nym: Vec<NymId>,
    pub payload: CommandPayload,
}

/// The command set the agent can discriminate
///
/// Only the variants that drive association bookkeeping carry fields
/// the agent reads; the rest exist so the engine sees the full command
/// stream unfiltered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandPayload {
    AddClientSession,
    AddServerSession,
    CreateNym { name: String },
    RegisterNym,
    IssueUnitDefinition,
    CreateAccount,
    CreateCompatibleAccount,
    SendPayment { source_account: AccountId },
    AcceptPendingPayments { destination_accounts: Vec<AccountId> },
    ListNyms,
    ListAccounts,
    GetAccountBalance { account: AccountId },
}

impl RpcCommand {
    /// Shorthand for commands that carry no owner or nym associations
    #[must_use]
    pub fn bare(session: u32, payload: CommandPayload) -> Self {
        Self {
            version: 1,
            session,
            owner: None,
            associate_nym: Vec::new(),
            payload,
        }
    }
}
