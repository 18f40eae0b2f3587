//! # otagent
//!
//! A multiplexing RPC agent that sits between remote clients and an
//! embedded financial-transaction engine. Clients connect over
//! CurveZMQ to an authenticated router; requests fan out through an
//! internal dealer to a pool of reply workers that call the engine;
//! asynchronous engine events come back through a push subscriber and
//! are delivered to the client connection that caused them.
//!
//! ## Architecture
//!
//! - **frontend**: authenticated ROUTER socket preserving
//!   per-connection identity
//! - **broker**: internal DEALER fanning requests out to the workers
//! - **worker**: REP pool calling the engine and recording
//!   associations
//! - **push_bridge**: SUB loop translating engine pushes into frontend
//!   pushes
//! - **associations**: the task and nym maps that make push routing
//!   possible
//! - **auth**: ZAP handler admitting a single trusted Curve key
//! - **session**: engine session startup and periodic refresh
//! - **settings**: INI-persisted counters and key material
//! - **agent**: the orchestrator owning all of the above
//!
//! The engine itself is external; the [`engine::Engine`] trait names
//! the operations the agent consumes, and [`engine::SimEngine`] is the
//! in-process stand-in used by the binary and the tests.

pub mod agent;
pub mod args;
pub mod associations;
pub mod auth;
pub mod broker;
pub mod constants;
pub mod engine;
pub mod error;
pub mod frontend;
pub mod keys;
pub mod logging;
pub mod push_bridge;
pub mod rpc;
pub mod session;
pub mod settings;
pub mod types;
pub mod worker;

pub use agent::{Agent, AgentConfig};
pub use associations::AssociationTables;
pub use engine::{Engine, SimEngine};
pub use error::AgentError;
pub use keys::{CurveKeys, KeyMaterial};
pub use settings::SettingsStore;
pub use types::{AccountId, ConnectionId, NymId, TaskId};
