//! Postern Runtime Engine
//!
//! This crate runs a session on top of `postern-core`:
//! - `SessionRuntime`: starts the actors and returns a `RuntimeHandle`
//! - `SessionOwnerTask`: the single writer of the session state
//! - `PersistenceTask`: encrypts snapshots and replaces the state file
//! - `OfflineNetwork`: the network task used when no server client is wired in

pub mod logic;
pub mod network;
pub mod persistence;
mod runtime;

pub use logic::{CommandHandlers, Outcome, OwnerState, OwnerStats, SessionOwnerTask};
pub use network::OfflineNetwork;
pub use persistence::{create_session_file, open_session_file, write_atomically, PersistenceTask};
pub use runtime::{RuntimeHandle, SessionRuntime};

// Re-export core types for convenience
pub use postern_core::{
    AppEvent, Command, NetworkChannels, NetworkTask, PosternConfig, PosternError, PosternResult,
};
