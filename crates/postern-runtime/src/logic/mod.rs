//! Session Owner Logic
//!
//! The session owner is split into focused components:
//! - `state`: the owned session state, counters and handler outcomes
//! - `handlers`: one handler per front-end command
//! - `task`: the event loop, persistence hand-off and ordered shutdown
//!
//! All session mutation is serialized through this one task. The message
//! queue is the only structure it shares, and the network actor only drains
//! it.

pub mod handlers;
pub mod state;
pub mod task;

pub use handlers::CommandHandlers;
pub use state::{Outcome, OwnerState, OwnerStats};
pub use task::{OwnerChannels, SessionOwnerTask};
