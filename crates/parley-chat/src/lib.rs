//! Parley chat crate - the turn pipeline between the HTTP layer, the
//! conversation store and the agent orchestrator.

pub mod error;
pub mod service;
pub mod turn;

pub use error::ChatError;
pub use service::{ChatService, CreatedConversation, TurnOutcome};
pub use turn::{TurnLocks, TurnState};
