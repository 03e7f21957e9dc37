//! Parley agent crate - contracts for the external agent runtime and tool
//! servers, with HTTP clients for both.

pub mod error;
pub mod gateway;
pub mod mock;
pub mod orchestrator;

pub use error::AgentError;
pub use gateway::{HttpToolGateway, ToolCapability, ToolGateway};
pub use mock::MockOrchestrator;
pub use orchestrator::{AgentOrchestrator, HttpAgentOrchestrator, UnconfiguredOrchestrator};
