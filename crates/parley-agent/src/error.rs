//! Error types for orchestrator and tool gateway calls.

/// Errors from the agent runtime or a tool server.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent runtime is not configured")]
    NotConfigured,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream returned HTTP {status}")]
    Http { status: u16 },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("tool '{tool}' failed: {message}")]
    Tool { tool: String, message: String },
    #[error("tool call limit of {0} rounds exceeded")]
    TooManyToolRounds(u32),
    #[error("timed out")]
    Timeout,
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AgentError::Timeout
        } else if err.is_decode() {
            AgentError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            AgentError::Http {
                status: status.as_u16(),
            }
        } else {
            AgentError::Transport(err.to_string())
        }
    }
}
