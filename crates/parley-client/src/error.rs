//! Error types for the client session and transport.

/// Errors surfaced to the UI layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("a message is already being sent in this conversation")]
    SendInFlight,
    #[error("unknown conversation")]
    UnknownConversation,
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::InvalidResponse(err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}
