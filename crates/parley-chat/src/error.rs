//! Error types for chat turns.

use parley_core::error::ParleyError;

/// Errors from the chat service.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    /// Missing and foreign conversations are indistinguishable.
    #[error("conversation not found")]
    ConversationNotFound,
    #[error("storage error: {message}")]
    Storage {
        /// Whether the user's message was durably recorded before the failure.
        input_recorded: bool,
        message: String,
    },
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// Map a store error raised after the user message was persisted.
    pub(crate) fn after_input(err: ParleyError) -> Self {
        match err {
            ParleyError::NotFound => ChatError::ConversationNotFound,
            other => ChatError::Storage {
                input_recorded: true,
                message: other.to_string(),
            },
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ChatError::EmptyMessage | ChatError::MessageTooLong(_))
    }
}

impl From<ParleyError> for ChatError {
    fn from(err: ParleyError) -> Self {
        match err {
            ParleyError::NotFound => ChatError::ConversationNotFound,
            other => ChatError::Storage {
                input_recorded: false,
                message: other.to_string(),
            },
        }
    }
}
