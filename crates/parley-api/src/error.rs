//! API error types and JSON error response formatting.
//!
//! Every failure leaves the server as `{ error, message, details? }`.
//! Internal detail is logged here and never returned to the caller.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use parley_chat::ChatError;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 - malformed body, path or invalid message.
    BadRequest(String),
    /// 401 - missing or rejected credentials.
    Unauthorized(String),
    /// 404 - conversation missing or owned by someone else.
    NotFound,
    /// 500 - unexpected failure; the detail is only logged.
    Internal(String),
    /// 503 - the conversation store failed.
    StoreUnavailable { input_recorded: bool },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                "not_found",
                "Conversation not found".to_string(),
                None,
            ),
            ApiError::Internal(detail) => {
                error!(error = %detail, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                    None,
                )
            }
            ApiError::StoreUnavailable { input_recorded } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "store_unavailable",
                "Conversation storage is temporarily unavailable".to_string(),
                Some(serde_json::json!({ "inputRecorded": input_recorded })),
            ),
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::EmptyMessage | ChatError::MessageTooLong(_) => {
                ApiError::BadRequest(err.to_string())
            }
            ChatError::ConversationNotFound => ApiError::NotFound,
            ChatError::Storage {
                input_recorded,
                message,
            } => {
                error!(input_recorded, error = %message, "Conversation store failure");
                ApiError::StoreUnavailable { input_recorded }
            }
            ChatError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
