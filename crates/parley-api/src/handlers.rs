//! Route handler functions for all API endpoints.
//!
//! Handlers extract the caller's identity (inserted by the auth middleware),
//! call the chat service and return camelCase JSON. Body and path rejections
//! are turned into the standard error envelope.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use parley_core::types::{Conversation, Message, Role, UserIdentity};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    /// Assistant reply rendered as text.
    pub message: String,
    pub conversation_id: Uuid,
    pub message_id: Uuid,
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Conversation> for ConversationSummary {
    fn from(c: Conversation) -> Self {
        Self {
            id: c.id,
            title: c.title,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: Uuid,
    pub seq: i64,
    pub role: Role,
    pub content: String,
    /// `text` or `analysis`.
    pub kind: String,
    pub created_at: DateTime<Utc>,
    pub is_error: bool,
}

impl From<Message> for MessageResponse {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            seq: m.seq,
            role: m.role,
            content: m.content.as_text(),
            kind: m.content.kind().to_string(),
            created_at: m.created_at,
            is_error: m.is_error,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageListResponse {
    pub messages: Vec<MessageResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedConversationResponse {
    #[serde(flatten)]
    pub conversation: ConversationSummary,
    pub greeting: MessageResponse,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /health - liveness probe.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// POST /api/v1/chat - run one turn.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let Json(req) = payload?;

    let outcome = state
        .chat
        .send_message(req.conversation_id, &user, &req.message)
        .await?;

    Ok(Json(SendMessageResponse {
        message: outcome.assistant_message.content.as_text(),
        conversation_id: outcome.conversation_id,
        message_id: outcome.assistant_message.id,
        is_error: outcome.assistant_message.is_error,
        title: outcome.title,
    }))
}

/// GET /api/v1/conversations - caller's conversations, newest first.
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
) -> Result<Json<ConversationListResponse>, ApiError> {
    let conversations = state.chat.list_conversations(&user)?;
    Ok(Json(ConversationListResponse {
        conversations: conversations.into_iter().map(Into::into).collect(),
    }))
}

/// POST /api/v1/conversations - start a conversation holding the greeting.
pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
) -> Result<(StatusCode, Json<CreatedConversationResponse>), ApiError> {
    let created = state.chat.create_conversation(&user)?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedConversationResponse {
            conversation: created.conversation.into(),
            greeting: created.greeting.into(),
        }),
    ))
}

/// GET /api/v1/conversations/{id}/messages - ordered message log.
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<MessageListResponse>, ApiError> {
    let Path(id) = id?;
    let messages = state.chat.list_messages(id, &user)?;
    Ok(Json(MessageListResponse {
        messages: messages.into_iter().map(Into::into).collect(),
    }))
}

/// DELETE /api/v1/conversations/{id}
pub async fn delete_conversation(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id?;
    state.chat.delete_conversation(id, &user).await?;
    info!(conversation_id = %id, "Conversation removed via API");
    Ok(StatusCode::NO_CONTENT)
}
