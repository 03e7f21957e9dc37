//! Integration tests for the Parley API.
//!
//! Drives the full router (auth, rate limit, handlers, error envelope) with
//! in-memory SQLite and a mock orchestrator. Each test builds its own state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use parley_agent::{AgentOrchestrator, MockOrchestrator};
use parley_api::auth::{AuthError, IdentityVerifier};
use parley_api::handlers::{
    ConversationListResponse, CreatedConversationResponse, HealthResponse, MessageListResponse,
    SendMessageResponse,
};
use parley_api::{create_router, AppState, NoAuthVerifier};
use parley_chat::ChatService;
use parley_core::config::ParleyConfig;
use parley_core::error::ParleyError;
use parley_core::types::UserIdentity;
use parley_storage::{ConversationStore, Database};

// =============================================================================
// Helpers
// =============================================================================

const ALICE_TOKEN: &str = "token-alice";
const BOB_TOKEN: &str = "token-bob";

/// Accepts two fixed tokens, like a provider with two signed-in users.
struct StaticVerifier;

#[async_trait]
impl IdentityVerifier for StaticVerifier {
    async fn verify(&self, token: Option<&str>) -> Result<UserIdentity, AuthError> {
        match token {
            Some(ALICE_TOKEN) => Ok(UserIdentity::new("alice")),
            Some(BOB_TOKEN) => Ok(UserIdentity::new("bob")),
            Some(_) => Err(AuthError::Rejected),
            None => Err(AuthError::MissingToken),
        }
    }
}

struct TestApp {
    state: AppState,
    db: Arc<Database>,
}

impl TestApp {
    fn router(&self) -> axum::Router {
        create_router(self.state.clone())
    }

    /// Run raw SQL against the backing database.
    fn exec(&self, sql: &str) {
        self.db
            .with_conn(|conn| {
                conn.execute_batch(sql)
                    .map_err(|e| ParleyError::Storage(e.to_string()))
            })
            .unwrap();
    }
}

fn make_app_with(
    config: ParleyConfig,
    orchestrator: Arc<dyn AgentOrchestrator>,
    verifier: Arc<dyn IdentityVerifier>,
) -> TestApp {
    let db = Arc::new(Database::in_memory().unwrap());
    let chat = ChatService::new(
        ConversationStore::new(db.clone()),
        orchestrator,
        config.chat.clone(),
        Duration::from_secs(config.agent.timeout_secs),
    );
    TestApp {
        state: AppState::new(config, chat, verifier),
        db,
    }
}

fn make_app() -> TestApp {
    make_app_with(
        ParleyConfig::default(),
        Arc::new(MockOrchestrator::echo()),
        Arc::new(StaticVerifier),
    )
}

fn authed_get(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

fn authed_post_json(uri: &str, token: &str, json: &str) -> Request<Body> {
    Request::post(uri)
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

fn authed_delete(uri: &str, token: &str) -> Request<Body> {
    Request::delete(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(resp: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

async fn send(app: &TestApp, token: &str, json: &str) -> axum::response::Response {
    app.router()
        .oneshot(authed_post_json("/api/v1/chat", token, json))
        .await
        .unwrap()
}

// =============================================================================
// Public endpoints
// =============================================================================

#[tokio::test]
async fn test_health_is_public() {
    let app = make_app();
    let resp = app
        .router()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let health: HealthResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(health.status, "ok");
    assert!(!health.version.is_empty());
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = make_app();
    let resp = app
        .router()
        .oneshot(
            Request::get("/api/v1/conversations")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(resp).await;
    assert_eq!(json["error"], "unauthorized");
}

#[tokio::test]
async fn test_rejected_token_is_unauthorized() {
    let app = make_app();
    let resp = app
        .router()
        .oneshot(authed_get("/api/v1/conversations", "forged"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_no_auth_mode_uses_token_as_identity() {
    let app = make_app_with(
        ParleyConfig::default(),
        Arc::new(MockOrchestrator::echo()),
        Arc::new(NoAuthVerifier),
    );

    let resp = send(&app, "dev-1", r#"{"message":"hi"}"#).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let mine = app
        .router()
        .oneshot(authed_get("/api/v1/conversations", "dev-1"))
        .await
        .unwrap();
    let mine: ConversationListResponse = serde_json::from_slice(&body_bytes(mine).await).unwrap();
    assert_eq!(mine.conversations.len(), 1);

    let anonymous = app
        .router()
        .oneshot(
            Request::get("/api/v1/conversations")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::OK);
    let anonymous: ConversationListResponse =
        serde_json::from_slice(&body_bytes(anonymous).await).unwrap();
    assert!(anonymous.conversations.is_empty());
}

// =============================================================================
// Chat turns
// =============================================================================

#[tokio::test]
async fn test_send_without_conversation_creates_one() {
    let app = make_app();
    let resp = send(&app, ALICE_TOKEN, r#"{"message":"What's the weather?"}"#).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: SendMessageResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(body.message, "Echo: What's the weather?");
    assert!(!body.is_error);
    assert_eq!(body.title.as_deref(), Some("What's the weather?"));

    let resp = app
        .router()
        .oneshot(authed_get(
            &format!("/api/v1/conversations/{}/messages", body.conversation_id),
            ALICE_TOKEN,
        ))
        .await
        .unwrap();
    let list: MessageListResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(list.messages.len(), 3);
    assert_eq!(list.messages[2].id, body.message_id);
    let seqs: Vec<i64> = list.messages.iter().map(|m| m.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_send_to_existing_conversation() {
    let app = make_app();
    let resp = app
        .router()
        .oneshot(authed_post_json("/api/v1/conversations", ALICE_TOKEN, ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: CreatedConversationResponse =
        serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(created.conversation.title, "New Conversation");
    assert_eq!(created.greeting.seq, 1);

    let json = format!(
        r#"{{"message":"second","conversationId":"{}"}}"#,
        created.conversation.id
    );
    let resp = send(&app, ALICE_TOKEN, &json).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: SendMessageResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(body.conversation_id, created.conversation.id);
    assert_eq!(body.title.as_deref(), Some("second"));
}

#[tokio::test]
async fn test_send_empty_message_is_bad_request() {
    let app = make_app();
    let resp = send(&app, ALICE_TOKEN, r#"{"message":"   "}"#).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = body_json(resp).await;
    assert_eq!(json["error"], "bad_request");

    let resp = app
        .router()
        .oneshot(authed_get("/api/v1/conversations", ALICE_TOKEN))
        .await
        .unwrap();
    let list: ConversationListResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert!(list.conversations.is_empty());
}

#[tokio::test]
async fn test_malformed_json_uses_error_envelope() {
    let app = make_app();
    let resp = send(&app, ALICE_TOKEN, r#"{"message": "#).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = body_json(resp).await;
    assert_eq!(json["error"], "bad_request");

    let resp = send(&app, ALICE_TOKEN, r#"{"message":"hi","conversationId":"nope"}"#).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_orchestrator_failure_is_reported_in_band() {
    let app = make_app_with(
        ParleyConfig::default(),
        Arc::new(MockOrchestrator::failing()),
        Arc::new(StaticVerifier),
    );
    let resp = send(&app, ALICE_TOKEN, r#"{"message":"hello"}"#).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: SendMessageResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert!(body.is_error);
    assert_eq!(body.message, ParleyConfig::default().chat.error_message);
}

#[tokio::test]
async fn test_store_failure_after_input_reports_recorded() {
    let app = make_app();
    app.exec(
        "CREATE TRIGGER fail_assistant BEFORE INSERT ON messages
         WHEN NEW.role = 'assistant' AND NEW.seq > 1
         BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
    );

    let resp = send(&app, ALICE_TOKEN, r#"{"message":"kept"}"#).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(resp).await;
    assert_eq!(json["error"], "store_unavailable");
    assert_eq!(json["details"]["inputRecorded"], true);
    assert!(!json["message"].as_str().unwrap().contains("disk full"));
}

#[tokio::test]
async fn test_store_failure_before_input_reports_not_recorded() {
    let app = make_app();
    app.exec(
        "CREATE TRIGGER fail_user BEFORE INSERT ON messages
         WHEN NEW.role = 'user'
         BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
    );

    let resp = send(&app, ALICE_TOKEN, r#"{"message":"lost"}"#).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(resp).await;
    assert_eq!(json["details"]["inputRecorded"], false);
}

#[tokio::test]
async fn test_title_failure_does_not_block_reply() {
    let app = make_app();
    app.exec(
        "CREATE TRIGGER lock_title BEFORE UPDATE OF title ON conversations
         BEGIN SELECT RAISE(ABORT, 'title locked'); END;",
    );

    let resp = send(&app, ALICE_TOKEN, r#"{"message":"hello"}"#).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["isError"], false);
    assert!(json.get("title").is_none());
}

// =============================================================================
// Ownership
// =============================================================================

#[tokio::test]
async fn test_foreign_conversation_is_not_found() {
    let app = make_app();
    let resp = send(&app, ALICE_TOKEN, r#"{"message":"private"}"#).await;
    let body: SendMessageResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();

    let foreign = app
        .router()
        .oneshot(authed_get(
            &format!("/api/v1/conversations/{}/messages", body.conversation_id),
            BOB_TOKEN,
        ))
        .await
        .unwrap();
    let missing = app
        .router()
        .oneshot(authed_get(
            &format!("/api/v1/conversations/{}/messages", Uuid::new_v4()),
            BOB_TOKEN,
        ))
        .await
        .unwrap();
    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(foreign).await, body_json(missing).await);

    let json = format!(
        r#"{{"message":"intrude","conversationId":"{}"}}"#,
        body.conversation_id
    );
    let resp = send(&app, BOB_TOKEN, &json).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .router()
        .oneshot(authed_get(
            &format!("/api/v1/conversations/{}/messages", body.conversation_id),
            ALICE_TOKEN,
        ))
        .await
        .unwrap();
    let list: MessageListResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(list.messages.len(), 3);
}

#[tokio::test]
async fn test_malformed_id_is_bad_request() {
    let app = make_app();
    let resp = app
        .router()
        .oneshot(authed_get("/api/v1/conversations/not-a-uuid/messages", ALICE_TOKEN))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = body_json(resp).await;
    assert_eq!(json["error"], "bad_request");
}

// =============================================================================
// Listing and deletion
// =============================================================================

#[tokio::test]
async fn test_list_conversations_newest_first() {
    let app = make_app();
    let mut ids = Vec::new();
    for text in ["one", "two", "three"] {
        let resp = send(&app, ALICE_TOKEN, &format!(r#"{{"message":"{}"}}"#, text)).await;
        let body: SendMessageResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        ids.push(body.conversation_id);
    }
    send(&app, BOB_TOKEN, r#"{"message":"other user"}"#).await;

    let resp = app
        .router()
        .oneshot(authed_get("/api/v1/conversations", ALICE_TOKEN))
        .await
        .unwrap();
    let list: ConversationListResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    let listed: Vec<Uuid> = list.conversations.iter().map(|c| c.id).collect();
    ids.reverse();
    assert_eq!(listed, ids);
    assert_eq!(list.conversations[0].title, "three");
}

#[tokio::test]
async fn test_delete_conversation() {
    let app = make_app();
    let resp = send(&app, ALICE_TOKEN, r#"{"message":"temporary"}"#).await;
    let body: SendMessageResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    let uri = format!("/api/v1/conversations/{}", body.conversation_id);

    let resp = app.router().oneshot(authed_delete(&uri, BOB_TOKEN)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app.router().oneshot(authed_delete(&uri, ALICE_TOKEN)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app
        .router()
        .oneshot(authed_get(&format!("{}/messages", uri), ALICE_TOKEN))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Rate limiting
// =============================================================================

#[tokio::test]
async fn test_rate_limit_rejects_excess_requests() {
    let mut config = ParleyConfig::default();
    config.server.rate_limit_per_sec = 2;
    let app = make_app_with(config, Arc::new(MockOrchestrator::echo()), Arc::new(StaticVerifier));
    let router = app.router();

    let mut statuses = Vec::new();
    for _ in 0..5 {
        let resp = router
            .clone()
            .oneshot(authed_get("/api/v1/conversations", ALICE_TOKEN))
            .await
            .unwrap();
        statuses.push(resp.status());
    }
    assert!(statuses.contains(&StatusCode::TOO_MANY_REQUESTS));

    // Health is outside the limited scope.
    let resp = router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
