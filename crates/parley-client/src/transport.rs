//! Client side of the chat HTTP API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use parley_core::types::Role;

use crate::error::ClientError;

/// Server answer to one turn.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReply {
    pub message: String,
    pub conversation_id: Uuid,
    pub message_id: Uuid,
    pub is_error: bool,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConversation {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMessage {
    pub id: Uuid,
    pub seq: i64,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_error: bool,
}

/// Operations the session needs from the backend.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, conversation_id: Option<Uuid>, text: &str) -> Result<SendReply, ClientError>;
    async fn list_conversations(&self) -> Result<Vec<RemoteConversation>, ClientError>;
    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<RemoteMessage>, ClientError>;
    async fn delete_conversation(&self, conversation_id: Uuid) -> Result<(), ClientError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<Uuid>,
}

#[derive(Deserialize)]
struct ConversationList {
    conversations: Vec<RemoteConversation>,
}

#[derive(Deserialize)]
struct MessageList {
    messages: Vec<RemoteMessage>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    message: String,
}

/// `ChatTransport` over reqwest.
#[derive(Clone, Debug)]
pub struct HttpChatClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpChatClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn execute(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, ClientError> {
        let response = self.authorize(req).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.message)
            .unwrap_or_else(|_| status.canonical_reason().unwrap_or("error").to_string());
        debug!(status = status.as_u16(), message = %message, "Request failed");
        Err(ClientError::Http {
            status: status.as_u16(),
            message,
        })
    }

    async fn json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T, ClientError> {
        let body = self.execute(req).await?.text().await?;
        serde_json::from_str(&body).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl ChatTransport for HttpChatClient {
    async fn send(&self, conversation_id: Option<Uuid>, text: &str) -> Result<SendReply, ClientError> {
        let req = self.client.post(self.url("/chat")).json(&SendRequest {
            message: text,
            conversation_id,
        });
        self.json(req).await
    }

    async fn list_conversations(&self) -> Result<Vec<RemoteConversation>, ClientError> {
        let list: ConversationList = self.json(self.client.get(self.url("/conversations"))).await?;
        Ok(list.conversations)
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<RemoteMessage>, ClientError> {
        let url = self.url(&format!("/conversations/{}/messages", conversation_id));
        let list: MessageList = self.json(self.client.get(url)).await?;
        Ok(list.messages)
    }

    async fn delete_conversation(&self, conversation_id: Uuid) -> Result<(), ClientError> {
        let url = self.url(&format!("/conversations/{}", conversation_id));
        self.execute(self.client.delete(url)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_send_posts_camel_case_body() {
        let conversation_id = Uuid::new_v4();
        let router = Router::new().route(
            "/api/v1/chat",
            post(move |headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["authorization"], "Bearer tok");
                Json(json!({
                    "message": format!("Echo: {}", body["message"].as_str().unwrap_or_default()),
                    "conversationId": body["conversationId"],
                    "messageId": Uuid::new_v4(),
                    "isError": false,
                    "title": "hi"
                }))
            }),
        );
        let base = spawn_server(router).await;
        let client = HttpChatClient::new(reqwest::Client::new(), format!("{}/", base)).with_token("tok");

        let reply = client.send(Some(conversation_id), "hi").await.unwrap();
        assert_eq!(reply.message, "Echo: hi");
        assert_eq!(reply.conversation_id, conversation_id);
        assert_eq!(reply.title.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_error_envelope_becomes_http_error() {
        let router = Router::new().route(
            "/api/v1/conversations",
            get(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": "unauthorized", "message": "Missing Authorization header" })),
                )
            }),
        );
        let base = spawn_server(router).await;
        let client = HttpChatClient::new(reqwest::Client::new(), base);

        let err = client.list_conversations().await.unwrap_err();
        assert_eq!(
            err,
            ClientError::Http {
                status: 401,
                message: "Missing Authorization header".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unparseable_success_is_invalid_response() {
        let router = Router::new().route("/api/v1/chat", post(|| async { "not json" }));
        let base = spawn_server(router).await;
        let client = HttpChatClient::new(reqwest::Client::new(), base);

        let err = client.send(None, "hi").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let client = HttpChatClient::new(reqwest::Client::new(), "http://127.0.0.1:9");
        let err = client.list_conversations().await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }
}
