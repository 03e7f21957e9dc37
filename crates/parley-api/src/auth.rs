//! API authentication via bearer tokens.
//!
//! The token from `Authorization: Bearer <token>` is checked by an
//! [`IdentityVerifier`]. Production uses the external identity provider;
//! development may run without one, in which case the token itself (or
//! `anonymous`) becomes the caller's identity.

use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{debug, warn};

use parley_core::config::AuthConfig;
use parley_core::types::UserIdentity;

use crate::error::ApiError;
use crate::state::AppState;

/// Identity used in no-auth mode when no token is sent.
pub const ANONYMOUS: &str = "anonymous";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingToken,
    #[error("Invalid Authorization header")]
    InvalidHeader,
    #[error("Invalid authentication credentials")]
    Rejected,
    #[error("identity provider error: {0}")]
    Provider(String),
}

/// Resolves a bearer token to the caller's identity.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: Option<&str>) -> Result<UserIdentity, AuthError>;
}

/// Development mode: no provider, tokens are taken at face value.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAuthVerifier;

#[async_trait]
impl IdentityVerifier for NoAuthVerifier {
    async fn verify(&self, token: Option<&str>) -> Result<UserIdentity, AuthError> {
        Ok(match token.map(str::trim) {
            Some(token) if !token.is_empty() => UserIdentity::new(token),
            _ => UserIdentity::new(ANONYMOUS),
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateResponse {
    user_id: Option<String>,
    sub: Option<String>,
}

/// Validates session tokens against the external identity provider.
#[derive(Debug, Clone)]
pub struct ProviderVerifier {
    client: reqwest::Client,
    project_id: String,
    validate_url: String,
}

impl ProviderVerifier {
    pub fn new(client: reqwest::Client, project_id: impl Into<String>, base_uri: &str) -> Self {
        Self {
            client,
            project_id: project_id.into(),
            validate_url: format!("{}/v1/auth/validate", base_uri.trim_end_matches('/')),
        }
    }

    /// Build the verifier for `config`, or `None` in no-auth mode.
    pub fn from_config(client: reqwest::Client, config: &AuthConfig) -> Option<Self> {
        config
            .project_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(|id| Self::new(client, id, &config.base_uri))
    }
}

#[async_trait]
impl IdentityVerifier for ProviderVerifier {
    async fn verify(&self, token: Option<&str>) -> Result<UserIdentity, AuthError> {
        let token = token.filter(|t| !t.is_empty()).ok_or(AuthError::MissingToken)?;

        let response = self
            .client
            .post(&self.validate_url)
            .bearer_auth(format!("{}:{}", self.project_id, token))
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AuthError::Rejected);
        }
        if !status.is_success() {
            return Err(AuthError::Provider(format!("HTTP {}", status)));
        }

        let body: ValidateResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Provider(format!("invalid response: {}", e)))?;
        let subject = body
            .user_id
            .or(body.sub)
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::Rejected)?;

        debug!(user = %subject, "Session validated");
        Ok(UserIdentity::new(subject))
    }
}

/// Extract the bearer token, if any.
fn bearer_token(req: &Request) -> Result<Option<&str>, AuthError> {
    let Some(value) = req.headers().get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| AuthError::InvalidHeader)?;
    value
        .strip_prefix("Bearer ")
        .map(|t| Some(t.trim()))
        .ok_or(AuthError::InvalidHeader)
}

/// Middleware that authenticates the caller and stores the resulting
/// [`UserIdentity`] in request extensions. Returns 401 on failure.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    // Owned copy: the request body is not `Sync`, so no borrow may cross the await.
    let token = bearer_token(&req).map(|t| t.map(str::to_owned));
    let verified = match token {
        Ok(token) => state.verifier.verify(token.as_deref()).await,
        Err(e) => Err(e),
    };

    match verified {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(e) => {
            if let AuthError::Provider(detail) = &e {
                warn!(error = %detail, "Identity provider call failed");
                return ApiError::Unauthorized(AuthError::Rejected.to_string()).into_response();
            }
            ApiError::Unauthorized(e.to_string()).into_response()
        }
    }
}
