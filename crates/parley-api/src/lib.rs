//! Parley API crate - axum HTTP server for the chat backend.
//!
//! Provides authenticated conversation and chat-turn endpoints, a public
//! health check, rate limiting and a uniform JSON error envelope.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use auth::{IdentityVerifier, NoAuthVerifier, ProviderVerifier};
pub use error::ApiError;
pub use routes::{create_router, start_server, API_PREFIX};
pub use state::AppState;
