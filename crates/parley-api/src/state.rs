//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use parley_chat::ChatService;
use parley_core::config::ParleyConfig;

use crate::auth::IdentityVerifier;

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks. The
/// configuration is read-only for the lifetime of the process.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ParleyConfig>,
    pub chat: ChatService,
    pub verifier: Arc<dyn IdentityVerifier>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: ParleyConfig,
        chat: ChatService,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            chat,
            verifier,
            start_time: Instant::now(),
        }
    }
}
