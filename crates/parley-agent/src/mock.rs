//! Deterministic orchestrator for tests and local runs without a runtime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use parley_core::types::{Message, MessageContent, Role};

use crate::error::AgentError;
use crate::orchestrator::AgentOrchestrator;

#[derive(Debug, Clone)]
enum Mode {
    Echo,
    Fixed(MessageContent),
    Fail,
}

/// Orchestrator that answers without any network calls.
///
/// `echo` replies with `Echo: <last user text>`, `fixed` always returns the
/// same content and `failing` always errors. An optional delay is applied
/// before answering.
#[derive(Debug)]
pub struct MockOrchestrator {
    mode: Mode,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockOrchestrator {
    pub fn echo() -> Self {
        Self::with_mode(Mode::Echo)
    }

    pub fn fixed(content: MessageContent) -> Self {
        Self::with_mode(Mode::Fixed(content))
    }

    pub fn failing() -> Self {
        Self::with_mode(Mode::Fail)
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `run` invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentOrchestrator for MockOrchestrator {
    async fn run(&self, history: &[Message]) -> Result<MessageContent, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.mode {
            Mode::Echo => {
                let last = history
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.as_text())
                    .unwrap_or_default();
                Ok(MessageContent::text(format!("Echo: {}", last)))
            }
            Mode::Fixed(content) => Ok(content.clone()),
            Mode::Fail => Err(AgentError::Transport("mock failure".to_string())),
        }
    }
}
