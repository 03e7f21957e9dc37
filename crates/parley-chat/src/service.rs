//! Chat service: validates input, serializes turns per conversation, calls
//! the orchestrator under a deadline and persists both sides of the turn.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use parley_agent::AgentOrchestrator;
use parley_core::config::ChatConfig;
use parley_core::types::{derive_title, Conversation, Message, MessageContent, Role, UserIdentity};
use parley_storage::ConversationStore;

use crate::error::ChatError;
use crate::turn::{TurnLocks, TurnState};

/// Result of one completed turn.
#[derive(Clone, Debug)]
pub struct TurnOutcome {
    pub conversation_id: Uuid,
    pub user_message: Message,
    pub assistant_message: Message,
    /// Set only when this turn renamed the conversation.
    pub title: Option<String>,
}

/// A freshly created conversation and its greeting.
#[derive(Clone, Debug)]
pub struct CreatedConversation {
    pub conversation: Conversation,
    pub greeting: Message,
}

/// Coordinates conversation storage and the agent orchestrator.
///
/// Cheap to clone; clones share the store, orchestrator and turn locks.
#[derive(Clone)]
pub struct ChatService {
    store: ConversationStore,
    orchestrator: Arc<dyn AgentOrchestrator>,
    config: Arc<ChatConfig>,
    timeout: Duration,
    locks: Arc<TurnLocks>,
}

impl ChatService {
    pub fn new(
        store: ConversationStore,
        orchestrator: Arc<dyn AgentOrchestrator>,
        config: ChatConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            orchestrator,
            config: Arc::new(config),
            timeout,
            locks: Arc::new(TurnLocks::new()),
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Conversations with a turn in progress or queued.
    pub fn active_turns(&self) -> usize {
        self.locks.active()
    }

    /// Handle one user message.
    ///
    /// Without `conversation_id` a new conversation is created first. The turn
    /// itself runs on a detached task: dropping the returned future (for
    /// example on client disconnect) does not cancel it.
    pub async fn send_message(
        &self,
        conversation_id: Option<Uuid>,
        user: &UserIdentity,
        text: &str,
    ) -> Result<TurnOutcome, ChatError> {
        self.validate(text)?;

        let conversation = match conversation_id {
            Some(id) => self.store.get_conversation(id, user.as_str())?,
            None => {
                let conversation = self
                    .store
                    .create_conversation(user.as_str(), &self.config.welcome_message)?;
                info!(conversation_id = %conversation.id, owner = %user, "Conversation created for first message");
                conversation
            }
        };

        let this = self.clone();
        let text = text.to_string();
        tokio::spawn(async move { this.run_turn(conversation.id, text).await })
            .await
            .map_err(|e| ChatError::Internal(format!("turn task failed: {}", e)))?
    }

    /// Create an empty conversation holding only the greeting.
    pub fn create_conversation(&self, user: &UserIdentity) -> Result<CreatedConversation, ChatError> {
        let conversation = self
            .store
            .create_conversation(user.as_str(), &self.config.welcome_message)?;
        let greeting = self
            .store
            .list_messages(conversation.id)?
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::Internal("conversation created without greeting".to_string()))?;
        info!(conversation_id = %conversation.id, owner = %user, "Conversation created");
        Ok(CreatedConversation {
            conversation,
            greeting,
        })
    }

    pub fn list_conversations(&self, user: &UserIdentity) -> Result<Vec<Conversation>, ChatError> {
        Ok(self.store.list_conversations(user.as_str())?)
    }

    /// Ordered messages of a conversation owned by `user`.
    pub fn list_messages(
        &self,
        conversation_id: Uuid,
        user: &UserIdentity,
    ) -> Result<Vec<Message>, ChatError> {
        self.store.get_conversation(conversation_id, user.as_str())?;
        Ok(self.store.list_messages(conversation_id)?)
    }

    /// Delete a conversation, waiting for any running turn on it to finish.
    pub async fn delete_conversation(
        &self,
        conversation_id: Uuid,
        user: &UserIdentity,
    ) -> Result<(), ChatError> {
        let _turn = self.locks.acquire(conversation_id).await;
        self.store.delete_conversation(conversation_id, user.as_str())?;
        info!(conversation_id = %conversation_id, owner = %user, "Conversation deleted");
        Ok(())
    }

    fn validate(&self, text: &str) -> Result<(), ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if text.chars().count() > self.config.max_message_chars {
            return Err(ChatError::MessageTooLong(self.config.max_message_chars));
        }
        Ok(())
    }

    /// Best effort: keep the recorded user message from being left unanswered.
    fn record_error_reply(&self, conversation_id: Uuid) {
        let content = MessageContent::text(self.config.error_message.as_str());
        match self
            .store
            .append_message(conversation_id, Role::Assistant, &content, true)
        {
            Ok(_) => trace_state(conversation_id, TurnState::ErrorMessageRecorded),
            Err(e) => {
                error!(conversation_id = %conversation_id, error = %e, "Could not record error reply")
            }
        }
        trace_state(conversation_id, TurnState::Idle);
    }

    async fn run_turn(&self, conversation_id: Uuid, text: String) -> Result<TurnOutcome, ChatError> {
        let _turn = self.locks.acquire(conversation_id).await;
        let started = Instant::now();

        let prior_user_messages = self.store.count_user_messages(conversation_id)?;
        let user_message = self.store.append_message(
            conversation_id,
            Role::User,
            &MessageContent::text(text.as_str()),
            false,
        )?;
        trace_state(conversation_id, TurnState::UserMessageRecorded);

        // A failed rename never blocks the reply.
        let title = if prior_user_messages == 0 {
            let title = derive_title(&text, self.config.title_max_chars);
            match self.store.set_title_if_default(conversation_id, &title) {
                Ok(renamed) => renamed.then_some(title),
                Err(e) => {
                    warn!(conversation_id = %conversation_id, error = %e, "Title update failed");
                    None
                }
            }
        } else {
            None
        };

        let history = match self.store.list_messages(conversation_id) {
            Ok(history) => history,
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "History load failed");
                self.record_error_reply(conversation_id);
                return Err(ChatError::after_input(e));
            }
        };

        trace_state(conversation_id, TurnState::OrchestratorInvoked);
        let (content, is_error) =
            match tokio::time::timeout(self.timeout, self.orchestrator.run(&history)).await {
                Ok(Ok(content)) => (content, false),
                Ok(Err(e)) => {
                    warn!(conversation_id = %conversation_id, error = %e, "Orchestration failed");
                    (MessageContent::text(self.config.error_message.as_str()), true)
                }
                Err(_) => {
                    warn!(
                        conversation_id = %conversation_id,
                        timeout_secs = self.timeout.as_secs_f64(),
                        "Orchestration timed out"
                    );
                    (MessageContent::text(self.config.error_message.as_str()), true)
                }
            };

        let assistant_message = self
            .store
            .append_message(conversation_id, Role::Assistant, &content, is_error)
            .map_err(ChatError::after_input)?;
        trace_state(
            conversation_id,
            if is_error {
                TurnState::ErrorMessageRecorded
            } else {
                TurnState::AssistantMessageRecorded
            },
        );

        info!(
            conversation_id = %conversation_id,
            is_error,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Turn complete"
        );
        trace_state(conversation_id, TurnState::Idle);

        Ok(TurnOutcome {
            conversation_id,
            user_message,
            assistant_message,
            title,
        })
    }
}

fn trace_state(conversation_id: Uuid, state: TurnState) {
    debug!(conversation_id = %conversation_id, state = %state, "Turn state");
}
