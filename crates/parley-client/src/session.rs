//! Client-side mirror of the user's conversations.
//!
//! The mirror is a cache: it shows the user's own message immediately, lets
//! replies land in the conversation they were sent from, and is reconciled
//! from server listings. The server stays authoritative.
//!
//! Sending is split into [`ChatSession::begin_send`] and
//! [`ChatSession::complete`]. `complete` consumes the [`PendingSend`], so
//! every send is completed exactly once, success or failure.

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use parley_core::types::{Role, DEFAULT_TITLE};

use crate::error::ClientError;
use crate::transport::{ChatTransport, RemoteConversation, RemoteMessage, SendReply};

pub const DEFAULT_WELCOME: &str = "Hello! How can I help you today?";
pub const DEFAULT_ERROR_TEXT: &str = "Sorry, something went wrong. Please try again.";

#[derive(Clone, Debug, PartialEq)]
pub struct LocalMessage {
    pub role: Role,
    pub text: String,
    pub is_error: bool,
    pub created_at: DateTime<Utc>,
    /// Server id, once known.
    pub server_id: Option<Uuid>,
}

impl LocalMessage {
    fn new(role: Role, text: impl Into<String>, is_error: bool) -> Self {
        Self {
            role,
            text: text.into(),
            is_error,
            created_at: Utc::now(),
            server_id: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LocalConversation {
    pub local_id: Uuid,
    /// `None` until the first reply for a locally synthesized conversation.
    pub server_id: Option<Uuid>,
    pub title: String,
    pub messages: Vec<LocalMessage>,
    in_flight: bool,
}

impl LocalConversation {
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }
}

/// A send that has been shown locally and awaits its server reply.
#[derive(Debug)]
#[must_use = "a pending send must be passed to ChatSession::complete"]
pub struct PendingSend {
    local_id: Uuid,
    server_id: Option<Uuid>,
    text: String,
}

impl PendingSend {
    pub fn local_id(&self) -> Uuid {
        self.local_id
    }

    pub fn server_id(&self) -> Option<Uuid> {
        self.server_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// How a send ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// The server replied; `is_error` mirrors a server-side orchestration failure.
    Delivered { local_id: Uuid, is_error: bool },
    /// The request failed; the fixed error message was appended.
    Failed { local_id: Uuid, error: ClientError },
    /// The conversation was deleted locally before the reply arrived.
    Discarded { local_id: Uuid },
}

#[derive(Debug)]
pub struct ChatSession {
    conversations: Vec<LocalConversation>,
    active: Uuid,
    welcome: String,
    error_text: String,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new(DEFAULT_WELCOME, DEFAULT_ERROR_TEXT)
    }
}

impl ChatSession {
    /// New session holding one local-only conversation with the welcome message.
    pub fn new(welcome: impl Into<String>, error_text: impl Into<String>) -> Self {
        let mut session = Self {
            conversations: Vec::new(),
            active: Uuid::nil(),
            welcome: welcome.into(),
            error_text: error_text.into(),
        };
        session.new_conversation();
        session
    }

    /// Conversations, newest first.
    pub fn conversations(&self) -> &[LocalConversation] {
        &self.conversations
    }

    pub fn active(&self) -> &LocalConversation {
        // `active` always names an existing conversation; see `ensure_selection`.
        self.conversations
            .iter()
            .find(|c| c.local_id == self.active)
            .unwrap_or(&self.conversations[0])
    }

    pub fn get(&self, local_id: Uuid) -> Option<&LocalConversation> {
        self.conversations.iter().find(|c| c.local_id == local_id)
    }

    fn get_mut(&mut self, local_id: Uuid) -> Option<&mut LocalConversation> {
        self.conversations.iter_mut().find(|c| c.local_id == local_id)
    }

    /// Input is disabled while the active conversation awaits a reply.
    pub fn is_input_enabled(&self) -> bool {
        !self.active().in_flight
    }

    /// Synthesize a local-only conversation and select it.
    pub fn new_conversation(&mut self) -> Uuid {
        let local_id = Uuid::new_v4();
        self.conversations.insert(
            0,
            LocalConversation {
                local_id,
                server_id: None,
                title: DEFAULT_TITLE.to_string(),
                messages: vec![LocalMessage::new(Role::Assistant, self.welcome.clone(), false)],
                in_flight: false,
            },
        );
        self.active = local_id;
        local_id
    }

    pub fn select(&mut self, local_id: Uuid) -> Result<(), ClientError> {
        if self.get(local_id).is_none() {
            return Err(ClientError::UnknownConversation);
        }
        self.active = local_id;
        Ok(())
    }

    /// Remove a conversation locally.
    ///
    /// When it was active, the next conversation in the list (or the previous
    /// one at the end) becomes active; with none left a fresh one is made.
    pub fn delete(&mut self, local_id: Uuid) -> Result<LocalConversation, ClientError> {
        let index = self
            .conversations
            .iter()
            .position(|c| c.local_id == local_id)
            .ok_or(ClientError::UnknownConversation)?;
        let removed = self.conversations.remove(index);

        if self.active == local_id {
            let next = self
                .conversations
                .get(index)
                .or_else(|| index.checked_sub(1).and_then(|i| self.conversations.get(i)))
                .map(|c| c.local_id);
            match next {
                Some(next) => self.active = next,
                None => {
                    self.new_conversation();
                }
            }
        }
        Ok(removed)
    }

    /// Show the user's message and mark the active conversation busy.
    pub fn begin_send(&mut self, text: &str) -> Result<PendingSend, ClientError> {
        if text.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        let active = self.active;
        let conversation = self.get_mut(active).ok_or(ClientError::UnknownConversation)?;
        if conversation.in_flight {
            return Err(ClientError::SendInFlight);
        }

        conversation
            .messages
            .push(LocalMessage::new(Role::User, text, false));
        conversation.in_flight = true;

        Ok(PendingSend {
            local_id: conversation.local_id,
            server_id: conversation.server_id,
            text: text.to_string(),
        })
    }

    /// Apply the result of a send to the conversation it was sent from.
    pub fn complete(
        &mut self,
        pending: PendingSend,
        result: Result<SendReply, ClientError>,
    ) -> SendOutcome {
        let local_id = pending.local_id;
        let error_text = self.error_text.clone();
        if self.get(local_id).is_none() {
            debug!(local_id = %local_id, "Reply for deleted conversation dropped");
            return SendOutcome::Discarded { local_id };
        }
        if let Ok(reply) = &result {
            self.drop_duplicates(local_id, reply.conversation_id);
        }
        let Some(conversation) = self.get_mut(local_id) else {
            return SendOutcome::Discarded { local_id };
        };
        conversation.in_flight = false;

        match result {
            Ok(reply) => {
                conversation.server_id = Some(reply.conversation_id);
                if let Some(title) = reply.title {
                    conversation.title = title;
                }
                let mut message = LocalMessage::new(Role::Assistant, reply.message, reply.is_error);
                message.server_id = Some(reply.message_id);
                conversation.messages.push(message);
                SendOutcome::Delivered {
                    local_id,
                    is_error: reply.is_error,
                }
            }
            Err(error) => {
                warn!(local_id = %local_id, error = %error, "Send failed");
                conversation
                    .messages
                    .push(LocalMessage::new(Role::Assistant, error_text, true));
                SendOutcome::Failed { local_id, error }
            }
        }
    }

    /// Merge a server listing into the mirror.
    ///
    /// Server titles win. Conversations the server no longer reports are
    /// dropped unless a send is in flight; local-only ones are kept.
    /// New server conversations are added with no messages loaded.
    pub fn reconcile(&mut self, remote: Vec<RemoteConversation>) {
        let mut merged: Vec<LocalConversation> = Vec::with_capacity(remote.len());
        let mut previous = std::mem::take(&mut self.conversations);

        // Local-only and busy conversations keep their place at the top.
        previous.retain(|c| {
            let keep = c.server_id.is_none()
                || (c.in_flight && !remote.iter().any(|r| Some(r.id) == c.server_id));
            if keep {
                merged.push(c.clone());
            }
            !keep
        });

        for r in remote {
            match previous.iter().position(|c| c.server_id == Some(r.id)) {
                Some(i) => {
                    let mut existing = previous.swap_remove(i);
                    if !existing.in_flight {
                        existing.title = r.title;
                    }
                    merged.push(existing);
                }
                None => merged.push(LocalConversation {
                    local_id: Uuid::new_v4(),
                    server_id: Some(r.id),
                    title: r.title,
                    messages: Vec::new(),
                    in_flight: false,
                }),
            }
        }

        self.conversations = merged;
        self.ensure_selection();
    }

    /// Replace a conversation's messages with the server's log.
    ///
    /// Skipped while a send is in flight, since the optimistic message
    /// would be lost. Returns whether the messages were replaced.
    pub fn apply_messages(&mut self, local_id: Uuid, messages: Vec<RemoteMessage>) -> bool {
        let Some(conversation) = self.get_mut(local_id) else {
            return false;
        };
        if conversation.in_flight {
            return false;
        }
        conversation.messages = messages
            .into_iter()
            .map(|m| LocalMessage {
                role: m.role,
                text: m.content,
                is_error: m.is_error,
                created_at: m.created_at,
                server_id: Some(m.id),
            })
            .collect();
        true
    }

    /// A listing refreshed mid-send can already hold the server's copy of the
    /// conversation a first send created. The originating entry replaces it.
    fn drop_duplicates(&mut self, local_id: Uuid, server_id: Uuid) {
        let before = self.conversations.len();
        self.conversations
            .retain(|c| c.local_id == local_id || c.server_id != Some(server_id));
        if self.conversations.len() != before {
            debug!(local_id = %local_id, server_id = %server_id, "Merged duplicate conversation");
            if self.get(self.active).is_none() {
                self.active = local_id;
            }
        }
    }

    fn ensure_selection(&mut self) {
        if self.conversations.is_empty() {
            self.new_conversation();
        } else if self.get(self.active).is_none() {
            self.active = self.conversations[0].local_id;
        }
    }
}

/// Send `text` from the active conversation.
///
/// The session lock is released while the request is in flight, so the UI
/// can switch conversations meanwhile.
pub async fn send(
    session: &Mutex<ChatSession>,
    transport: &dyn ChatTransport,
    text: &str,
) -> Result<SendOutcome, ClientError> {
    let pending = session.lock().await.begin_send(text)?;
    let result = transport.send(pending.server_id(), pending.text()).await;
    Ok(session.lock().await.complete(pending, result))
}

/// Refresh the conversation list from the server.
pub async fn refresh(
    session: &Mutex<ChatSession>,
    transport: &dyn ChatTransport,
) -> Result<(), ClientError> {
    let remote = transport.list_conversations().await?;
    session.lock().await.reconcile(remote);
    Ok(())
}

/// Select a conversation and load its messages from the server.
pub async fn open(
    session: &Mutex<ChatSession>,
    transport: &dyn ChatTransport,
    local_id: Uuid,
) -> Result<(), ClientError> {
    let server_id = {
        let mut session = session.lock().await;
        session.select(local_id)?;
        session.get(local_id).and_then(|c| c.server_id)
    };
    if let Some(server_id) = server_id {
        let messages = transport.list_messages(server_id).await?;
        session.lock().await.apply_messages(local_id, messages);
    }
    Ok(())
}

/// Delete a conversation locally and, when it exists there, on the server.
pub async fn delete(
    session: &Mutex<ChatSession>,
    transport: &dyn ChatTransport,
    local_id: Uuid,
) -> Result<(), ClientError> {
    let removed = session.lock().await.delete(local_id)?;
    if let Some(server_id) = removed.server_id {
        transport.delete_conversation(server_id).await?;
    }
    Ok(())
}
