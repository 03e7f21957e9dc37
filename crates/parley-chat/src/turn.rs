//! Per-conversation turn serialization.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Lifecycle of a single turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    UserMessageRecorded,
    OrchestratorInvoked,
    AssistantMessageRecorded,
    ErrorMessageRecorded,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnState::Idle => "idle",
            TurnState::UserMessageRecorded => "user_message_recorded",
            TurnState::OrchestratorInvoked => "orchestrator_invoked",
            TurnState::AssistantMessageRecorded => "assistant_message_recorded",
            TurnState::ErrorMessageRecorded => "error_message_recorded",
        };
        f.write_str(s)
    }
}

type Slot = Arc<AsyncMutex<()>>;

/// One async mutex per conversation with an active or waiting turn.
///
/// Slots are cloned only under the map lock, so a slot whose only reference
/// is the map is idle. Idle slots are removed when the last guard drops and
/// swept on the next `acquire`.
#[derive(Debug, Default)]
pub struct TurnLocks {
    slots: Mutex<HashMap<Uuid, Slot>>,
}

impl TurnLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other turn runs for `conversation_id`.
    pub async fn acquire(&self, conversation_id: Uuid) -> TurnGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            // A waiter cancelled after its guard dropped leaves an orphan slot.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots.entry(conversation_id).or_default().clone()
        };
        let guard = slot.lock_owned().await;
        TurnGuard {
            locks: self,
            conversation_id,
            guard: Some(guard),
        }
    }

    /// Conversations currently holding or awaiting a lock.
    pub fn active(&self) -> usize {
        self.slots
            .lock()
            .map(|slots| slots.values().filter(|s| Arc::strong_count(s) > 1).count())
            .unwrap_or(0)
    }
}

/// Exclusive access to one conversation for the lifetime of a turn.
pub struct TurnGuard<'a> {
    locks: &'a TurnLocks,
    conversation_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        let mut slots = self.locks.slots.lock().unwrap_or_else(|e| e.into_inner());
        // Release first so the count below only sees the map and any waiters.
        self.guard.take();
        if let Some(slot) = slots.get(&self.conversation_id) {
            if Arc::strong_count(slot) == 1 {
                slots.remove(&self.conversation_id);
            }
        }
    }
}
