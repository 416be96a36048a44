//! Conversation sync helper for the "mutate locally → call → refetch" pattern.
//!
//! `ConversationSync` wraps the shared state and the chat service and offers
//! the steps every optimistic operation is built from:
//! 1. Snapshot the conversation before touching it
//! 2. Apply an optimistic local change
//! 3. Refetch the authoritative detail on success
//! 4. Restore the snapshot on failure

use nutri_core::conversation::{ChatService, Conversation};
use nutri_core::error::{NutriError, Result};
use std::sync::Arc;

use crate::state::{ConversationKey, SharedState};

#[derive(Clone)]
pub(crate) struct ConversationSync {
    service: Arc<dyn ChatService>,
    state: SharedState,
}

impl ConversationSync {
    pub fn new(service: Arc<dyn ChatService>, state: SharedState) -> Self {
        Self { service, state }
    }

    pub fn service(&self) -> &Arc<dyn ChatService> {
        &self.service
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Clones the current local copy of the conversation.
    pub async fn snapshot(&self, key: &ConversationKey) -> Result<Conversation> {
        let state = self.state.read().await;
        state
            .conversation(key)
            .cloned()
            .ok_or_else(|| NutriError::not_found("Conversation", key.to_string()))
    }

    /// Applies `updater` to the local copy, wherever it currently lives.
    ///
    /// Returns `None` if the store no longer holds the conversation.
    pub async fn update<F, R>(&self, key: &ConversationKey, updater: F) -> Option<R>
    where
        F: FnOnce(&mut Conversation) -> R,
    {
        let mut state = self.state.write().await;
        state.conversation_mut(key).map(updater)
    }

    /// Puts a snapshot back in place of the local copy.
    pub async fn restore(&self, key: &ConversationKey, snapshot: Conversation) {
        let mut state = self.state.write().await;
        match state.conversation_mut(key) {
            Some(conversation) => *conversation = snapshot,
            None => tracing::debug!(
                "[ConversationSync] {} no longer held, skipping restore",
                key
            ),
        }
    }

    /// Fetches the authoritative detail and applies it.
    ///
    /// Returns `true` if `key` was still active and the detail replaced the
    /// active slot.
    pub async fn refetch(&self, key: &ConversationKey, conversation_id: &str) -> Result<bool> {
        tracing::debug!("[ConversationSync] Refetching {} as {}", key, conversation_id);
        let detail = self.service.get_conversation(conversation_id).await?;
        let mut state = self.state.write().await;
        let applied = state.apply_detail(key, detail);
        if !applied {
            tracing::debug!(
                "[ConversationSync] {} is no longer active, cached detail only",
                key
            );
        }
        Ok(applied)
    }

    /// Refetches; if that fails, settles local in-flight flags instead so no
    /// message stays pending or regenerating.
    pub async fn refetch_or_settle(&self, key: &ConversationKey, conversation_id: &str) -> bool {
        match self.refetch(key, conversation_id).await {
            Ok(applied) => applied,
            Err(e) => {
                tracing::warn!(
                    "[ConversationSync] Refetch of {} failed, keeping local state: {}",
                    conversation_id,
                    e
                );
                let mut state = self.state.write().await;
                if let Some(conversation) = state.conversation_mut(key) {
                    conversation.settle_messages();
                }
                state.invalidate_summaries();
                state.is_active(key)
            }
        }
    }
}
