//! Message revision controller.
//!
//! Edit, regenerate, switch-version and delete-and-following on messages the
//! server already confirmed. Every operation snapshots the conversation,
//! applies its change locally, calls the server, then refetches the detail or
//! puts the snapshot back.

use chrono::Utc;
use nutri_core::age::{AgeContext, can_send};
use nutri_core::conversation::{Message, MessageId, MessageRole};
use nutri_core::error::{NutriError, Result, ValidationError};

use crate::in_flight::{InFlightGuard, InFlightRegistry};
use crate::state::ConversationKey;
use crate::sync::ConversationSync;
use crate::temp_id::next_temp_id;

pub struct RevisionController {
    sync: ConversationSync,
    in_flight: InFlightRegistry,
}

impl RevisionController {
    pub(crate) fn new(sync: ConversationSync, in_flight: InFlightRegistry) -> Self {
        Self { sync, in_flight }
    }

    /// Rewrites a user message and discards everything after it.
    ///
    /// The truncation is irreversible once the server accepted the edit.
    pub async fn edit(&self, key: &ConversationKey, message_id: &str, new_content: &str) -> Result<()> {
        let content = new_content.trim();
        if content.is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }
        let (conversation_id, _guard) = self.begin(key)?;
        let before = self.sync.snapshot(key).await?;
        let (_, message) = before.find_server_message(message_id)?;
        if message.role != MessageRole::User {
            return Err(ValidationError::NotUserMessage(message_id.to_string()).into());
        }

        let target = MessageId::server(message_id);
        let placeholder = MessageId::temp(next_temp_id());
        self.sync
            .update(key, |conversation| -> Result<()> {
                let index = conversation
                    .position_of(&target)
                    .ok_or_else(|| NutriError::not_found("Message", message_id))?;
                conversation.truncate_after(index);
                conversation.messages[index].apply_edit(content);
                conversation
                    .messages
                    .push(Message::bot_placeholder(placeholder.as_str(), Utc::now()));
                Ok(())
            })
            .await
            .transpose()?;

        match self
            .sync
            .service()
            .edit_message(conversation_id, message_id, content)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    "[Revision] Edited message {} in {}",
                    message_id,
                    conversation_id
                );
                self.sync.refetch_or_settle(key, conversation_id).await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("[Revision] Edit of {} failed, restoring: {}", message_id, e);
                self.sync.restore(key, before).await;
                Err(e)
            }
        }
    }

    /// Selects another version of a message. Returns `false` without any
    /// request when `version` is already selected.
    pub async fn switch_version(
        &self,
        key: &ConversationKey,
        message_id: &str,
        version: usize,
    ) -> Result<bool> {
        let (conversation_id, _guard) = self.begin(key)?;
        let before = self.sync.snapshot(key).await?;
        let (_, message) = before.find_server_message(message_id)?;
        message.check_version(version)?;
        if message.current_version_index == version {
            tracing::debug!(
                "[Revision] Version {} of {} already selected",
                version,
                message_id
            );
            return Ok(false);
        }

        let target = MessageId::server(message_id);
        self.sync
            .update(key, |conversation| match conversation.message_mut(&target) {
                Some(message) => message.select_version(version),
                None => Err(NutriError::not_found("Message", message_id)),
            })
            .await
            .transpose()?;

        match self
            .sync
            .service()
            .switch_version(conversation_id, message_id, version)
            .await
        {
            Ok(()) => {
                self.sync.refetch_or_settle(key, conversation_id).await;
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(
                    "[Revision] Switching {} to version {} failed, restoring: {}",
                    message_id,
                    version,
                    e
                );
                self.sync.restore(key, before).await;
                Err(e)
            }
        }
    }

    /// Asks for a new version of a bot message.
    ///
    /// On failure the message is settled back to its last committed content
    /// and the detail is refetched, whether or not the conversation is still
    /// active.
    pub async fn regenerate(
        &self,
        key: &ConversationKey,
        message_id: &str,
        session_age: Option<AgeContext>,
    ) -> Result<()> {
        let (conversation_id, _guard) = self.begin(key)?;
        let before = self.sync.snapshot(key).await?;
        let (_, message) = before.find_server_message(message_id)?;
        if message.role != MessageRole::Bot {
            return Err(ValidationError::NotBotMessage(message_id.to_string()).into());
        }
        let age = can_send(&before, session_age).into_result()?;

        let target = MessageId::server(message_id);
        self.sync
            .update(key, |conversation| {
                if let Some(message) = conversation.message_mut(&target) {
                    message.begin_regenerate();
                }
            })
            .await;

        match self
            .sync
            .service()
            .regenerate(conversation_id, message_id, age)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    "[Revision] Regenerated message {} for age {}",
                    message_id,
                    age
                );
                self.sync.refetch_or_settle(key, conversation_id).await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    "[Revision] Regenerate of {} failed, restoring last good state: {}",
                    message_id,
                    e
                );
                self.sync
                    .update(key, |conversation| {
                        if let Some(message) = conversation.message_mut(&target) {
                            message.settle();
                        }
                    })
                    .await;
                self.sync.refetch_or_settle(key, conversation_id).await;
                Err(e)
            }
        }
    }

    /// Removes a message and everything after it. Returns the number of
    /// messages removed locally.
    pub async fn delete_and_following(&self, key: &ConversationKey, message_id: &str) -> Result<usize> {
        let (conversation_id, _guard) = self.begin(key)?;
        let before = self.sync.snapshot(key).await?;
        before.find_server_message(message_id)?;

        let target = MessageId::server(message_id);
        let removed = self
            .sync
            .update(key, |conversation| {
                conversation
                    .position_of(&target)
                    .map(|index| conversation.truncate_from(index).len())
                    .unwrap_or_default()
            })
            .await
            .unwrap_or_default();

        match self
            .sync
            .service()
            .delete_and_following(conversation_id, message_id)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    "[Revision] Deleted {} message(s) from {}",
                    removed,
                    conversation_id
                );
                self.sync.refetch_or_settle(key, conversation_id).await;
                Ok(removed)
            }
            Err(e) => {
                tracing::warn!(
                    "[Revision] Delete from {} failed, restoring {} message(s): {}",
                    message_id,
                    removed,
                    e
                );
                self.sync.restore(key, before).await;
                Err(e)
            }
        }
    }

    /// Resolves the server id and claims the conversation's operation slot.
    fn begin<'k>(&self, key: &'k ConversationKey) -> Result<(&'k str, InFlightGuard)> {
        let conversation_id = key
            .server_id()
            .ok_or(NutriError::Validation(ValidationError::UnsavedConversation))?;
        let guard = self
            .in_flight
            .try_begin(key.to_string())
            .ok_or_else(|| NutriError::Busy(key.to_string()))?;
        Ok((conversation_id, guard))
    }
}
