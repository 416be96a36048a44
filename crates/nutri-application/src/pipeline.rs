//! Optimistic message pipeline.
//!
//! Sends a user message: the transcript shows the user entry and a bot
//! placeholder immediately, then either the authoritative detail replaces
//! them or they are removed again.

use chrono::Utc;
use nutri_core::age::{AgeContext, can_send};
use nutri_core::conversation::{ChatReply, ChatRequest, Conversation, Message, MessageId, derive_title};
use nutri_core::error::{NutriError, Result, ValidationError};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinSet;

use crate::in_flight::InFlightRegistry;
use crate::state::ConversationKey;
use crate::sync::ConversationSync;
use crate::temp_id::next_temp_id;

/// Result of a successful submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub conversation_id: String,
    /// Set when a draft was saved and is still active: the caller should
    /// navigate to this id.
    pub navigate_to: Option<String>,
    pub reply: Option<String>,
}

/// Temp entries appended for one submit.
struct PendingPair {
    user: MessageId,
    bot: MessageId,
}

impl PendingPair {
    fn ids(&self) -> [MessageId; 2] {
        [self.user.clone(), self.bot.clone()]
    }
}

pub struct OptimisticPipeline {
    sync: ConversationSync,
    in_flight: InFlightRegistry,
    /// Detached title renames.
    background: Arc<Mutex<JoinSet<()>>>,
}

impl OptimisticPipeline {
    pub(crate) fn new(sync: ConversationSync, in_flight: InFlightRegistry) -> Self {
        Self {
            sync,
            in_flight,
            background: Arc::default(),
        }
    }

    /// Waits for every detached task started so far.
    pub async fn flush(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *lock(&self.background));
            if tasks.is_empty() {
                return;
            }
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::warn!("[Pipeline] Background task failed: {}", e);
                }
            }
        }
    }

    /// Submits `content` to the conversation identified by `key`.
    ///
    /// # Errors
    ///
    /// - `Validation` / `AgeMismatch`: nothing was mutated or sent
    /// - `Busy`: another transcript operation is running for this conversation
    /// - `Network` / `Server`: the temp entries were removed again
    pub async fn submit(&self, key: &ConversationKey, content: &str) -> Result<SubmitOutcome> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }

        let _guard = self
            .in_flight
            .try_begin(key.to_string())
            .ok_or_else(|| NutriError::Busy(key.to_string()))?;

        let (before, age) = {
            let state = self.sync.state().read().await;
            let conversation = state
                .conversation(key)
                .ok_or_else(|| NutriError::not_found("Conversation", key.to_string()))?;
            let age = can_send(conversation, state.session_age).into_result()?;
            (conversation.clone(), age)
        };

        let pair = PendingPair {
            user: MessageId::temp(next_temp_id()),
            bot: MessageId::temp(next_temp_id()),
        };
        let title = (!before.is_saved() && !before.has_messages()).then(|| derive_title(content));

        self.append_pending(key, content, age, &pair, title.as_deref())
            .await?;
        tracing::debug!(
            "[Pipeline] Appended pending pair {} / {} to {}",
            pair.user,
            pair.bot,
            key
        );

        let request = ChatRequest {
            message: content.to_string(),
            age,
            conversation_id: before.id.clone(),
        };

        let reply = match self.sync.service().send_chat(request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("[Pipeline] Send to {} failed, rolling back: {}", key, e);
                self.roll_back(key, &before, &pair).await;
                return Err(e);
            }
        };

        let Some(conversation_id) = reply.conversation_id.clone().or_else(|| before.id.clone()) else {
            self.roll_back(key, &before, &pair).await;
            return Err(NutriError::server("response did not include a conversation id"));
        };

        let is_new = before.id.is_none();
        if is_new {
            if let Some(title) = &title {
                self.persist_title(conversation_id.clone(), title.clone());
            }
        }

        let applied = self
            .reconcile(key, &conversation_id, &reply, &pair, title.as_deref())
            .await;

        self.sync.state().write().await.invalidate_summaries();
        tracing::info!("[Pipeline] Message committed to conversation {}", conversation_id);

        Ok(SubmitOutcome {
            navigate_to: (is_new && applied).then(|| conversation_id.clone()),
            conversation_id,
            reply: reply.reply,
        })
    }

    async fn append_pending(
        &self,
        key: &ConversationKey,
        content: &str,
        age: AgeContext,
        pair: &PendingPair,
        title: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();
        self.sync
            .update(key, |conversation| {
                if !conversation.has_messages() || conversation.age_context.is_none() {
                    conversation.age_context = Some(age);
                }
                if let Some(title) = title {
                    conversation.title = title.to_string();
                }
                conversation
                    .messages
                    .push(Message::pending_user(pair.user.as_str(), content, now));
                conversation
                    .messages
                    .push(Message::bot_placeholder(pair.bot.as_str(), now));
                conversation.updated_at = now;
            })
            .await
            .ok_or_else(|| NutriError::not_found("Conversation", key.to_string()))
    }

    /// Removes the temp pair and restores the metadata changed by the submit.
    async fn roll_back(&self, key: &ConversationKey, before: &Conversation, pair: &PendingPair) {
        self.sync
            .update(key, |conversation| {
                conversation.remove_messages(&pair.ids());
                conversation.title = before.title.clone();
                conversation.age_context = before.age_context;
                conversation.updated_at = before.updated_at;
            })
            .await;
    }

    /// Replaces the temp pair with the server's detail. Returns `true` if the
    /// conversation is (still) the active one.
    async fn reconcile(
        &self,
        key: &ConversationKey,
        conversation_id: &str,
        reply: &ChatReply,
        pair: &PendingPair,
        title: Option<&str>,
    ) -> bool {
        match self.sync.refetch(key, conversation_id).await {
            Ok(applied) => {
                if let Some(title) = title {
                    // The title rename is still in flight.
                    self.sync
                        .update(&ConversationKey::saved(conversation_id), |c| {
                            c.title = title.to_string()
                        })
                        .await;
                }
                applied
            }
            Err(e) => {
                tracing::warn!(
                    "[Pipeline] Refetch of {} failed, committing reply locally: {}",
                    conversation_id,
                    e
                );
                let mut state = self.sync.state().write().await;
                if let Some(conversation) = state.conversation_mut(key) {
                    commit_locally(conversation, reply, pair);
                }
                match key {
                    ConversationKey::Draft(_) => state.promote_draft(key, conversation_id),
                    ConversationKey::Saved(_) => state.is_active(key),
                }
            }
        }
    }

    /// Persists a derived title without holding up the send.
    fn persist_title(&self, conversation_id: String, title: String) {
        let service = self.sync.service().clone();
        let mut tasks = lock(&self.background);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            if let Err(e) = service.rename_conversation(&conversation_id, &title).await {
                tracing::warn!(
                    "[Pipeline] Failed to persist title for {}: {}",
                    conversation_id,
                    e
                );
            }
        });
    }
}

fn lock(tasks: &Mutex<JoinSet<()>>) -> MutexGuard<'_, JoinSet<()>> {
    tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn commit_locally(conversation: &mut Conversation, reply: &ChatReply, pair: &PendingPair) {
    if let Some(message) = conversation.message_mut(&pair.user) {
        message.pending = false;
    }
    if let Some(message) = conversation.message_mut(&pair.bot) {
        let content = reply.reply.clone().unwrap_or_default();
        *message = Message::committed(message.id.clone(), message.role, content, message.timestamp)
            .with_sources(reply.sources.clone());
    }
}
