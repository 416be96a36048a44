//! Conversation domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::{Message, MessageId};
use crate::age::AgeContext;
use crate::error::{NutriError, Result, ValidationError};

/// Maximum number of characters kept from the first message as a title.
pub const TITLE_MAX_CHARS: usize = 50;

/// Title given to a conversation before its first message.
pub const DEFAULT_TITLE: &str = "Cuộc trò chuyện mới";

/// A chat transcript together with its metadata.
///
/// `id` is `None` while the conversation is an unsaved draft; the server
/// assigns it on the first successful send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Option<String>,
    pub title: String,
    /// Pinned age; immutable once the conversation holds a message.
    pub age_context: Option<AgeContext>,
    /// Ordered by timestamp, pending entries last.
    pub messages: Vec<Message>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// An empty, unsaved conversation.
    pub fn draft(now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            title: DEFAULT_TITLE.to_string(),
            age_context: None,
            messages: Vec::new(),
            archived: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// An empty conversation known by its server id.
    pub fn saved(id: impl Into<String>, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Some(id.into()),
            title: title.into(),
            ..Self::draft(now)
        }
    }

    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }

    /// The server id, or `UnsavedConversation` for a draft.
    pub fn server_id(&self) -> Result<&str> {
        self.id
            .as_deref()
            .ok_or_else(|| ValidationError::UnsavedConversation.into())
    }

    pub fn has_messages(&self) -> bool {
        !self.messages.is_empty()
    }

    pub fn position_of(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|m| &m.id == id)
    }

    /// Finds a message by its server id.
    pub fn find_server_message(&self, id: &str) -> Result<(usize, &Message)> {
        self.messages
            .iter()
            .enumerate()
            .find(|(_, m)| matches!(&m.id, MessageId::Server(sid) if sid == id))
            .ok_or_else(|| NutriError::not_found("Message", id))
    }

    pub fn message_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| &m.id == id)
    }

    /// Pins the age context. Only possible while the transcript is empty.
    pub fn pin_age(&mut self, age: AgeContext) -> Result<()> {
        match self.age_context {
            Some(pinned) if pinned != age && self.has_messages() => Err(NutriError::AgeMismatch {
                pinned,
                session: age,
            }),
            _ => {
                self.age_context = Some(age);
                Ok(())
            }
        }
    }

    /// Keeps messages up to and including `index`, returning the dropped tail.
    pub fn truncate_after(&mut self, index: usize) -> Vec<Message> {
        if index + 1 >= self.messages.len() {
            return Vec::new();
        }
        self.messages.split_off(index + 1)
    }

    /// Drops the message at `index` and everything after it.
    pub fn truncate_from(&mut self, index: usize) -> Vec<Message> {
        if index >= self.messages.len() {
            return Vec::new();
        }
        self.messages.split_off(index)
    }

    /// Removes the given temp entries. Returns how many were found.
    pub fn remove_messages(&mut self, ids: &[MessageId]) -> usize {
        let before = self.messages.len();
        self.messages.retain(|m| !ids.contains(&m.id));
        before - self.messages.len()
    }

    /// Restores the ordering invariant: timestamp ascending, pending last.
    pub fn sort_messages(&mut self) {
        self.messages
            .sort_by(|a, b| a.pending.cmp(&b.pending).then(a.timestamp.cmp(&b.timestamp)));
    }

    /// Clears every pending/regenerating flag left in the transcript.
    ///
    /// Temp bot placeholders that never received an answer are removed
    /// rather than shown as an empty committed reply.
    pub fn settle_messages(&mut self) {
        self.messages.retain(|m| !m.is_unanswered_placeholder());
        for message in &mut self.messages {
            message.settle();
        }
    }

    pub fn summary(&self) -> Option<ConversationSummary> {
        let id = self.id.clone()?;
        Some(ConversationSummary {
            id,
            title: self.title.clone(),
            age_context: self.age_context,
            archived: self.archived,
            created_at: self.created_at,
            updated_at: self.updated_at,
            message_count: self.messages.len(),
        })
    }
}

/// List entry for a saved conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub age_context: Option<AgeContext>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub message_count: usize,
}

/// Derives a conversation title from its first message.
///
/// The content is cut at [`TITLE_MAX_CHARS`] characters without looking for
/// word boundaries; "…" marks a cut.
pub fn derive_title(content: &str) -> String {
    let content = content.trim();
    if content.chars().count() <= TITLE_MAX_CHARS {
        return content.to_string();
    }
    let mut title: String = content.chars().take(TITLE_MAX_CHARS).collect();
    title.push('…');
    title
}

/// Picks the replacement for a deleted active conversation: the
/// most-recently-updated remaining, non-archived one.
pub fn fallback_selection<'a>(
    remaining: impl IntoIterator<Item = &'a ConversationSummary>,
) -> Option<&'a ConversationSummary> {
    remaining
        .into_iter()
        .filter(|s| !s.archived)
        .max_by(|a, b| a.updated_at.cmp(&b.updated_at).then_with(|| b.id.cmp(&a.id)))
}
