//! Shared in-memory state owned by the conversation store.
//!
//! The active conversation lives in exactly one place: the active slot.
//! Conversations that stop being active move into `details`, so late
//! responses can still be reconciled against them.

use nutri_core::age::AgeContext;
use nutri_core::conversation::{Conversation, ConversationSummary};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Identifies a conversation held by the store, saved or not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    /// Server-assigned id.
    Saved(String),
    /// Client token of an unsaved draft.
    Draft(String),
}

impl ConversationKey {
    pub fn saved(id: impl Into<String>) -> Self {
        Self::Saved(id.into())
    }

    pub fn server_id(&self) -> Option<&str> {
        match self {
            Self::Saved(id) => Some(id),
            Self::Draft(_) => None,
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Saved(id) => write!(f, "saved:{}", id),
            Self::Draft(token) => write!(f, "draft:{}", token),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ActiveSlot {
    pub key: ConversationKey,
    pub conversation: Conversation,
}

/// Cached conversation list.
#[derive(Debug, Clone)]
pub(crate) struct SummaryCache {
    pub entries: Vec<ConversationSummary>,
    pub include_archived: bool,
    pub stale: bool,
}

impl SummaryCache {
    pub fn serves(&self, include_archived: bool) -> bool {
        !self.stale && self.include_archived == include_archived
    }
}

#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub active: Option<ActiveSlot>,
    pub details: HashMap<String, Conversation>,
    pub summaries: Option<SummaryCache>,
    pub session_age: Option<AgeContext>,
}

impl StoreState {
    pub fn is_active(&self, key: &ConversationKey) -> bool {
        self.active.as_ref().is_some_and(|slot| &slot.key == key)
    }

    pub fn active_key(&self) -> Option<ConversationKey> {
        self.active.as_ref().map(|slot| slot.key.clone())
    }

    pub fn conversation(&self, key: &ConversationKey) -> Option<&Conversation> {
        match &self.active {
            Some(slot) if &slot.key == key => Some(&slot.conversation),
            _ => key.server_id().and_then(|id| self.details.get(id)),
        }
    }

    pub fn conversation_mut(&mut self, key: &ConversationKey) -> Option<&mut Conversation> {
        match &mut self.active {
            Some(slot) if &slot.key == key => Some(&mut slot.conversation),
            _ => match key {
                ConversationKey::Saved(id) => self.details.get_mut(id),
                ConversationKey::Draft(_) => None,
            },
        }
    }

    /// Makes `key` active, parking the previously active saved conversation.
    pub fn activate(&mut self, key: ConversationKey, conversation: Conversation) {
        self.park_active();
        if let ConversationKey::Saved(id) = &key {
            self.details.remove(id);
        }
        self.active = Some(ActiveSlot { key, conversation });
    }

    /// Moves the active conversation (if saved) into the detail cache.
    pub fn park_active(&mut self) {
        if let Some(slot) = self.active.take() {
            if let ConversationKey::Saved(id) = slot.key {
                self.details.insert(id, slot.conversation);
            }
        }
    }

    /// Applies an authoritative detail fetched for `key`.
    ///
    /// The active slot is only written when `key` is still active; otherwise
    /// the detail lands in the cache. Returns `true` if it was applied to the
    /// active slot.
    pub fn apply_detail(&mut self, key: &ConversationKey, mut detail: Conversation) -> bool {
        detail.sort_messages();
        let Some(id) = detail.id.clone() else {
            return false;
        };

        if self.is_active(key) {
            self.active = Some(ActiveSlot {
                key: ConversationKey::Saved(id),
                conversation: detail,
            });
            true
        } else {
            self.details.insert(id, detail);
            false
        }
    }

    /// Gives the active draft its server id without replacing its content.
    pub fn promote_draft(&mut self, key: &ConversationKey, id: &str) -> bool {
        match &mut self.active {
            Some(slot) if &slot.key == key => {
                slot.conversation.id = Some(id.to_string());
                slot.key = ConversationKey::saved(id);
                true
            }
            _ => false,
        }
    }

    /// Marks the list cache for a refresh on next access.
    pub fn invalidate_summaries(&mut self) {
        if let Some(cache) = &mut self.summaries {
            cache.stale = true;
        }
    }

    /// Forgets a conversation everywhere except the active slot.
    pub fn forget(&mut self, id: &str) -> Option<Conversation> {
        if let Some(cache) = &mut self.summaries {
            cache.entries.retain(|s| s.id != id);
        }
        self.details.remove(id)
    }
}

pub(crate) type SharedState = Arc<RwLock<StoreState>>;
