//! Conversation store: the application-facing entry point.

use chrono::Utc;
use futures::future::join_all;
use nutri_core::age::{AgeCheck, AgeContext, MismatchResolution, can_send};
use nutri_core::conversation::{
    ChatService, Conversation, ConversationSummary, DEFAULT_TITLE, fallback_selection,
};
use nutri_core::error::{NutriError, Result, ValidationError};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::in_flight::InFlightRegistry;
use crate::pipeline::{OptimisticPipeline, SubmitOutcome};
use crate::revision::RevisionController;
use crate::state::{ActiveSlot, ConversationKey, SharedState, StoreState, SummaryCache};
use crate::sync::ConversationSync;
use crate::temp_id::next_temp_id;

/// Per-item result of a bulk operation.
#[derive(Debug, Default)]
pub struct BulkOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, NutriError)>,
}

impl BulkOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Client-side conversation store.
///
/// `ConversationStore` is responsible for:
/// - Holding the session age and the active conversation
/// - Selecting conversations and caching their details and the list
/// - Sending messages and revising existing ones through the optimistic
///   pipeline
/// - Renaming, archiving and deleting conversations
///
/// At most one transcript operation runs per conversation at a time; a second
/// one is rejected with [`NutriError::Busy`].
pub struct ConversationStore {
    sync: ConversationSync,
    pipeline: OptimisticPipeline,
    revisions: RevisionController,
    /// Transcript operations, keyed by conversation key.
    operations: InFlightRegistry,
    /// Detail fetches, keyed by conversation id.
    fetches: InFlightRegistry,
}

impl ConversationStore {
    /// Creates an empty store on top of a chat service.
    pub fn new(service: Arc<dyn ChatService>) -> Self {
        let state: SharedState = Arc::new(RwLock::new(StoreState::default()));
        let sync = ConversationSync::new(service, state);
        let operations = InFlightRegistry::new();
        Self {
            pipeline: OptimisticPipeline::new(sync.clone(), operations.clone()),
            revisions: RevisionController::new(sync.clone(), operations.clone()),
            sync,
            operations,
            fetches: InFlightRegistry::new(),
        }
    }

    fn state(&self) -> &SharedState {
        self.sync.state()
    }

    fn service(&self) -> &Arc<dyn ChatService> {
        self.sync.service()
    }

    /// Sets the age selected for this session.
    ///
    /// An active conversation without messages is re-pinned to the new age.
    pub async fn set_session_age(&self, age: Option<AgeContext>) {
        let mut state = self.state().write().await;
        state.session_age = age;
        if let Some(slot) = &mut state.active {
            if !slot.conversation.has_messages() {
                slot.conversation.age_context = age;
            }
        }
        tracing::debug!(
            "[ConversationStore] Session age set to {}",
            age.map(|a| a.to_string()).unwrap_or_else(|| "none".to_string())
        );
    }

    pub async fn session_age(&self) -> Option<AgeContext> {
        self.state().read().await.session_age
    }

    /// Checks whether the active conversation accepts a send with the
    /// current session age.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveConversation` if nothing is selected.
    pub async fn check_send(&self) -> Result<AgeCheck> {
        let state = self.state().read().await;
        let slot = state
            .active
            .as_ref()
            .ok_or(NutriError::Validation(ValidationError::NoActiveConversation))?;
        Ok(can_send(&slot.conversation, state.session_age))
    }

    /// Resolves an age mismatch on the active conversation.
    ///
    /// `Fork` starts a new draft with the session age; `RevertSessionAge`
    /// adopts the conversation's pinned age. Does nothing when there is no
    /// mismatch.
    ///
    /// # Returns
    ///
    /// The check for the (possibly new) active conversation afterwards.
    pub async fn resolve_age_mismatch(&self, resolution: MismatchResolution) -> Result<AgeCheck> {
        let AgeCheck::Mismatch { pinned, session } = self.check_send().await? else {
            return self.check_send().await;
        };
        match resolution {
            MismatchResolution::Fork => {
                tracing::info!(
                    "[ConversationStore] Forking to a new conversation for age {}",
                    session
                );
                self.new_conversation().await;
            }
            MismatchResolution::RevertSessionAge => {
                tracing::info!("[ConversationStore] Reverting session age to {}", pinned);
                self.set_session_age(Some(pinned)).await;
            }
        }
        self.check_send().await
    }

    /// Starts an unsaved draft pinned to the session age and makes it active.
    pub async fn new_conversation(&self) -> ConversationKey {
        let key = ConversationKey::Draft(next_temp_id());
        let mut state = self.state().write().await;
        let mut draft = Conversation::draft(Utc::now());
        draft.age_context = state.session_age;
        state.activate(key.clone(), draft);
        tracing::debug!("[ConversationStore] Started draft {}", key);
        key
    }

    pub async fn active(&self) -> Option<Conversation> {
        let state = self.state().read().await;
        state.active.as_ref().map(|slot| slot.conversation.clone())
    }

    pub async fn active_key(&self) -> Option<ConversationKey> {
        self.state().read().await.active_key()
    }

    /// The local copy of a saved conversation, active or cached.
    pub async fn cached_detail(&self, id: &str) -> Option<Conversation> {
        let state = self.state().read().await;
        state.conversation(&ConversationKey::saved(id)).cloned()
    }

    /// Selects a saved conversation and loads its detail.
    ///
    /// A cached copy is shown right away. The fetched detail only replaces
    /// the active conversation if it is still selected when the response
    /// arrives and no transcript operation on it has started in the
    /// meantime. While a fetch for `id` or a transcript operation on it is in
    /// flight, no further fetch is issued.
    ///
    /// # Errors
    ///
    /// Returns the fetch error. If nothing was cached, the previous selection
    /// is restored first.
    pub async fn select(&self, id: &str) -> Result<Conversation> {
        let key = ConversationKey::saved(id);
        let (previous, had_copy) = {
            let mut state = self.state().write().await;
            let previous = state.active_key();
            if state.is_active(&key) {
                (previous, true)
            } else {
                let cached = state.details.get(id).cloned();
                let had_copy = cached.is_some();
                let placeholder = cached.unwrap_or_else(|| placeholder_for(&state, id));
                state.activate(key.clone(), placeholder);
                (previous, had_copy)
            }
        };

        let generation = self.operations.generation(&key.to_string());
        if self.operations.is_in_flight(&key.to_string()) {
            tracing::debug!(
                "[ConversationStore] {} has an operation in flight, showing local copy",
                key
            );
            return self.sync.snapshot(&key).await;
        }
        let Some(_fetch) = self.fetches.try_begin(id) else {
            tracing::debug!("[ConversationStore] Fetch for {} already in flight", id);
            return self.sync.snapshot(&key).await;
        };

        match self.service().get_conversation(id).await {
            Ok(detail) => {
                let mut state = self.state().write().await;
                if self.operations.generation(&key.to_string()) != generation {
                    // The operation refetches once it completes.
                    tracing::debug!(
                        "[ConversationStore] Dropping detail of {}, an operation started meanwhile",
                        id
                    );
                    return Ok(state.conversation(&key).cloned().unwrap_or(detail));
                }
                if !state.apply_detail(&key, detail.clone()) {
                    tracing::debug!(
                        "[ConversationStore] Selection moved on before {} loaded",
                        id
                    );
                }
                Ok(state.conversation(&key).cloned().unwrap_or(detail))
            }
            Err(e) => {
                tracing::warn!("[ConversationStore] Failed to load {}: {}", id, e);
                if !had_copy {
                    let mut state = self.state().write().await;
                    if state.is_active(&key) {
                        state.active = None;
                        if let Some(ConversationKey::Saved(prev)) = previous {
                            if let Some(conversation) = state.details.remove(&prev) {
                                state.activate(ConversationKey::Saved(prev), conversation);
                            }
                        }
                    }
                }
                Err(e)
            }
        }
    }

    /// Lists saved conversations, using the cache while it is fresh.
    pub async fn list(&self, include_archived: bool) -> Result<Vec<ConversationSummary>> {
        {
            let state = self.state().read().await;
            if let Some(cache) = &state.summaries {
                if cache.serves(include_archived) {
                    return Ok(cache.entries.clone());
                }
            }
        }
        self.refresh_list(include_archived).await
    }

    /// Fetches the list from the server and replaces the cache.
    pub async fn refresh_list(&self, include_archived: bool) -> Result<Vec<ConversationSummary>> {
        let entries = self.service().list_conversations(include_archived).await?;
        tracing::debug!(
            "[ConversationStore] Loaded {} conversation(s)",
            entries.len()
        );
        let mut state = self.state().write().await;
        state.summaries = Some(SummaryCache {
            entries: entries.clone(),
            include_archived,
            stale: false,
        });
        Ok(entries)
    }

    /// Refreshes the list in the mode it was last loaded with.
    async fn refresh_cached_list(&self) {
        let include_archived = {
            let state = self.state().read().await;
            match &state.summaries {
                Some(cache) => cache.include_archived,
                None => return,
            }
        };
        if let Err(e) = self.refresh_list(include_archived).await {
            tracing::warn!("[ConversationStore] List refresh failed: {}", e);
            self.state().write().await.invalidate_summaries();
        }
    }

    fn active_or_err(key: Option<ConversationKey>) -> Result<ConversationKey> {
        key.ok_or(NutriError::Validation(ValidationError::NoActiveConversation))
    }

    /// Sends a message to the active conversation.
    ///
    /// # Errors
    ///
    /// See [`OptimisticPipeline::submit`].
    pub async fn send(&self, content: &str) -> Result<SubmitOutcome> {
        let key = Self::active_or_err(self.active_key().await)?;
        self.pipeline.submit(&key, content).await
    }

    /// Waits for detached background work, such as persisting a derived
    /// title, to finish. Call before shutting the runtime down.
    pub async fn flush(&self) {
        self.pipeline.flush().await;
    }

    /// Edits a user message of the active conversation.
    pub async fn edit_message(&self, message_id: &str, new_content: &str) -> Result<()> {
        let key = Self::active_or_err(self.active_key().await)?;
        self.revisions.edit(&key, message_id, new_content).await
    }

    /// Selects version `version` (1-indexed) of a message of the active
    /// conversation. Returns `false` if it was already selected.
    pub async fn switch_version(&self, message_id: &str, version: usize) -> Result<bool> {
        let key = Self::active_or_err(self.active_key().await)?;
        self.revisions.switch_version(&key, message_id, version).await
    }

    /// Regenerates a bot message of the active conversation with the session
    /// age.
    pub async fn regenerate(&self, message_id: &str) -> Result<()> {
        let key = Self::active_or_err(self.active_key().await)?;
        let session_age = self.session_age().await;
        self.revisions.regenerate(&key, message_id, session_age).await
    }

    /// Deletes a message of the active conversation and all that follow it.
    pub async fn delete_and_following(&self, message_id: &str) -> Result<usize> {
        let key = Self::active_or_err(self.active_key().await)?;
        self.revisions.delete_and_following(&key, message_id).await
    }

    /// Renames a saved conversation.
    ///
    /// The new title is shown immediately and put back on failure.
    pub async fn rename(&self, id: &str, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }

        let previous = self
            .patch_local(id, |summary| summary.title = title.to_string(), |c| {
                c.title = title.to_string()
            })
            .await;

        match self.service().rename_conversation(id, title).await {
            Ok(()) => {
                tracing::info!("[ConversationStore] Renamed {} to '{}'", id, title);
                self.refresh_cached_list().await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("[ConversationStore] Rename of {} failed: {}", id, e);
                self.restore_local(id, previous).await;
                Err(e)
            }
        }
    }

    pub async fn archive(&self, id: &str) -> Result<()> {
        self.set_archived(id, true).await
    }

    pub async fn unarchive(&self, id: &str) -> Result<()> {
        self.set_archived(id, false).await
    }

    async fn set_archived(&self, id: &str, archived: bool) -> Result<()> {
        let previous = self
            .patch_local(id, |summary| summary.archived = archived, |c| c.archived = archived)
            .await;

        let result = if archived {
            self.service().archive_conversation(id).await
        } else {
            self.service().unarchive_conversation(id).await
        };

        match result {
            Ok(()) => {
                tracing::info!(
                    "[ConversationStore] {} {}",
                    if archived { "Archived" } else { "Unarchived" },
                    id
                );
                self.refresh_cached_list().await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("[ConversationStore] Archive toggle of {} failed: {}", id, e);
                self.restore_local(id, previous).await;
                Err(e)
            }
        }
    }

    /// Deletes a saved conversation.
    ///
    /// If it was active, the most recently updated remaining conversation is
    /// selected, or a new draft is started when none is left.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let was_active = self.delete_one(id).await?;
        if was_active {
            self.select_fallback().await;
        }
        Ok(())
    }

    /// Archives several conversations; each one succeeds or fails on its own.
    pub async fn archive_many(&self, ids: &[String]) -> BulkOutcome {
        let results = join_all(ids.iter().map(|id| self.set_archived(id, true))).await;
        collect_outcome(ids, results)
    }

    /// Deletes several conversations; each one succeeds or fails on its own.
    pub async fn delete_many(&self, ids: &[String]) -> BulkOutcome {
        let results = join_all(ids.iter().map(|id| self.delete_one(id))).await;
        let active_deleted = results.iter().any(|r| matches!(r, Ok(true)));
        let outcome = collect_outcome(ids, results);
        if active_deleted {
            self.select_fallback().await;
        }
        tracing::info!(
            "[ConversationStore] Bulk delete: {} succeeded, {} failed",
            outcome.succeeded.len(),
            outcome.failed.len()
        );
        outcome
    }

    /// Removes a conversation locally, asks the server to delete it, and puts
    /// it back on failure. Returns whether it was the active conversation.
    async fn delete_one(&self, id: &str) -> Result<bool> {
        let key = ConversationKey::saved(id);
        if self.operations.is_in_flight(&key.to_string()) {
            return Err(NutriError::Busy(key.to_string()));
        }

        let removed = {
            let mut state = self.state().write().await;
            let summary = state.summaries.as_ref().and_then(|cache| {
                cache
                    .entries
                    .iter()
                    .position(|s| s.id == id)
                    .map(|index| (index, cache.entries[index].clone()))
            });
            let active = if state.is_active(&key) {
                state.active.take()
            } else {
                None
            };
            let detail = state.forget(id);
            RemovedConversation {
                summary,
                active,
                detail,
            }
        };
        let was_active = removed.active.is_some();

        match self.service().delete_conversation(id).await {
            Ok(()) => {
                tracing::info!("[ConversationStore] Deleted conversation {}", id);
                Ok(was_active)
            }
            Err(e) => {
                tracing::warn!("[ConversationStore] Delete of {} failed, restoring: {}", id, e);
                let mut state = self.state().write().await;
                if let (Some((index, summary)), Some(cache)) = (removed.summary, &mut state.summaries) {
                    if !cache.entries.iter().any(|s| s.id == id) {
                        let index = index.min(cache.entries.len());
                        cache.entries.insert(index, summary);
                    }
                }
                if let Some(detail) = removed.detail {
                    state.details.insert(id.to_string(), detail);
                }
                if let Some(slot) = removed.active {
                    if state.active.is_none() {
                        state.active = Some(slot);
                    } else {
                        state.details.insert(id.to_string(), slot.conversation);
                    }
                }
                Err(e)
            }
        }
    }

    async fn select_fallback(&self) {
        let summaries = match self.refresh_list(false).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("[ConversationStore] Could not refresh list after delete: {}", e);
                let state = self.state().read().await;
                state
                    .summaries
                    .as_ref()
                    .map(|cache| cache.entries.clone())
                    .unwrap_or_default()
            }
        };

        match fallback_selection(&summaries).map(|s| s.id.clone()) {
            Some(id) => {
                if let Err(e) = self.select(&id).await {
                    tracing::warn!("[ConversationStore] Fallback selection of {} failed: {}", id, e);
                    self.new_conversation().await;
                }
            }
            None => {
                self.new_conversation().await;
            }
        }
    }

    /// Applies a metadata change to the cached summary and the local
    /// conversation, returning what was there before.
    async fn patch_local(
        &self,
        id: &str,
        patch_summary: impl FnOnce(&mut ConversationSummary),
        patch_conversation: impl FnOnce(&mut Conversation),
    ) -> LocalMetadata {
        let mut state = self.state().write().await;
        let summary = state
            .summaries
            .as_mut()
            .and_then(|cache| cache.entries.iter_mut().find(|s| s.id == id));
        let previous_summary = summary.as_ref().map(|s| (**s).clone());
        if let Some(summary) = summary {
            patch_summary(summary);
        }

        let conversation = state.conversation_mut(&ConversationKey::saved(id));
        let previous_conversation = conversation
            .as_ref()
            .map(|c| (c.title.clone(), c.archived));
        if let Some(conversation) = conversation {
            patch_conversation(conversation);
        }

        LocalMetadata {
            summary: previous_summary,
            conversation: previous_conversation,
        }
    }

    async fn restore_local(&self, id: &str, previous: LocalMetadata) {
        let mut state = self.state().write().await;
        if let Some(previous) = previous.summary {
            if let Some(summary) = state
                .summaries
                .as_mut()
                .and_then(|cache| cache.entries.iter_mut().find(|s| s.id == id))
            {
                *summary = previous;
            }
        }
        if let Some((title, archived)) = previous.conversation {
            if let Some(conversation) = state.conversation_mut(&ConversationKey::saved(id)) {
                conversation.title = title;
                conversation.archived = archived;
            }
        }
    }
}

/// Local metadata captured before an optimistic rename or archive toggle.
struct LocalMetadata {
    summary: Option<ConversationSummary>,
    conversation: Option<(String, bool)>,
}

/// Everything an optimistic delete took out of the state.
struct RemovedConversation {
    /// Position and entry in the cached list.
    summary: Option<(usize, ConversationSummary)>,
    active: Option<ActiveSlot>,
    detail: Option<Conversation>,
}

/// List-derived stand-in shown while a selected conversation loads.
fn placeholder_for(state: &StoreState, id: &str) -> Conversation {
    let now = Utc::now();
    let summary = state
        .summaries
        .as_ref()
        .and_then(|cache| cache.entries.iter().find(|s| s.id == id));
    match summary {
        Some(summary) => {
            let mut conversation = Conversation::saved(id, summary.title.clone(), summary.created_at);
            conversation.age_context = summary.age_context;
            conversation.archived = summary.archived;
            conversation.updated_at = summary.updated_at;
            conversation
        }
        None => Conversation::saved(id, DEFAULT_TITLE, now),
    }
}

fn collect_outcome<T>(ids: &[String], results: Vec<Result<T>>) -> BulkOutcome {
    let mut outcome = BulkOutcome::default();
    for (id, result) in ids.iter().zip(results) {
        match result {
            Ok(_) => outcome.succeeded.push(id.clone()),
            Err(e) => outcome.failed.push((id.clone(), e)),
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeChatService, FakeOp, age, seeded_conversation};

    fn store_over(fake: &Arc<FakeChatService>) -> ConversationStore {
        ConversationStore::new(fake.clone())
    }

    #[tokio::test]
    async fn test_new_conversation_is_pinned_to_session_age() {
        let store = store_over(&Arc::new(FakeChatService::new()));
        store.set_session_age(Some(age(3))).await;
        let key = store.new_conversation().await;

        assert!(key.server_id().is_none());
        let draft = store.active().await.unwrap();
        assert_eq!(draft.age_context, Some(age(3)));
        assert_eq!(draft.title, DEFAULT_TITLE);

        // An empty draft follows the session age.
        store.set_session_age(Some(age(9))).await;
        assert_eq!(store.active().await.unwrap().age_context, Some(age(9)));
    }

    #[tokio::test]
    async fn test_select_loads_detail() {
        let fake = Arc::new(FakeChatService::new());
        fake.insert(seeded_conversation("c1", 4, Some(age(5))));
        let store = store_over(&fake);

        let conversation = store.select("c1").await.unwrap();
        assert_eq!(conversation.messages.len(), 4);
        assert_eq!(store.active_key().await, Some(ConversationKey::saved("c1")));
    }

    #[tokio::test]
    async fn test_select_missing_restores_previous_selection() {
        let fake = Arc::new(FakeChatService::new());
        fake.insert(seeded_conversation("c1", 2, None));
        let store = store_over(&fake);
        store.select("c1").await.unwrap();

        let err = store.select("nope").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.active_key().await, Some(ConversationKey::saved("c1")));
    }

    #[tokio::test]
    async fn test_concurrent_selects_fetch_once() {
        let fake = Arc::new(FakeChatService::new());
        fake.insert(seeded_conversation("c1", 2, None));
        let gate = fake.gate(FakeOp::GetConversation);
        let store = Arc::new(store_over(&fake));

        let first = {
            let store = store.clone();
            tokio::spawn(async move { store.select("c1").await })
        };
        gate.entered.notified().await;
        store.select("c1").await.unwrap();
        gate.release.notify_one();
        first.await.unwrap().unwrap();

        assert_eq!(fake.call_count("get_conversation"), 1);
        assert_eq!(store.active().await.unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_slow_select_does_not_override_newer_selection() {
        let fake = Arc::new(FakeChatService::new());
        fake.insert(seeded_conversation("c1", 2, None));
        fake.insert(seeded_conversation("c2", 4, None));
        let gate = fake.gate(FakeOp::GetConversation);
        let store = Arc::new(store_over(&fake));

        let slow = {
            let store = store.clone();
            tokio::spawn(async move { store.select("c1").await })
        };
        gate.entered.notified().await;
        store.select("c2").await.unwrap();
        gate.release.notify_one();
        slow.await.unwrap().unwrap();

        let active = store.active().await.unwrap();
        assert_eq!(active.id.as_deref(), Some("c2"));
        assert_eq!(active.messages.len(), 4);
        assert_eq!(store.cached_detail("c1").await.unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_list_is_cached_until_invalidated() {
        let fake = Arc::new(FakeChatService::new());
        fake.insert(seeded_conversation("c1", 2, None));
        let store = store_over(&fake);

        assert_eq!(store.list(false).await.unwrap().len(), 1);
        assert_eq!(store.list(false).await.unwrap().len(), 1);
        assert_eq!(fake.call_count("list_conversations"), 1);

        store.list(true).await.unwrap();
        assert_eq!(fake.call_count("list_conversations"), 2);
    }

    #[tokio::test]
    async fn test_rename_failure_restores_title() {
        let fake = Arc::new(FakeChatService::new());
        fake.insert(seeded_conversation("c1", 2, None));
        let store = store_over(&fake);
        store.list(false).await.unwrap();
        store.select("c1").await.unwrap();

        fake.fail(FakeOp::RenameConversation);
        store.rename("c1", "Bữa sáng").await.unwrap_err();
        assert_eq!(store.active().await.unwrap().title, "Conversation c1");
        assert_eq!(store.list(false).await.unwrap()[0].title, "Conversation c1");

        store.rename("c1", "Bữa sáng").await.unwrap();
        assert_eq!(store.active().await.unwrap().title, "Bữa sáng");
        assert_eq!(store.list(false).await.unwrap()[0].title, "Bữa sáng");
    }

    #[tokio::test]
    async fn test_archive_hides_from_default_list() {
        let fake = Arc::new(FakeChatService::new());
        fake.insert(seeded_conversation("c1", 2, None));
        fake.insert(seeded_conversation("c2", 2, None));
        let store = store_over(&fake);
        store.list(false).await.unwrap();

        store.archive("c1").await.unwrap();
        let ids: Vec<_> = store.list(false).await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["c2".to_string()]);

        store.unarchive("c1").await.unwrap();
        assert_eq!(store.list(false).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_active_selects_most_recent_remaining() {
        let fake = Arc::new(FakeChatService::new());
        let older = seeded_conversation("old", 2, None);
        let mut newer = seeded_conversation("new", 2, None);
        newer.updated_at = older.updated_at + chrono::Duration::minutes(5);
        fake.insert(older);
        fake.insert(newer);
        fake.insert(seeded_conversation("gone", 2, None));
        let store = store_over(&fake);
        store.select("gone").await.unwrap();

        store.delete("gone").await.unwrap();
        assert_eq!(store.active_key().await, Some(ConversationKey::saved("new")));
        assert!(fake.stored("gone").is_none());
    }

    #[tokio::test]
    async fn test_delete_last_conversation_starts_draft() {
        let fake = Arc::new(FakeChatService::new());
        fake.insert(seeded_conversation("c1", 2, None));
        let store = store_over(&fake);
        store.select("c1").await.unwrap();

        store.delete("c1").await.unwrap();
        assert!(store.active_key().await.unwrap().server_id().is_none());
    }

    #[tokio::test]
    async fn test_delete_failure_restores_selection_and_list() {
        let fake = Arc::new(FakeChatService::new());
        fake.insert(seeded_conversation("c1", 2, None));
        let store = store_over(&fake);
        store.list(false).await.unwrap();
        store.select("c1").await.unwrap();

        fake.fail(FakeOp::DeleteConversation);
        assert!(store.delete("c1").await.unwrap_err().is_remote());
        assert_eq!(store.active_key().await, Some(ConversationKey::saved("c1")));
        assert_eq!(store.list(false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bulk_delete_reports_per_item() {
        let fake = Arc::new(FakeChatService::new());
        fake.insert(seeded_conversation("a", 2, None));
        fake.insert(seeded_conversation("b", 2, None));
        let store = store_over(&fake);

        let ids = vec!["a".to_string(), "missing".to_string(), "b".to_string()];
        let outcome = store.delete_many(&ids).await;
        assert_eq!(outcome.succeeded, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, "missing");
        assert!(!outcome.is_complete());
    }

    #[tokio::test]
    async fn test_bulk_archive() {
        let fake = Arc::new(FakeChatService::new());
        fake.insert(seeded_conversation("a", 2, None));
        fake.insert(seeded_conversation("b", 2, None));
        let store = store_over(&fake);

        let outcome = store.archive_many(&["a".to_string(), "b".to_string()]).await;
        assert!(outcome.is_complete());
        assert!(store.list(false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_mismatch_by_fork() {
        let fake = Arc::new(FakeChatService::new());
        fake.insert(seeded_conversation("c1", 2, Some(age(2))));
        let store = store_over(&fake);
        store.set_session_age(Some(age(10))).await;
        store.select("c1").await.unwrap();
        assert!(matches!(store.check_send().await.unwrap(), AgeCheck::Mismatch { .. }));

        let check = store.resolve_age_mismatch(MismatchResolution::Fork).await.unwrap();
        assert_eq!(check, AgeCheck::Allowed(age(10)));
        let draft = store.active().await.unwrap();
        assert!(!draft.is_saved());
        assert_eq!(draft.age_context, Some(age(10)));
    }

    #[tokio::test]
    async fn test_resolve_mismatch_by_reverting_age() {
        let fake = Arc::new(FakeChatService::new());
        fake.insert(seeded_conversation("c1", 2, Some(age(2))));
        let store = store_over(&fake);
        store.set_session_age(Some(age(10))).await;
        store.select("c1").await.unwrap();

        let check = store
            .resolve_age_mismatch(MismatchResolution::RevertSessionAge)
            .await
            .unwrap();
        assert_eq!(check, AgeCheck::Allowed(age(2)));
        assert_eq!(store.session_age().await, Some(age(2)));
        assert_eq!(store.active_key().await, Some(ConversationKey::saved("c1")));
    }

    #[tokio::test]
    async fn test_operations_without_selection() {
        let store = store_over(&Arc::new(FakeChatService::new()));
        assert!(store.send("hi").await.unwrap_err().is_validation());
        assert!(store.check_send().await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_slow_select_does_not_drop_pending_pair() {
        let fake = Arc::new(FakeChatService::new());
        fake.insert(seeded_conversation("c1", 2, Some(age(5))));
        let store = Arc::new(store_over(&fake));
        store.set_session_age(Some(age(5))).await;
        store.select("c1").await.unwrap();

        let fetch = fake.gate(FakeOp::GetConversation);
        let select = {
            let store = store.clone();
            tokio::spawn(async move { store.select("c1").await })
        };
        fetch.entered.notified().await;

        let chat = fake.gate_chat();
        let send = {
            let store = store.clone();
            tokio::spawn(async move { store.send("Bé có nên uống nước ép?").await })
        };
        chat.entered.notified().await;
        assert_eq!(store.active().await.unwrap().messages.len(), 4);

        fetch.release.notify_one();
        select.await.unwrap().unwrap();
        let during = store.active().await.unwrap();
        assert_eq!(during.messages.len(), 4);
        assert!(during.messages[2].id.is_temp());
        assert!(during.messages[3].id.is_temp());

        chat.release.notify_one();
        send.await.unwrap().unwrap();
        let after = store.active().await.unwrap();
        assert_eq!(after.messages.len(), 4);
        assert!(after.messages.iter().all(|m| !m.id.is_temp()));
    }

    #[tokio::test]
    async fn test_select_landing_after_operation_is_ignored() {
        let fake = Arc::new(FakeChatService::new());
        fake.insert(seeded_conversation("c1", 4, Some(age(5))));
        let store = Arc::new(store_over(&fake));
        store.set_session_age(Some(age(5))).await;
        store.select("c1").await.unwrap();

        let fetch = fake.gate(FakeOp::GetConversation);
        let select = {
            let store = store.clone();
            tokio::spawn(async move { store.select("c1").await })
        };
        fetch.entered.notified().await;

        // Finishes completely while the older fetch is still held.
        store.delete_and_following("c1-m3").await.unwrap();
        assert_eq!(store.active().await.unwrap().messages.len(), 2);

        fetch.release.notify_one();
        select.await.unwrap().unwrap();
        assert_eq!(store.active().await.unwrap().messages.len(), 2);
    }
}
