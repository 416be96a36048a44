//! In-memory chat service used by the application tests.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use nutri_core::age::AgeContext;
use nutri_core::conversation::{
    ChatReply, ChatRequest, ChatService, Conversation, ConversationSummary, DEFAULT_TITLE, Message,
    MessageId, MessageRole, Source,
};
use nutri_core::error::{NutriError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub fn age(years: u8) -> AgeContext {
    AgeContext::new(years).unwrap()
}

/// A saved conversation with `count` alternating user/bot messages named
/// `<id>-m1`, `<id>-m2`, ... and timestamps in the past.
pub fn seeded_conversation(id: &str, count: usize, age: Option<AgeContext>) -> Conversation {
    let base = Utc::now() - Duration::hours(1);
    let mut conversation = Conversation::saved(id, format!("Conversation {}", id), base);
    conversation.age_context = age;
    for i in 0..count {
        let (role, content) = if i % 2 == 0 {
            (MessageRole::User, format!("question {}", i + 1))
        } else {
            (MessageRole::Bot, format!("answer {}", i + 1))
        };
        conversation.messages.push(Message::committed(
            MessageId::server(format!("{}-m{}", id, i + 1)),
            role,
            content,
            base + Duration::seconds(i as i64),
        ));
    }
    conversation.updated_at = base + Duration::seconds(count as i64);
    conversation
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeOp {
    SendChat,
    ListConversations,
    GetConversation,
    RenameConversation,
    DeleteConversation,
    ArchiveConversation,
    UnarchiveConversation,
    EditMessage,
    SwitchVersion,
    Regenerate,
    DeleteAndFollowing,
}

impl FakeOp {
    fn name(self) -> &'static str {
        match self {
            Self::SendChat => "send_chat",
            Self::ListConversations => "list_conversations",
            Self::GetConversation => "get_conversation",
            Self::RenameConversation => "rename_conversation",
            Self::DeleteConversation => "delete_conversation",
            Self::ArchiveConversation => "archive_conversation",
            Self::UnarchiveConversation => "unarchive_conversation",
            Self::EditMessage => "edit_message",
            Self::SwitchVersion => "switch_version",
            Self::Regenerate => "regenerate",
            Self::DeleteAndFollowing => "delete_and_following",
        }
    }
}

/// Holds one call of an operation until the test releases it.
#[derive(Clone)]
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl Gate {
    fn new() -> Self {
        Self {
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }
}

/// Server stand-in with failure injection and call recording.
///
/// `fail` and the gates apply to the next call of the operation only.
pub struct FakeChatService {
    conversations: Mutex<HashMap<String, Conversation>>,
    next_conversation_id: Mutex<Option<String>>,
    failures: Mutex<HashSet<FakeOp>>,
    gates: Mutex<HashMap<FakeOp, Gate>>,
    calls: Mutex<Vec<&'static str>>,
    chat_ages: Mutex<Vec<AgeContext>>,
    regenerate_ages: Mutex<Vec<AgeContext>>,
    sequence: AtomicUsize,
}

impl FakeChatService {
    pub fn new() -> Self {
        Self {
            conversations: Mutex::new(HashMap::new()),
            next_conversation_id: Mutex::new(None),
            failures: Mutex::new(HashSet::new()),
            gates: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            chat_ages: Mutex::new(Vec::new()),
            regenerate_ages: Mutex::new(Vec::new()),
            sequence: AtomicUsize::new(1),
        }
    }

    pub fn with_next_conversation_id(self, id: &str) -> Self {
        *self.next_conversation_id.lock().unwrap() = Some(id.to_string());
        self
    }

    pub fn insert(&self, conversation: Conversation) {
        let id = conversation.id.clone().unwrap();
        self.conversations.lock().unwrap().insert(id, conversation);
    }

    pub fn stored(&self, id: &str) -> Option<Conversation> {
        self.conversations.lock().unwrap().get(id).cloned()
    }

    pub fn fail(&self, op: FakeOp) {
        self.failures.lock().unwrap().insert(op);
    }

    pub fn gate(&self, op: FakeOp) -> Gate {
        let gate = Gate::new();
        self.gates.lock().unwrap().insert(op, gate.clone());
        gate
    }

    pub fn gate_chat(&self) -> Gate {
        self.gate(FakeOp::SendChat)
    }

    pub fn gate_regenerate(&self) -> Gate {
        self.gate(FakeOp::Regenerate)
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == name).count()
    }

    pub fn last_chat_age(&self) -> Option<AgeContext> {
        self.chat_ages.lock().unwrap().last().copied()
    }

    pub fn last_regenerate_age(&self) -> Option<AgeContext> {
        self.regenerate_ages.lock().unwrap().last().copied()
    }

    /// Records the call, waits on a gate if one is set, then applies any
    /// injected failure.
    async fn enter(&self, op: FakeOp) -> Result<()> {
        self.calls.lock().unwrap().push(op.name());
        let gate = self.gates.lock().unwrap().remove(&op);
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if self.failures.lock().unwrap().remove(&op) {
            return Err(NutriError::network(format!("injected {} failure", op.name())));
        }
        Ok(())
    }

    fn next_message_id(&self, conversation_id: &str) -> MessageId {
        let n = self.sequence.fetch_add(1, Ordering::Relaxed);
        MessageId::server(format!("{}-s{}", conversation_id, n))
    }

    fn with_conversation<R>(&self, id: &str, f: impl FnOnce(&mut Conversation) -> R) -> Result<R> {
        let mut conversations = self.conversations.lock().unwrap();
        let conversation = conversations
            .get_mut(id)
            .ok_or_else(|| NutriError::not_found("Conversation", id))?;
        let result = f(conversation);
        conversation.updated_at = Utc::now();
        Ok(result)
    }
}

#[async_trait]
impl ChatService for FakeChatService {
    async fn send_chat(&self, request: ChatRequest) -> Result<ChatReply> {
        self.enter(FakeOp::SendChat).await?;
        self.chat_ages.lock().unwrap().push(request.age);

        let id = match request.conversation_id.clone() {
            Some(id) => id,
            None => {
                let id = self
                    .next_conversation_id
                    .lock()
                    .unwrap()
                    .take()
                    .unwrap_or_else(|| format!("conv-{}", self.sequence.fetch_add(1, Ordering::Relaxed)));
                self.insert(Conversation::saved(&id, DEFAULT_TITLE, Utc::now()));
                id
            }
        };

        let reply = format!("Trả lời: {}", request.message);
        let sources = vec![Source {
            title: "Nhu cầu dinh dưỡng khuyến nghị".to_string(),
            url: Some("https://example.org/rda".to_string()),
            snippet: None,
        }];
        let user_id = self.next_message_id(&id);
        let bot_id = self.next_message_id(&id);
        let reply_sources = sources.clone();
        let reply_text = reply.clone();
        self.with_conversation(&id, move |conversation| {
            let now = Utc::now();
            conversation.age_context.get_or_insert(request.age);
            conversation.messages.push(Message::committed(
                user_id,
                MessageRole::User,
                request.message,
                now,
            ));
            conversation.messages.push(
                Message::committed(bot_id, MessageRole::Bot, reply_text, now + Duration::milliseconds(1))
                    .with_sources(reply_sources),
            );
        })?;

        Ok(ChatReply {
            conversation_id: Some(id),
            reply: Some(reply),
            sources,
        })
    }

    async fn list_conversations(&self, include_archived: bool) -> Result<Vec<ConversationSummary>> {
        self.enter(FakeOp::ListConversations).await?;
        let mut summaries: Vec<ConversationSummary> = self
            .conversations
            .lock()
            .unwrap()
            .values()
            .filter(|c| include_archived || !c.archived)
            .filter_map(Conversation::summary)
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn get_conversation(&self, id: &str) -> Result<Conversation> {
        // Answers with the state at request time, even when held by a gate.
        let detail = self.stored(id);
        self.enter(FakeOp::GetConversation).await?;
        detail.ok_or_else(|| NutriError::not_found("Conversation", id))
    }

    async fn rename_conversation(&self, id: &str, title: &str) -> Result<()> {
        self.enter(FakeOp::RenameConversation).await?;
        self.with_conversation(id, |c| c.title = title.to_string())
    }

    async fn delete_conversation(&self, id: &str) -> Result<()> {
        self.enter(FakeOp::DeleteConversation).await?;
        self.conversations
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| NutriError::not_found("Conversation", id))
    }

    async fn archive_conversation(&self, id: &str) -> Result<()> {
        self.enter(FakeOp::ArchiveConversation).await?;
        self.with_conversation(id, |c| c.archived = true)
    }

    async fn unarchive_conversation(&self, id: &str) -> Result<()> {
        self.enter(FakeOp::UnarchiveConversation).await?;
        self.with_conversation(id, |c| c.archived = false)
    }

    async fn edit_message(&self, conversation_id: &str, message_id: &str, content: &str) -> Result<()> {
        self.enter(FakeOp::EditMessage).await?;
        let bot_id = self.next_message_id(conversation_id);
        self.with_conversation(conversation_id, |conversation| {
            let (index, _) = conversation.find_server_message(message_id)?;
            conversation.truncate_after(index);
            conversation.messages[index].apply_edit(content);
            conversation.messages.push(Message::committed(
                bot_id,
                MessageRole::Bot,
                format!("Trả lời: {}", content),
                Utc::now(),
            ));
            Ok(())
        })?
    }

    async fn switch_version(&self, conversation_id: &str, message_id: &str, version: usize) -> Result<()> {
        self.enter(FakeOp::SwitchVersion).await?;
        self.with_conversation(conversation_id, |conversation| {
            let (index, _) = conversation.find_server_message(message_id)?;
            conversation.messages[index].select_version(version).map(|_| ())
        })?
    }

    async fn regenerate(&self, conversation_id: &str, message_id: &str, age: AgeContext) -> Result<()> {
        self.enter(FakeOp::Regenerate).await?;
        self.regenerate_ages.lock().unwrap().push(age);
        self.with_conversation(conversation_id, |conversation| {
            let (index, _) = conversation.find_server_message(message_id)?;
            let message = &mut conversation.messages[index];
            let mut versions = message.versions.clone();
            versions.push(format!("regenerated {} for age {}", versions.len() + 1, age));
            let selected = versions.len();
            *message = message.clone().with_versions(versions, selected);
            Ok(())
        })?
    }

    async fn delete_and_following(&self, conversation_id: &str, message_id: &str) -> Result<()> {
        self.enter(FakeOp::DeleteAndFollowing).await?;
        self.with_conversation(conversation_id, |conversation| {
            let (index, _) = conversation.find_server_message(message_id)?;
            conversation.truncate_from(index);
            Ok(())
        })?
    }
}
