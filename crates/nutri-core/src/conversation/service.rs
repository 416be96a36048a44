//! Remote chat service trait.
//!
//! Defines the boundary to the chat backend. The backend is opaque: the client
//! only relies on the request/response contract below and re-fetches full
//! conversation detail after every mutation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::message::Source;
use super::model::{Conversation, ConversationSummary};
use crate::age::AgeContext;
use crate::error::Result;

/// Body of a chat send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub age: AgeContext,
    /// `None` asks the server to create a new conversation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// Successful answer to a chat send.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatReply {
    /// Set when the server created (or confirmed) the conversation.
    pub conversation_id: Option<String>,
    pub reply: Option<String>,
    #[serde(default)]
    pub sources: Vec<Source>,
}

/// An abstract client for the chat backend.
///
/// Every method maps to one request. `success: false` answers surface as
/// `NutriError::Server` carrying the server's message, transport failures as
/// `NutriError::Network`.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Sends a user message and waits for the bot reply.
    async fn send_chat(&self, request: ChatRequest) -> Result<ChatReply>;

    async fn list_conversations(&self, include_archived: bool) -> Result<Vec<ConversationSummary>>;

    /// Fetches the authoritative detail of a conversation.
    async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation>;

    async fn rename_conversation(&self, conversation_id: &str, title: &str) -> Result<()>;

    async fn delete_conversation(&self, conversation_id: &str) -> Result<()>;

    async fn archive_conversation(&self, conversation_id: &str) -> Result<()>;

    async fn unarchive_conversation(&self, conversation_id: &str) -> Result<()>;

    /// Replaces a user message and discards everything after it server-side.
    async fn edit_message(&self, conversation_id: &str, message_id: &str, content: &str) -> Result<()>;

    /// Persists the selected (1-indexed) version of a bot message.
    async fn switch_version(&self, conversation_id: &str, message_id: &str, version: usize) -> Result<()>;

    /// Generates a new version of a bot message for the given age.
    async fn regenerate(&self, conversation_id: &str, message_id: &str, age: AgeContext) -> Result<()>;

    /// Deletes a message and every message after it.
    async fn delete_and_following(&self, conversation_id: &str, message_id: &str) -> Result<()>;
}
