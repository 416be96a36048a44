//! Conversation domain module.
//!
//! # Module Structure
//!
//! - `model`: `Conversation`, `ConversationSummary`, title and fallback rules
//! - `message`: `Message`, `MessageId`, `MessageRole`, citations
//! - `service`: the `ChatService` boundary to the remote backend

mod message;
mod model;
mod service;

pub use message::{Message, MessageId, MessageRole, MessageState, Source};
pub use model::{
    Conversation, ConversationSummary, DEFAULT_TITLE, TITLE_MAX_CHARS, derive_title,
    fallback_selection,
};
pub use service::{ChatReply, ChatRequest, ChatService};
