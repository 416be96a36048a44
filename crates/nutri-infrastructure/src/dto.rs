//! Wire DTOs for the chat backend.
//!
//! Every response is wrapped in an [`Envelope`]; the payload types here are
//! converted into `nutri-core` models at the boundary.

pub mod chat;
pub mod conversation;
pub mod envelope;

pub use chat::{ChatPayload, ChatRequestDto};
pub use conversation::{
    ConversationDetailPayload, ConversationDto, ConversationListPayload, EditMessageRequest,
    MessageDto, RegenerateRequest, RenameRequest, SwitchVersionRequest,
};
pub use envelope::{Empty, Envelope};
