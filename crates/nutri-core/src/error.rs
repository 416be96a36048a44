//! Error types for the nutrition chat client.

use thiserror::Error;

use crate::age::AgeContext;

/// Input problems caught before any network call or local mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// No session age has been chosen yet.
    #[error("an age must be selected before sending")]
    MissingAge,

    /// Age outside of the supported 1–19 range.
    #[error("age {0} is out of range (expected 1-19)")]
    InvalidAge(u8),

    #[error("message content is empty")]
    EmptyContent,

    #[error("message '{0}' is not a user message")]
    NotUserMessage(String),

    #[error("message '{0}' is not a bot message")]
    NotBotMessage(String),

    /// Requested version is outside `1..=available`.
    #[error("version {requested} is out of range (1-{available})")]
    VersionOutOfRange { requested: usize, available: usize },

    /// The message still carries a temp id and has no server counterpart.
    #[error("message '{0}' has not been confirmed by the server yet")]
    UnconfirmedMessage(String),

    /// The operation needs a server-side conversation id.
    #[error("conversation has not been saved yet")]
    UnsavedConversation,

    #[error("no conversation is active")]
    NoActiveConversation,
}

/// A shared error type for the whole client.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NutriError {
    /// Rejected synchronously; nothing was mutated and nothing was sent.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The conversation is pinned to an age that differs from the session age.
    #[error("Age mismatch: conversation is pinned to age {pinned}, session age is {session}")]
    AgeMismatch {
        pinned: AgeContext,
        session: AgeContext,
    },

    /// Transport failure (connection, timeout, undecodable response).
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered `success: false`. The message is shown verbatim.
    #[error("{0}")]
    Server(String),

    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Another transcript operation is already running for this conversation.
    #[error("An operation is already in progress for conversation '{0}'")]
    Busy(String),

    /// No credentials are available; the user has to sign in first.
    #[error("Not signed in")]
    Unauthenticated,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl NutriError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::Server(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Age mismatch; the caller must choose between forking and reverting.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AgeMismatch { .. })
    }

    /// Errors produced by the remote service, which roll back optimistic changes.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for NutriError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("JSON: {}", err))
    }
}

impl From<toml::de::Error> for NutriError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("TOML: {}", err))
    }
}

impl From<toml::ser::Error> for NutriError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Config(format!("TOML: {}", err))
    }
}

impl From<std::io::Error> for NutriError {
    fn from(err: std::io::Error) -> Self {
        Self::Config(format!("{} (kind: {:?})", err, err.kind()))
    }
}

/// A type alias for `Result<T, NutriError>`.
pub type Result<T> = std::result::Result<T, NutriError>;
