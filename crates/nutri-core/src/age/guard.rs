//! Age-context guard.
//!
//! Decides whether a send or regenerate may go out for a conversation given the
//! age selected for the current session. The guard only reports; resolving a
//! mismatch (fork or revert) is always left to the caller.

use serde::{Deserialize, Serialize};

use super::model::AgeContext;
use crate::conversation::Conversation;
use crate::error::{NutriError, Result, ValidationError};

/// Verdict of [`can_send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeCheck {
    /// The request may be sent with this age.
    Allowed(AgeContext),
    /// No session age exists; an age has to be selected first.
    MissingAge,
    /// The conversation already has messages and is pinned to another age.
    Mismatch {
        pinned: AgeContext,
        session: AgeContext,
    },
}

impl AgeCheck {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }

    /// Converts the verdict into the age to send with, or the matching error.
    pub fn into_result(self) -> Result<AgeContext> {
        match self {
            Self::Allowed(age) => Ok(age),
            Self::MissingAge => Err(ValidationError::MissingAge.into()),
            Self::Mismatch { pinned, session } => Err(NutriError::AgeMismatch { pinned, session }),
        }
    }
}

/// How the caller chose to resolve an [`AgeCheck::Mismatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchResolution {
    /// Start a new conversation carrying the current session age.
    Fork,
    /// Set the session age back to the conversation's pinned age.
    RevertSessionAge,
}

/// The conversation's pinned age if set, otherwise the session age.
pub fn effective_age(
    conversation: &Conversation,
    session_age: Option<AgeContext>,
) -> Option<AgeContext> {
    conversation.age_context.or(session_age)
}

/// Checks whether a send/regenerate is permitted.
///
/// A conversation without messages can still be re-pinned, so it is sent with
/// the session age.
pub fn can_send(conversation: &Conversation, session_age: Option<AgeContext>) -> AgeCheck {
    let Some(session) = session_age else {
        return AgeCheck::MissingAge;
    };

    if !conversation.has_messages() {
        return AgeCheck::Allowed(session);
    }

    match conversation.age_context {
        Some(pinned) if pinned != session => AgeCheck::Mismatch { pinned, session },
        Some(pinned) => AgeCheck::Allowed(pinned),
        None => AgeCheck::Allowed(session),
    }
}
