//! Credential store trait.
//!
//! Defines the interface for the signed-in identity used to authenticate
//! requests against the chat backend.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{NutriError, Result};

/// Bearer token plus the id of the signed-in user.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub token: String,
    pub user_id: String,
}

// Never print the token.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Source of the current session identity.
///
/// # Security Note
///
/// Implementations must never log the token or include it in error messages.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns the current credentials, or `None` when nobody is signed in.
    async fn credentials(&self) -> Option<Credentials>;

    /// Returns the credentials or `Unauthenticated`.
    async fn require(&self) -> Result<Credentials> {
        self.credentials().await.ok_or(NutriError::Unauthenticated)
    }
}
