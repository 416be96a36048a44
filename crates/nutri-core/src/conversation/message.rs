//! Chat message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{AsRefStr, Display, EnumString};

use crate::error::{Result, ValidationError};

/// Who wrote a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageRole {
    User,
    #[serde(alias = "assistant")]
    #[strum(to_string = "bot", serialize = "assistant")]
    Bot,
}

/// Identity of a message: confirmed by the server, or a client placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MessageId {
    Server(String),
    Temp(String),
}

impl MessageId {
    pub fn server(id: impl Into<String>) -> Self {
        Self::Server(id.into())
    }

    pub fn temp(id: impl Into<String>) -> Self {
        Self::Temp(id.into())
    }

    pub fn is_temp(&self) -> bool {
        matches!(self, Self::Temp(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Server(id) | Self::Temp(id) => id,
        }
    }

    /// The server id, or `UnconfirmedMessage` for a temp id.
    pub fn server_id(&self) -> Result<&str> {
        match self {
            Self::Server(id) => Ok(id),
            Self::Temp(id) => Err(ValidationError::UnconfirmedMessage(id.clone()).into()),
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A citation attached to a bot answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
}

/// What the user currently sees for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    /// Optimistic entry not yet confirmed by the server.
    Pending,
    /// Waiting for a (re)generated answer.
    Regenerating,
    Committed,
}

/// A single message in a conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: MessageRole,
    /// Displayed content; mirrors the selected version once committed.
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_edited: bool,
    /// Alternative contents, never empty.
    pub versions: Vec<String>,
    /// 1-indexed position in `versions`.
    pub current_version_index: usize,
    pub sources: Vec<Source>,
    pub pending: bool,
    pub regenerating: bool,
}

impl Message {
    /// A message as confirmed by the server, with a single version.
    pub fn committed(
        id: MessageId,
        role: MessageRole,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let content = content.into();
        Self {
            id,
            role,
            versions: vec![content.clone()],
            content,
            timestamp,
            is_edited: false,
            current_version_index: 1,
            sources: Vec::new(),
            pending: false,
            regenerating: false,
        }
    }

    /// Optimistic user entry shown before the round trip.
    pub fn pending_user(temp_id: impl Into<String>, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        let mut message = Self::committed(MessageId::temp(temp_id), MessageRole::User, content, timestamp);
        message.pending = true;
        message
    }

    /// Empty bot entry waiting for its answer.
    pub fn bot_placeholder(temp_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        let mut message = Self::committed(MessageId::temp(temp_id), MessageRole::Bot, "", timestamp);
        message.pending = true;
        message.regenerating = true;
        message
    }

    /// Replaces the versions, clamping the selected index into range.
    pub fn with_versions(mut self, versions: Vec<String>, current_version_index: usize) -> Self {
        if !versions.is_empty() {
            self.versions = versions;
        }
        self.current_version_index = current_version_index.clamp(1, self.versions.len());
        self.content = self.versions[self.current_version_index - 1].clone();
        self
    }

    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = sources;
        self
    }

    pub fn state(&self) -> MessageState {
        if self.regenerating {
            MessageState::Regenerating
        } else if self.pending {
            MessageState::Pending
        } else {
            MessageState::Committed
        }
    }

    pub fn current_version(&self) -> &str {
        &self.versions[self.current_version_index - 1]
    }

    /// Checks that `version` is a valid 1-indexed position.
    pub fn check_version(&self, version: usize) -> Result<()> {
        if version == 0 || version > self.versions.len() {
            return Err(ValidationError::VersionOutOfRange {
                requested: version,
                available: self.versions.len(),
            }
            .into());
        }
        Ok(())
    }

    /// Selects a version. Returns `false` when it was already selected.
    pub fn select_version(&mut self, version: usize) -> Result<bool> {
        self.check_version(version)?;
        if self.current_version_index == version {
            return Ok(false);
        }
        self.current_version_index = version;
        self.content = self.versions[version - 1].clone();
        Ok(true)
    }

    pub fn begin_regenerate(&mut self) {
        self.regenerating = true;
        self.content.clear();
    }

    /// A temp bot entry still waiting for its first answer.
    pub fn is_unanswered_placeholder(&self) -> bool {
        self.id.is_temp()
            && self.role == MessageRole::Bot
            && self.regenerating
            && self.content.is_empty()
    }

    /// Drops any in-flight flag and shows the selected version again.
    pub fn settle(&mut self) {
        self.pending = false;
        if self.regenerating {
            self.regenerating = false;
            self.content = self.current_version().to_string();
        }
    }

    /// Rewrites a user message in place after an edit.
    pub fn apply_edit(&mut self, content: impl Into<String>) {
        let content = content.into();
        self.versions = vec![content.clone()];
        self.current_version_index = 1;
        self.content = content;
        self.is_edited = true;
    }
}
