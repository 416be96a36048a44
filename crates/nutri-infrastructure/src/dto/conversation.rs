use chrono::{DateTime, Utc};
use nutri_core::age::AgeContext;
use nutri_core::conversation::{
    Conversation, ConversationSummary, DEFAULT_TITLE, Message, MessageId, MessageRole, Source,
};
use serde::{Deserialize, Serialize};

fn first_version() -> usize {
    1
}

/// A message as the server sends it.
#[derive(Debug, Deserialize)]
pub struct MessageDto {
    pub id: String,
    /// `"user"`, `"bot"`, or `"assistant"`.
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_edited: bool,
    /// Missing or empty means `[content]`.
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default = "first_version")]
    pub current_version_index: usize,
    #[serde(default)]
    pub sources: Vec<Source>,
}

impl From<MessageDto> for Message {
    fn from(dto: MessageDto) -> Self {
        let mut message =
            Message::committed(MessageId::server(dto.id), dto.role, dto.content, dto.timestamp)
                .with_versions(dto.versions, dto.current_version_index)
                .with_sources(dto.sources);
        message.is_edited = dto.is_edited;
        message
    }
}

/// A conversation as listed or fetched. The list endpoint leaves out
/// `messages`.
#[derive(Debug, Deserialize)]
pub struct ConversationDto {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "age")]
    pub age_context: Option<AgeContext>,
    #[serde(default)]
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message_count: Option<usize>,
    #[serde(default)]
    pub messages: Vec<MessageDto>,
}

impl ConversationDto {
    fn title(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => DEFAULT_TITLE.to_string(),
        }
    }
}

impl From<ConversationDto> for Conversation {
    fn from(dto: ConversationDto) -> Self {
        let title = dto.title();
        let mut conversation = Conversation::saved(dto.id, title, dto.created_at);
        conversation.age_context = dto.age_context;
        conversation.archived = dto.archived;
        conversation.updated_at = dto.updated_at.unwrap_or(dto.created_at);
        conversation.messages = dto.messages.into_iter().map(Message::from).collect();
        conversation.sort_messages();
        conversation
    }
}

impl From<ConversationDto> for ConversationSummary {
    fn from(dto: ConversationDto) -> Self {
        ConversationSummary {
            title: dto.title(),
            message_count: dto.message_count.unwrap_or(dto.messages.len()),
            updated_at: dto.updated_at.unwrap_or(dto.created_at),
            id: dto.id,
            age_context: dto.age_context,
            archived: dto.archived,
            created_at: dto.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConversationListPayload {
    #[serde(default)]
    pub conversations: Vec<ConversationDto>,
}

#[derive(Debug, Deserialize)]
pub struct ConversationDetailPayload {
    pub conversation: ConversationDto,
}

#[derive(Debug, Serialize)]
pub struct RenameRequest<'a> {
    pub title: &'a str,
}

#[derive(Debug, Serialize)]
pub struct EditMessageRequest<'a> {
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SwitchVersionRequest {
    pub version: usize,
}

#[derive(Debug, Serialize)]
pub struct RegenerateRequest {
    pub age: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL: &str = r#"{
        "id": "abc123",
        "title": "Trẻ 2 tuổi nên ăn gì?",
        "age_context": 2,
        "created_at": "2026-03-01T08:00:00Z",
        "updated_at": "2026-03-01T08:05:00Z",
        "messages": [
            {"id": "m2", "role": "assistant", "content": "Cháo cá",
             "timestamp": "2026-03-01T08:00:05Z",
             "versions": ["Cháo gà", "Cháo cá"], "current_version_index": 2},
            {"id": "m1", "role": "user", "content": "Trẻ 2 tuổi nên ăn gì?",
             "timestamp": "2026-03-01T08:00:00Z"}
        ]
    }"#;

    #[test]
    fn test_detail_conversion() {
        let dto: ConversationDto = serde_json::from_str(DETAIL).unwrap();
        let conversation = Conversation::from(dto);

        assert_eq!(conversation.id.as_deref(), Some("abc123"));
        assert_eq!(conversation.age_context, Some(AgeContext::new(2).unwrap()));
        // Sorted by timestamp.
        assert_eq!(conversation.messages[0].id, MessageId::server("m1"));
        assert_eq!(conversation.messages[0].versions, vec!["Trẻ 2 tuổi nên ăn gì?"]);

        let bot = &conversation.messages[1];
        assert_eq!(bot.role, MessageRole::Bot);
        assert_eq!(bot.current_version_index, 2);
        assert_eq!(bot.content, "Cháo cá");
    }

    #[test]
    fn test_out_of_range_version_index_is_clamped() {
        let dto: MessageDto = serde_json::from_str(
            r#"{"id": "m1", "role": "bot", "content": "a", "timestamp": "2026-03-01T08:00:00Z",
                "versions": ["a", "b"], "current_version_index": 7}"#,
        )
        .unwrap();
        assert_eq!(Message::from(dto).current_version_index, 2);
    }

    #[test]
    fn test_summary_from_list_entry() {
        let dto: ConversationDto = serde_json::from_str(
            r#"{"id": "c9", "title": "  ", "created_at": "2026-03-01T08:00:00Z", "message_count": 6}"#,
        )
        .unwrap();
        let summary = ConversationSummary::from(dto);
        assert_eq!(summary.title, DEFAULT_TITLE);
        assert_eq!(summary.message_count, 6);
        assert_eq!(summary.updated_at, summary.created_at);
        assert!(summary.age_context.is_none());
    }

    #[test]
    fn test_invalid_age_is_rejected() {
        let result: Result<ConversationDto, _> = serde_json::from_str(
            r#"{"id": "c9", "age_context": 40, "created_at": "2026-03-01T08:00:00Z"}"#,
        );
        assert!(result.is_err());
    }
}
