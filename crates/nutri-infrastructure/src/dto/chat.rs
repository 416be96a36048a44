use nutri_core::conversation::{ChatReply, ChatRequest, Source};
use serde::{Deserialize, Serialize};

/// Body of `POST /chat`.
#[derive(Debug, Serialize)]
pub struct ChatRequestDto<'a> {
    pub message: &'a str,
    pub age: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<&'a str>,
}

impl<'a> From<&'a ChatRequest> for ChatRequestDto<'a> {
    fn from(request: &'a ChatRequest) -> Self {
        Self {
            message: &request.message,
            age: request.age.years(),
            conversation_id: request.conversation_id.as_deref(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatPayload {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(default)]
    pub sources: Vec<Source>,
}

impl From<ChatPayload> for ChatReply {
    fn from(payload: ChatPayload) -> Self {
        ChatReply {
            conversation_id: payload.conversation_id,
            reply: payload.reply,
            sources: payload.sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nutri_core::age::AgeContext;

    #[test]
    fn test_first_message_omits_conversation_id() {
        let request = ChatRequest {
            message: "Trẻ 2 tuổi nên ăn gì?".to_string(),
            age: AgeContext::new(2).unwrap(),
            conversation_id: None,
        };
        let json = serde_json::to_value(ChatRequestDto::from(&request)).unwrap();
        assert_eq!(json["age"], 2);
        assert!(json.get("conversation_id").is_none());
    }

    #[test]
    fn test_payload_with_sources() {
        let payload: ChatPayload = serde_json::from_str(
            r#"{"conversation_id": "abc123", "reply": "Cháo", "sources": [{"title": "WHO"}]}"#,
        )
        .unwrap();
        let reply = ChatReply::from(payload);
        assert_eq!(reply.conversation_id.as_deref(), Some("abc123"));
        assert_eq!(reply.sources[0].title, "WHO");
        assert!(reply.sources[0].url.is_none());
    }
}
