//! HTTP implementation of [`ChatService`] on reqwest.

use crate::dto::{
    ChatPayload, ChatRequestDto, ConversationDetailPayload, ConversationListPayload,
    EditMessageRequest, Empty, Envelope, RegenerateRequest, RenameRequest, SwitchVersionRequest,
};
use async_trait::async_trait;
use nutri_core::age::AgeContext;
use nutri_core::config::ClientConfig;
use nutri_core::conversation::{
    ChatReply, ChatRequest, ChatService, Conversation, ConversationSummary,
};
use nutri_core::credential::CredentialStore;
use nutri_core::error::{NutriError, Result};
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

const USER_ID_HEADER: &str = "X-User-Id";

/// Chat backend client.
///
/// Every request carries `Authorization: Bearer <token>` and the user id
/// header; without credentials no request is sent at all.
#[derive(Clone)]
pub struct HttpChatService {
    client: Client,
    base_url: Url,
    credentials: Arc<dyn CredentialStore>,
}

impl HttpChatService {
    pub fn new(config: &ClientConfig, credentials: Arc<dyn CredentialStore>) -> Result<Self> {
        let base_url = Url::parse(&config.api_base_url).map_err(|e| {
            NutriError::config(format!("Invalid api_base_url '{}': {}", config.api_base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(NutriError::config(format!(
                "api_base_url '{}' cannot be used as a base URL",
                config.api_base_url
            )));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| NutriError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    /// Appends percent-encoded path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| NutriError::config("api_base_url cannot be used as a base URL"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn request(&self, method: Method, url: Url) -> Result<RequestBuilder> {
        let credentials = self.credentials.require().await?;
        Ok(self
            .client
            .request(method, url)
            .bearer_auth(&credentials.token)
            .header(USER_ID_HEADER, &credentials.user_id))
    }

    async fn call<T: DeserializeOwned>(&self, method: Method, url: Url) -> Result<T> {
        tracing::debug!("[HttpChatService] {} {}", method, url.path());
        let builder = self.request(method, url).await?;
        execute(builder).await
    }

    async fn call_with<B: Serialize + ?Sized>(&self, method: Method, url: Url, body: &B) -> Result<()> {
        tracing::debug!("[HttpChatService] {} {}", method, url.path());
        let builder = self.request(method, url).await?.json(body);
        execute::<Empty>(builder).await.map(|_| ())
    }
}

async fn execute<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T> {
    let response = builder.send().await.map_err(|e| {
        if e.is_timeout() {
            NutriError::network("Request timed out")
        } else {
            NutriError::network(format!("Request failed: {}", e))
        }
    })?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| NutriError::network(format!("Failed to read response: {}", e)))?;
    decode(status, &body)
}

/// Unwraps a response envelope.
///
/// `success: false` becomes `Server` with the server's message verbatim. A
/// non-2xx status without an error message becomes `Network`.
pub(crate) fn decode<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T> {
    let head = serde_json::from_str::<Envelope<Empty>>(body);

    if !status.is_success() {
        return Err(match head {
            Ok(Envelope {
                error: Some(message),
                ..
            }) => NutriError::Server(message),
            _ => NutriError::network(format!("HTTP {}", status.as_u16())),
        });
    }

    let head = head.map_err(|e| NutriError::network(format!("Invalid response: {}", e)))?;
    if !head.success {
        return Err(NutriError::Server(
            head.error.unwrap_or_else(|| "Request failed".to_string()),
        ));
    }

    serde_json::from_str::<Envelope<T>>(body)
        .map(|envelope| envelope.payload)
        .map_err(|e| NutriError::network(format!("Invalid response: {}", e)))
}

#[async_trait]
impl ChatService for HttpChatService {
    async fn send_chat(&self, request: ChatRequest) -> Result<ChatReply> {
        let url = self.endpoint(&["chat"])?;
        tracing::debug!(
            "[HttpChatService] POST /chat (conversation: {:?}, age: {})",
            request.conversation_id,
            request.age
        );
        let builder = self
            .request(Method::POST, url)
            .await?
            .json(&ChatRequestDto::from(&request));
        let payload: ChatPayload = execute(builder).await?;
        Ok(payload.into())
    }

    async fn list_conversations(&self, include_archived: bool) -> Result<Vec<ConversationSummary>> {
        let mut url = self.endpoint(&["conversations"])?;
        url.query_pairs_mut()
            .append_pair("include_archived", if include_archived { "true" } else { "false" });
        let payload: ConversationListPayload = self.call(Method::GET, url).await?;
        Ok(payload
            .conversations
            .into_iter()
            .map(ConversationSummary::from)
            .collect())
    }

    async fn get_conversation(&self, id: &str) -> Result<Conversation> {
        let url = self.endpoint(&["conversations", id])?;
        let payload: ConversationDetailPayload = self.call(Method::GET, url).await?;
        Ok(payload.conversation.into())
    }

    async fn rename_conversation(&self, id: &str, title: &str) -> Result<()> {
        let url = self.endpoint(&["conversations", id])?;
        self.call_with(Method::PUT, url, &RenameRequest { title }).await
    }

    async fn delete_conversation(&self, id: &str) -> Result<()> {
        let url = self.endpoint(&["conversations", id])?;
        self.call::<Empty>(Method::DELETE, url).await.map(|_| ())
    }

    async fn archive_conversation(&self, id: &str) -> Result<()> {
        let url = self.endpoint(&["conversations", id, "archive"])?;
        self.call::<Empty>(Method::POST, url).await.map(|_| ())
    }

    async fn unarchive_conversation(&self, id: &str) -> Result<()> {
        let url = self.endpoint(&["conversations", id, "unarchive"])?;
        self.call::<Empty>(Method::POST, url).await.map(|_| ())
    }

    async fn edit_message(&self, conversation_id: &str, message_id: &str, content: &str) -> Result<()> {
        let url = self.endpoint(&["conversations", conversation_id, "messages", message_id])?;
        self.call_with(Method::PUT, url, &EditMessageRequest { content })
            .await
    }

    async fn switch_version(&self, conversation_id: &str, message_id: &str, version: usize) -> Result<()> {
        let url = self.endpoint(&[
            "conversations",
            conversation_id,
            "messages",
            message_id,
            "version",
        ])?;
        self.call_with(Method::PUT, url, &SwitchVersionRequest { version })
            .await
    }

    async fn regenerate(&self, conversation_id: &str, message_id: &str, age: AgeContext) -> Result<()> {
        let url = self.endpoint(&[
            "conversations",
            conversation_id,
            "messages",
            message_id,
            "regenerate",
        ])?;
        self.call_with(Method::POST, url, &RegenerateRequest { age: age.years() })
            .await
    }

    async fn delete_and_following(&self, conversation_id: &str, message_id: &str) -> Result<()> {
        let url = self.endpoint(&[
            "conversations",
            conversation_id,
            "messages",
            message_id,
            "following",
        ])?;
        self.call::<Empty>(Method::DELETE, url).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nutri_core::credential::Credentials;

    struct NoCredentials;

    #[async_trait]
    impl CredentialStore for NoCredentials {
        async fn credentials(&self) -> Option<Credentials> {
            None
        }
    }

    fn service(base: &str) -> HttpChatService {
        let config = ClientConfig {
            api_base_url: base.to_string(),
            ..ClientConfig::default()
        };
        HttpChatService::new(&config, Arc::new(NoCredentials)).unwrap()
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let service = service("http://localhost:8000/api/");
        let url = service.endpoint(&["conversations", "a/b", "archive"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/conversations/a%2Fb/archive");
    }

    #[test]
    fn test_invalid_base_url() {
        let config = ClientConfig {
            api_base_url: "not a url".to_string(),
            ..ClientConfig::default()
        };
        let result = HttpChatService::new(&config, Arc::new(NoCredentials));
        assert!(matches!(result, Err(NutriError::Config(_))));
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_before_sending() {
        // Port 9 (discard) is never contacted: the credential check comes first.
        let service = service("http://127.0.0.1:9/api");
        let err = service.list_conversations(false).await.unwrap_err();
        assert_eq!(err, NutriError::Unauthenticated);
    }

    #[test]
    fn test_decode_success_payload() {
        let payload: ChatPayload = decode(
            StatusCode::OK,
            r#"{"success": true, "conversation_id": "abc123", "reply": "Cháo"}"#,
        )
        .unwrap();
        assert_eq!(payload.conversation_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_decode_server_error_verbatim() {
        let err = decode::<Empty>(
            StatusCode::OK,
            r#"{"success": false, "error": "Tuổi không hợp lệ"}"#,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Tuổi không hợp lệ");

        let err = decode::<Empty>(
            StatusCode::BAD_REQUEST,
            r#"{"success": false, "error": "Thiếu nội dung"}"#,
        )
        .unwrap_err();
        assert_eq!(err, NutriError::Server("Thiếu nội dung".to_string()));
    }

    #[test]
    fn test_decode_bare_http_error() {
        let err = decode::<Empty>(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>").unwrap_err();
        assert_eq!(err, NutriError::Network("HTTP 502".to_string()));
    }

    #[test]
    fn test_decode_garbage_success_body() {
        let err = decode::<Empty>(StatusCode::OK, "not json").unwrap_err();
        assert!(err.is_remote());
    }
}
