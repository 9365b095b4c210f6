//! Generic OpenAI-compatible provider.
//! Gemini, OpenAI and most hosted LLM APIs accept the same `/chat/completions` format,
//! including multimodal `image_url` content parts.

use crate::providers::traits::{ChatMessage, ModelReply, Provider, ProviderError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// A provider that speaks the OpenAI-compatible chat completions API.
pub struct OpenAiCompatibleProvider {
    pub(crate) name: String,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    /// Env var named in the missing-credential error.
    credential_hint: String,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(name: &str, base_url: &str, api_key: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(ToString::to_string),
            credential_hint: "CHATRELAY_API_KEY".to_string(),
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Name the env var suggested when the key is missing.
    pub fn with_credential_hint(mut self, hint: &str) -> Self {
        self.credential_hint = hint.to_string();
        self
    }

    /// Build the full URL for chat completions, detecting if base_url already includes the path.
    fn chat_completions_url(&self) -> String {
        let has_full_endpoint = reqwest::Url::parse(&self.base_url)
            .map(|url| {
                url.path()
                    .trim_end_matches('/')
                    .ends_with("/chat/completions")
            })
            .unwrap_or_else(|_| {
                self.base_url
                    .trim_end_matches('/')
                    .ends_with("/chat/completions")
            });

        if has_full_endpoint {
            self.base_url.clone()
        } else {
            format!("{}/chat/completions", self.base_url)
        }
    }

    fn transport_error(&self, source: reqwest::Error) -> ProviderError {
        ProviderError::Transport {
            provider: self.name.clone(),
            source,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ApiChatResponse {
    fn into_reply(self) -> Option<ModelReply> {
        let Self {
            choices,
            id,
            model,
            usage,
        } = self;
        let choice = choices.into_iter().next()?;

        Some(ModelReply {
            text: choice.message.content.unwrap_or_default(),
            metadata: serde_json::json!({
                "id": id,
                "model": model,
                "usage": usage,
                "finish_reason": choice.finish_reason,
            }),
        })
    }
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: f64,
    ) -> Result<ModelReply, ProviderError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ProviderError::MissingCredential {
                provider: self.name.clone(),
                hint: self.credential_hint.clone(),
            })?;

        let request = ChatRequest {
            model,
            messages,
            temperature,
        };

        let url = self.chat_completions_url();
        tracing::debug!(
            provider = %self.name,
            model,
            messages = messages.len(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read provider error body>".to_string());
            return Err(ProviderError::Api {
                provider: self.name.clone(),
                status,
                body: super::sanitize_api_error(&body),
            });
        }

        let chat_response: ApiChatResponse = response
            .json()
            .await
            .map_err(|e| self.transport_error(e))?;

        chat_response
            .into_reply()
            .ok_or_else(|| ProviderError::EmptyResponse {
                provider: self.name.clone(),
            })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::traits::ContentPart;
    use mockito::Matcher;
    use serde_json::json;

    fn make_provider(name: &str, url: &str, key: Option<&str>) -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new(name, url, key)
    }

    #[test]
    fn creates_with_key() {
        let p = make_provider(
            "gemini",
            "https://generativelanguage.googleapis.com/v1beta/openai",
            Some("g-key"),
        );
        assert_eq!(p.name, "gemini");
        assert_eq!(
            p.base_url,
            "https://generativelanguage.googleapis.com/v1beta/openai"
        );
        assert_eq!(p.api_key.as_deref(), Some("g-key"));
    }

    #[test]
    fn strips_trailing_slash() {
        let p = make_provider("test", "https://example.com/", None);
        assert_eq!(p.base_url, "https://example.com");
    }

    #[tokio::test]
    async fn chat_fails_without_key() {
        let p = make_provider("gemini", "https://example.invalid", None)
            .with_credential_hint("GEMINI_API_KEY");
        let err = p
            .chat(&[ChatMessage::user("hello")], "gemini-2.0-flash", 0.7)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MissingCredential { .. }));
        assert!(err.to_string().contains("gemini API key not set"));
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn request_serializes_multimodal_history() {
        let messages = vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
            ChatMessage::user_parts(vec![
                ContentPart::text("and this?"),
                ContentPart::image_url("data:image/jpeg;base64,AAAA"),
            ]),
        ];
        let req = ChatRequest {
            model: "gemini-2.0-flash",
            messages: &messages,
            temperature: 0.4,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["model"], "gemini-2.0-flash");
        assert_eq!(value["messages"].as_array().unwrap().len(), 3);
        assert_eq!(value["messages"][1]["content"], "hello");
        assert_eq!(value["messages"][2]["content"][1]["type"], "image_url");
    }

    #[test]
    fn response_deserializes_with_metadata() {
        let raw = r#"{
            "id": "chatcmpl-1",
            "model": "gemini-2.0-flash",
            "choices": [{"message": {"role": "assistant", "content": "Hello!"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
        }"#;
        let resp: ApiChatResponse = serde_json::from_str(raw).unwrap();
        let reply = resp.into_reply().unwrap();
        assert_eq!(reply.text, "Hello!");
        assert_eq!(reply.metadata["finish_reason"], "stop");
        assert_eq!(reply.metadata["usage"]["total_tokens"], 5);
        assert_eq!(reply.metadata["model"], "gemini-2.0-flash");
    }

    #[test]
    fn response_empty_choices_has_no_reply() {
        let resp: ApiChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(resp.into_reply().is_none());
    }

    #[test]
    fn chat_completions_url_standard_openai() {
        let p = make_provider("openai", "https://api.openai.com/v1", None);
        assert_eq!(
            p.chat_completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn chat_completions_url_gemini_openai_compat() {
        let p = make_provider(
            "gemini",
            "https://generativelanguage.googleapis.com/v1beta/openai/",
            None,
        );
        assert_eq!(
            p.chat_completions_url(),
            "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
        );
    }

    #[test]
    fn chat_completions_url_custom_full_endpoint() {
        let p = make_provider(
            "custom",
            "https://my-api.example.com/v2/llm/chat/completions",
            None,
        );
        assert_eq!(
            p.chat_completions_url(),
            "https://my-api.example.com/v2/llm/chat/completions"
        );
    }

    #[test]
    fn chat_completions_url_requires_exact_suffix_match() {
        let p = make_provider(
            "custom",
            "https://my-api.example.com/v2/llm/chat/completions-proxy",
            None,
        );
        assert_eq!(
            p.chat_completions_url(),
            "https://my-api.example.com/v2/llm/chat/completions-proxy/chat/completions"
        );
    }

    #[tokio::test]
    async fn chat_posts_full_context_and_parses_reply() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(json!({
                "model": "gemini-2.0-flash",
                "messages": [
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "hello"},
                    {"role": "user", "content": "how are you?"}
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"model":"gemini-2.0-flash","choices":[{"message":{"content":"fine"},"finish_reason":"stop"}]}"#,
            )
            .create_async()
            .await;

        let p = make_provider("gemini", &server.url(), Some("test-key"));
        let reply = p
            .chat(
                &[
                    ChatMessage::user("hi"),
                    ChatMessage::assistant("hello"),
                    ChatMessage::user("how are you?"),
                ],
                "gemini-2.0-flash",
                0.7,
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(reply.text, "fine");
        assert_eq!(reply.metadata["finish_reason"], "stop");
    }

    #[tokio::test]
    async fn chat_surfaces_sanitized_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("invalid key sk-abcdef123456")
            .create_async()
            .await;

        let p = make_provider("openai", &server.url(), Some("sk-abcdef123456"));
        let err = p
            .chat(&[ChatMessage::user("hi")], "gpt-4o-mini", 0.7)
            .await
            .unwrap_err();

        match &err {
            ProviderError::Api { status, body, .. } => {
                assert_eq!(status.as_u16(), 401);
                assert!(body.contains("[REDACTED]"));
                assert!(!body.contains("sk-abcdef123456"));
            }
            other => panic!("expected API error, got {other:?}"),
        }
        assert!(err.to_string().starts_with("openai API error (401"));
    }

    #[tokio::test]
    async fn chat_reports_empty_choices() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let p = make_provider("gemini", &server.url(), Some("k"));
        let err = p
            .chat(&[ChatMessage::user("hi")], "gemini-2.0-flash", 0.7)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse { .. }));
        assert_eq!(err.to_string(), "No response from gemini");
    }
}
