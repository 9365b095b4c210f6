use std::sync::Arc;

use crate::media::{to_data_uri, ImageMimePolicy};
use crate::providers::{ChatMessage, ContentPart, ModelReply, Provider, ProviderError};

/// Failure of a single model invocation.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// The user message that was sent and the reply it produced.
#[derive(Debug, Clone)]
pub struct Turn {
    pub user: ChatMessage,
    pub reply: ModelReply,
}

/// Assembles the outbound user message and calls the model with the prior history.
pub struct ModelInvoker {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f64,
    image_mime: ImageMimePolicy,
    system_prompt: Option<String>,
}

impl ModelInvoker {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, temperature: f64) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            image_mime: ImageMimePolicy::default(),
            system_prompt: None,
        }
    }

    /// Blank prompts are ignored.
    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn with_image_mime(mut self, policy: ImageMimePolicy) -> Self {
        self.image_mime = policy;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Text part first; an image, when present, follows as a data URI part.
    pub fn build_user_message(&self, message: &str, image: Option<&[u8]>) -> ChatMessage {
        let mut parts = vec![ContentPart::text(message)];
        if let Some(bytes) = image {
            let mime = self.image_mime.mime_for(bytes);
            parts.push(ContentPart::image_url(to_data_uri(mime, bytes)));
        }
        ChatMessage::user_parts(parts)
    }

    /// Send `[system?] + history + [user]` to the model. History is passed
    /// through untruncated; the system prompt is never part of the returned turn.
    pub async fn invoke(
        &self,
        message: &str,
        image: Option<&[u8]>,
        history: &[ChatMessage],
    ) -> Result<Turn, InvokeError> {
        let user = self.build_user_message(message, image);

        let mut context = Vec::with_capacity(history.len() + 2);
        if let Some(prompt) = &self.system_prompt {
            context.push(ChatMessage::system(prompt.as_str()));
        }
        context.extend_from_slice(history);
        context.push(user.clone());

        tracing::debug!(
            provider = self.provider.name(),
            model = %self.model,
            history = history.len(),
            image_bytes = image.map_or(0, <[u8]>::len),
            "Invoking model"
        );

        let reply = self
            .provider
            .chat(&context, &self.model, self.temperature)
            .await?;

        Ok(Turn { user, reply })
    }
}
