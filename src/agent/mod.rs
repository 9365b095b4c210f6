//! Model invocation: turns a user message plus session history into a model reply.

pub mod invoker;

pub use invoker::{InvokeError, ModelInvoker, Turn};

use std::sync::Arc;

use crate::config::Config;
use crate::media::ImageMimePolicy;
use crate::providers::{self, Provider};

/// Build the invoker described by `config`.
pub fn create_invoker(config: &Config) -> anyhow::Result<ModelInvoker> {
    let provider_name = config.default_provider.as_deref().unwrap_or("gemini");
    let provider: Arc<dyn Provider> = Arc::from(providers::create_provider_with_url(
        provider_name,
        config.api_key.as_deref(),
        config.api_url.as_deref(),
    )?);
    let model = config
        .default_model
        .clone()
        .unwrap_or_else(|| "gemini-2.0-flash".to_string());

    Ok(
        ModelInvoker::new(provider, model, config.default_temperature)
            .with_image_mime(ImageMimePolicy::from(&config.media))
            .with_system_prompt(config.system_prompt.clone()),
    )
}
