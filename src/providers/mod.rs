//! Provider subsystem for model inference backends.
//!
//! Every supported backend speaks the OpenAI-compatible chat completions API, so the
//! factory [`create_provider_with_url`] maps a canonical provider id onto an
//! [`compatible::OpenAiCompatibleProvider`] with the right base URL and credential
//! lookup. `custom:<URL>` targets any other compatible endpoint.

pub mod compatible;
pub mod traits;

pub use traits::{
    ChatMessage, ContentPart, ImageUrl, MessageContent, ModelReply, Provider, ProviderError, Role,
};

use compatible::OpenAiCompatibleProvider;

const MAX_API_ERROR_CHARS: usize = 200;

const GEMINI_OPENAI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GROK_BASE_URL: &str = "https://api.x.ai/v1";

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

fn token_end(input: &str, from: usize) -> usize {
    let mut end = from;
    for (i, c) in input[from..].char_indices() {
        if is_secret_char(c) {
            end = from + i + c.len_utf8();
        } else {
            break;
        }
    }
    end
}

/// Scrub known secret-like token prefixes from provider error strings.
///
/// Redacts tokens with prefixes like `sk-`, `AIza` (Google API keys), `ghp_`,
/// and `github_pat_`.
pub fn scrub_secret_patterns(input: &str) -> String {
    const PREFIXES: [&str; 5] = ["sk-", "AIza", "ghp_", "gho_", "github_pat_"];

    let mut scrubbed = input.to_string();

    for prefix in PREFIXES {
        let mut search_from = 0;
        loop {
            let Some(rel) = scrubbed[search_from..].find(prefix) else {
                break;
            };

            let start = search_from + rel;
            let content_start = start + prefix.len();
            let end = token_end(&scrubbed, content_start);

            if end == content_start {
                search_from = content_start;
                continue;
            }

            scrubbed.replace_range(start..end, "[REDACTED]");
            search_from = start + "[REDACTED]".len();
        }
    }

    scrubbed
}

/// Sanitize API error text by scrubbing secrets and truncating length.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);

    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed;
    }

    let mut end = MAX_API_ERROR_CHARS;
    while end > 0 && !scrubbed.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...", &scrubbed[..end])
}

/// Provider-specific env vars consulted for the credential, most specific first.
fn provider_env_candidates(name: &str) -> &'static [&'static str] {
    match name {
        "gemini" => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        "openai" => &["OPENAI_API_KEY"],
        "grok" | "xai" => &["GROK_API_KEY", "XAI_API_KEY"],
        _ => &[],
    }
}

/// Resolve API key for a provider from config and environment variables.
pub fn resolve_provider_credential(name: &str, credential_override: Option<&str>) -> Option<String> {
    if let Some(raw_override) = credential_override {
        let trimmed_override = raw_override.trim();
        if !trimmed_override.is_empty() {
            return Some(trimmed_override.to_owned());
        }
    }

    let generic = ["CHATRELAY_API_KEY", "API_KEY"];
    for env_var in provider_env_candidates(name).iter().chain(generic.iter()) {
        if let Ok(value) = std::env::var(env_var) {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }

    None
}

/// Factory: create the right provider from config with optional custom base URL.
///
/// A missing credential is not an error here: the provider reports it on the
/// first call, before any network I/O.
pub fn create_provider_with_url(
    name: &str,
    api_key: Option<&str>,
    api_url: Option<&str>,
) -> anyhow::Result<Box<dyn Provider>> {
    let name = name.trim();
    let key = resolve_provider_credential(name, api_key);
    let key = key.as_deref();

    let provider = match name {
        "gemini" => {
            OpenAiCompatibleProvider::new("gemini", api_url.unwrap_or(GEMINI_OPENAI_BASE_URL), key)
                .with_credential_hint("GEMINI_API_KEY")
        }
        "openai" => OpenAiCompatibleProvider::new("openai", api_url.unwrap_or(OPENAI_BASE_URL), key)
            .with_credential_hint("OPENAI_API_KEY"),
        "grok" | "xai" => {
            OpenAiCompatibleProvider::new("grok", api_url.unwrap_or(GROK_BASE_URL), key)
                .with_credential_hint("GROK_API_KEY")
        }
        other => {
            let Some(url) = other.strip_prefix("custom:") else {
                anyhow::bail!(
                    "Unknown provider: {other}. Use \"gemini\", \"openai\", \"grok\" or \"custom:<URL>\"."
                );
            };
            let url = url.trim();
            if reqwest::Url::parse(url).is_err() {
                anyhow::bail!("Invalid custom provider URL: {url}");
            }
            OpenAiCompatibleProvider::new("custom", url, key)
        }
    };

    Ok(Box::new(provider))
}

/// Information about a supported provider for display purposes.
pub struct ProviderInfo {
    /// Canonical name used in config (e.g. `"gemini"`)
    pub name: &'static str,
    /// Human-readable display name
    pub display_name: &'static str,
    /// Env var checked for the API key
    pub credential_env: &'static str,
}

/// Return the list of all known providers for display in `chatrelay status`.
pub fn list_providers() -> Vec<ProviderInfo> {
    vec![
        ProviderInfo {
            name: "gemini",
            display_name: "Google Gemini (OpenAI-compatible endpoint)",
            credential_env: "GEMINI_API_KEY",
        },
        ProviderInfo {
            name: "openai",
            display_name: "OpenAI",
            credential_env: "OPENAI_API_KEY",
        },
        ProviderInfo {
            name: "grok",
            display_name: "xAI Grok",
            credential_env: "GROK_API_KEY",
        },
    ]
}
