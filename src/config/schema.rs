use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

// ── Top-level config ──────────────────────────────────────────────

/// Top-level chatrelay configuration, loaded from `config.toml`.
///
/// Resolution order: `CHATRELAY_CONFIG_DIR` env → `~/.chatrelay/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    /// API key for the selected provider. Overridden by `CHATRELAY_API_KEY` or `API_KEY` env vars.
    pub api_key: Option<String>,
    /// Base URL override for the provider API (any OpenAI-compatible endpoint).
    pub api_url: Option<String>,
    /// Provider ID (`"gemini"`, `"openai"`, `"grok"` or `"custom:<URL>"`). Default: `"gemini"`.
    pub default_provider: Option<String>,
    /// Model routed through the selected provider. Default: `"gemini-2.0-flash"`.
    pub default_model: Option<String>,
    /// Model temperature (0.0–2.0). Default: `0.7`.
    pub default_temperature: f64,
    /// Instruction sent ahead of every conversation. Never stored in session history.
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Gateway server configuration: host, port, body limit, timeout (`[gateway]`).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Conversation history policy (`[history]`).
    #[serde(default)]
    pub history: HistoryConfig,

    /// Image handling for multimodal messages (`[media]`).
    #[serde(default)]
    pub media: MediaConfig,
}

// ── Gateway ──────────────────────────────────────────────────────

/// Gateway server configuration (`[gateway]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway port (default: 5000)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Gateway host (default: 127.0.0.1)
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Largest accepted request body, in bytes. Uploaded images count against it.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Upper bound on a whole `/chat` request, model call included.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_gateway_port() -> u16 {
    5000
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_request_timeout_secs() -> u64 {
    180
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            host: default_gateway_host(),
            max_body_bytes: default_max_body_bytes(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// ── History ──────────────────────────────────────────────────────

/// Conversation history policy (`[history]` section).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum messages retained per session. `0` keeps everything.
    /// Must be even: the oldest messages are dropped one user/assistant pair at a time.
    #[serde(default)]
    pub max_messages: usize,
}

// ── Media ────────────────────────────────────────────────────────

/// Image handling configuration (`[media]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// MIME type declared in image data URIs. Default: `"image/jpeg"`.
    #[serde(default = "default_image_mime")]
    pub image_mime: String,
    /// Sniff PNG/GIF/WebP/JPEG signatures and only fall back to `image_mime`
    /// when the bytes are unrecognised. Default: `false`.
    #[serde(default)]
    pub detect_image_mime: bool,
}

fn default_image_mime() -> String {
    "image/jpeg".into()
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            image_mime: default_image_mime(),
            detect_image_mime: false,
        }
    }
}

// ── Config impl ──────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        let config_dir = default_config_dir().unwrap_or_else(|_| PathBuf::from(".chatrelay"));

        Self {
            config_path: config_dir.join("config.toml"),
            api_key: None,
            api_url: None,
            default_provider: Some("gemini".to_string()),
            default_model: Some("gemini-2.0-flash".to_string()),
            default_temperature: 0.7,
            system_prompt: None,
            gateway: GatewayConfig::default(),
            history: HistoryConfig::default(),
            media: MediaConfig::default(),
        }
    }
}

fn default_config_dir() -> Result<PathBuf> {
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".chatrelay"))
}

fn resolve_config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("CHATRELAY_CONFIG_DIR") {
        let dir = dir.trim();
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    default_config_dir()
}

impl Config {
    /// Load `config.toml` from the resolved config directory, writing defaults on first run.
    pub async fn load_or_init() -> Result<Self> {
        let config_dir = resolve_config_dir()?;
        Self::load_or_init_in(&config_dir).await
    }

    pub async fn load_or_init_in(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join("config.toml");

        fs::create_dir_all(config_dir).await.with_context(|| {
            format!(
                "Failed to create config directory {}",
                config_dir.display()
            )
        })?;

        let initialized = !config_path.exists();
        let mut config = if initialized {
            let mut config = Config::default();
            config.config_path = config_path.clone();
            config.save().await?;

            // Restrict permissions on newly created config file (may contain API keys)
            #[cfg(unix)]
            {
                use std::{fs::Permissions, os::unix::fs::PermissionsExt};
                let _ = fs::set_permissions(&config_path, Permissions::from_mode(0o600)).await;
            }
            config
        } else {
            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path.clone();
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!(
            path = %config.config_path.display(),
            initialized,
            "Config loaded"
        );
        Ok(config)
    }

    /// Persist the config to `config_path`.
    pub async fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.config_path, toml_str)
            .await
            .with_context(|| format!("Failed to write {}", self.config_path.display()))?;
        Ok(())
    }

    /// Validate configuration values that would cause runtime failures.
    pub fn validate(&self) -> Result<()> {
        if self.gateway.host.trim().is_empty() {
            anyhow::bail!("gateway.host must not be empty");
        }
        if self.gateway.max_body_bytes == 0 {
            anyhow::bail!("gateway.max_body_bytes must be greater than 0");
        }
        if self.gateway.request_timeout_secs == 0 {
            anyhow::bail!("gateway.request_timeout_secs must be greater than 0");
        }
        if !(0.0..=2.0).contains(&self.default_temperature) {
            anyhow::bail!(
                "default_temperature must be between 0.0 and 2.0 (got {})",
                self.default_temperature
            );
        }
        if self.history.max_messages % 2 != 0 {
            anyhow::bail!(
                "history.max_messages must be even (got {}); turns are stored as user/assistant pairs",
                self.history.max_messages
            );
        }
        if !self.media.image_mime.starts_with("image/") {
            anyhow::bail!(
                "media.image_mime must be an image/* type (got {})",
                self.media.image_mime
            );
        }
        Ok(())
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        // API Key: CHATRELAY_API_KEY or API_KEY (generic)
        if let Ok(key) = std::env::var("CHATRELAY_API_KEY").or_else(|_| std::env::var("API_KEY")) {
            if !key.is_empty() {
                self.api_key = Some(key);
            }
        }

        if let Ok(provider) = std::env::var("CHATRELAY_PROVIDER") {
            if !provider.is_empty() {
                self.default_provider = Some(provider);
            }
        }

        // Model: CHATRELAY_MODEL or MODEL
        if let Ok(model) = std::env::var("CHATRELAY_MODEL").or_else(|_| std::env::var("MODEL")) {
            if !model.is_empty() {
                self.default_model = Some(model);
            }
        }

        // Gateway port: CHATRELAY_GATEWAY_PORT or PORT
        if let Ok(port_str) =
            std::env::var("CHATRELAY_GATEWAY_PORT").or_else(|_| std::env::var("PORT"))
        {
            if let Ok(port) = port_str.parse::<u16>() {
                self.gateway.port = port;
            }
        }

        // Gateway host: CHATRELAY_GATEWAY_HOST or HOST
        if let Ok(host) =
            std::env::var("CHATRELAY_GATEWAY_HOST").or_else(|_| std::env::var("HOST"))
        {
            if !host.is_empty() {
                self.gateway.host = host;
            }
        }

        if let Ok(prompt) = std::env::var("CHATRELAY_SYSTEM_PROMPT") {
            if !prompt.trim().is_empty() {
                self.system_prompt = Some(prompt);
            }
        }

        if let Ok(temp_str) = std::env::var("CHATRELAY_TEMPERATURE") {
            if let Ok(temp) = temp_str.parse::<f64>() {
                if (0.0..=2.0).contains(&temp) {
                    self.default_temperature = temp;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_targets_gemini() {
        let c = Config::default();
        assert_eq!(c.default_provider.as_deref(), Some("gemini"));
        assert_eq!(c.default_model.as_deref(), Some("gemini-2.0-flash"));
        assert!(c.api_key.is_none());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn gateway_defaults() {
        let g = GatewayConfig::default();
        assert_eq!(g.host, "127.0.0.1");
        assert_eq!(g.port, 5000);
        assert_eq!(g.max_body_bytes, 10 * 1024 * 1024);
        assert_eq!(g.request_timeout_secs, 180);
    }

    #[test]
    fn history_is_unbounded_by_default() {
        assert_eq!(HistoryConfig::default().max_messages, 0);
    }

    #[test]
    fn media_defaults_to_fixed_jpeg() {
        let m = MediaConfig::default();
        assert_eq!(m.image_mime, "image/jpeg");
        assert!(!m.detect_image_mime);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let minimal = r#"
default_temperature = 0.2
"#;
        let parsed: Config = toml::from_str(minimal).unwrap();
        assert!(parsed.default_provider.is_none());
        assert!(parsed.system_prompt.is_none());
        assert_eq!(parsed.gateway.port, 5000);
        assert_eq!(parsed.history.max_messages, 0);
        assert_eq!(parsed.media.image_mime, "image/jpeg");
    }

    #[test]
    fn toml_sections_parse() {
        let raw = r#"
api_key = "k"
default_provider = "openai"
default_model = "gpt-4o-mini"
default_temperature = 1.0
system_prompt = "You are a helpful shopping assistant."

[gateway]
host = "0.0.0.0"
port = 8080

[history]
max_messages = 40

[media]
detect_image_mime = true
"#;
        let parsed: Config = toml::from_str(raw).unwrap();
        assert_eq!(parsed.api_key.as_deref(), Some("k"));
        assert_eq!(
            parsed.system_prompt.as_deref(),
            Some("You are a helpful shopping assistant.")
        );
        assert_eq!(parsed.gateway.host, "0.0.0.0");
        assert_eq!(parsed.gateway.port, 8080);
        assert_eq!(parsed.gateway.request_timeout_secs, 180);
        assert_eq!(parsed.history.max_messages, 40);
        assert!(parsed.media.detect_image_mime);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_host() {
        let mut c = Config::default();
        c.gateway.host = "  ".into();
        let err = c.validate().unwrap_err().to_string();
        assert!(err.contains("gateway.host"));
    }

    #[test]
    fn validate_rejects_odd_history_cap() {
        let mut c = Config::default();
        c.history.max_messages = 3;
        let err = c.validate().unwrap_err().to_string();
        assert!(err.contains("history.max_messages"));
    }

    #[test]
    fn validate_rejects_temperature_out_of_range() {
        let mut c = Config::default();
        c.default_temperature = 2.5;
        assert!(c.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_image_mime() {
        let mut c = Config::default();
        c.media.image_mime = "text/plain".into();
        assert!(c.validate().is_err());
    }

    #[tokio::test]
    async fn load_or_init_writes_defaults_then_reads_them_back() {
        let tmp = tempfile::TempDir::new().unwrap();

        let first = Config::load_or_init_in(tmp.path()).await.unwrap();
        assert!(tmp.path().join("config.toml").exists());
        assert_eq!(first.config_path, tmp.path().join("config.toml"));

        let second = Config::load_or_init_in(tmp.path()).await.unwrap();
        assert_eq!(second.gateway.port, first.gateway.port);
        assert_eq!(second.media.image_mime, first.media.image_mime);
    }

    #[tokio::test]
    async fn load_or_init_reads_existing_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "default_temperature = 0.3\n\n[history]\nmax_messages = 10\n",
        )
        .unwrap();

        let config = Config::load_or_init_in(tmp.path()).await.unwrap();
        assert_eq!(config.history.max_messages, 10);
    }

    #[tokio::test]
    async fn load_or_init_rejects_malformed_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("config.toml"), "not = [valid").unwrap();

        let err = Config::load_or_init_in(tmp.path()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
