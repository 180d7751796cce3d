#[cfg(feature = "cli")]
pub mod cli;
pub mod env;
pub mod toml_config;

use crate::utils::error::Result;
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(feature = "cli")]
pub use cli::CliConfig;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
pub const DEFAULT_PATH: &str = "/chat";
pub const DEFAULT_UPSTREAM_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub request: RequestLimits,
    pub response: ResponseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    pub path: String,
    pub max_body_bytes: usize,
    /// 位於反向代理之後時，改用 `X-Forwarded-For` 的第一個位址作為限流鍵
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            path: DEFAULT_PATH.to_string(),
            max_body_bytes: 8 * 1024 * 1024,
            trust_forwarded_for: false,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub system_prompt: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_UPSTREAM_ENDPOINT.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: Some(1024),
            temperature: None,
            system_prompt: None,
            timeout_seconds: 60,
        }
    }
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("system_prompt", &self.system_prompt)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// 客戶端直接送出 `shared_secret`
    SharedSecret,
    /// `hash = hex(SHA-256(secret))`
    Hash,
    /// `hash = hex(HMAC-SHA256(secret, window))`
    #[default]
    Timestamped,
}

impl std::str::FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shared_secret" | "secret" => Ok(Self::SharedSecret),
            "hash" | "static" => Ok(Self::Hash),
            "timestamped" | "timestamp" | "dynamic" => Ok(Self::Timestamped),
            other => Err(format!("unknown auth mode: {}", other)),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub shared_secret: String,
    pub window_seconds: u64,
    pub max_skew_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::default(),
            shared_secret: String::new(),
            window_seconds: 60,
            max_skew_seconds: 300,
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("mode", &self.mode)
            .field("shared_secret", &"<redacted>")
            .field("window_seconds", &self.window_seconds)
            .field("max_skew_seconds", &self.max_skew_seconds)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_requests: u32,
    pub window_seconds: u64,
    pub purge_threshold: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 20,
            window_seconds: 60,
            purge_threshold: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestLimits {
    pub max_messages: usize,
    pub max_image_bytes: usize,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_messages: 50,
            max_image_bytes: 4 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Json,
    Text,
}

impl std::str::FromStr for ResponseFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "plain" => Ok(Self::Text),
            other => Err(format!("unknown response format: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    pub format: ResponseFormat,
}

impl Validate for RelayConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_socket_addr("server.listen", &self.server.listen)?;
        validation::validate_route_path("server.path", &self.server.path)?;
        if self.server.path == "/health" {
            return Err(crate::utils::error::RelayError::InvalidConfigValueError {
                field: "server.path".to_string(),
                value: self.server.path.clone(),
                reason: "/health is reserved for the health check".to_string(),
            });
        }
        validation::validate_positive_number("server.max_body_bytes", self.server.max_body_bytes, 1024)?;

        validation::validate_url("upstream.endpoint", &self.upstream.endpoint)?;
        validation::validate_non_empty_string("upstream.model", &self.upstream.model)?;
        validation::validate_range("upstream.timeout_seconds", self.upstream.timeout_seconds, 1, 600)?;
        if let Some(max_tokens) = self.upstream.max_tokens {
            validation::validate_positive_number("upstream.max_tokens", max_tokens, 1)?;
        }
        if let Some(temperature) = self.upstream.temperature {
            validation::validate_range("upstream.temperature", temperature, 0.0, 2.0)?;
        }
        if self.upstream.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            tracing::warn!("⚠️ upstream.api_key is not set, requests will be sent without Authorization");
        }

        validation::validate_non_empty_string("auth.shared_secret", &self.auth.shared_secret)?;
        validation::validate_range("auth.window_seconds", self.auth.window_seconds, 1, 3600)?;
        validation::validate_range("auth.max_skew_seconds", self.auth.max_skew_seconds, 0, 86_400)?;

        if self.rate_limit.enabled {
            validation::validate_positive_number("rate_limit.max_requests", self.rate_limit.max_requests, 1)?;
            validation::validate_range("rate_limit.window_seconds", self.rate_limit.window_seconds, 1, 86_400)?;
            validation::validate_positive_number("rate_limit.purge_threshold", self.rate_limit.purge_threshold, 1)?;
        }

        validation::validate_range("request.max_messages", self.request.max_messages, 1, 1000)?;
        validation::validate_positive_number("request.max_image_bytes", self.request.max_image_bytes, 1)?;

        tracing::info!("✅ Relay configuration validation passed");
        Ok(())
    }
}
