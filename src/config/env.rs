use crate::config::RelayConfig;
use crate::utils::error::{RelayError, Result};
use std::str::FromStr;

impl RelayConfig {
    /// 從 `RELAY_*` 環境變數建立配置，未設定的項目使用預設值
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = RelayConfig::default();

        if let Some(listen) = lookup("RELAY_LISTEN") {
            config.server.listen = listen;
        }
        if let Some(path) = lookup("RELAY_PATH") {
            config.server.path = path;
        }
        if let Some(v) = parse_var(&lookup, "RELAY_MAX_BODY_BYTES")? {
            config.server.max_body_bytes = v;
        }
        if let Some(v) = parse_var(&lookup, "RELAY_TRUST_FORWARDED_FOR")? {
            config.server.trust_forwarded_for = v;
        }

        if let Some(endpoint) = lookup("RELAY_UPSTREAM_ENDPOINT") {
            config.upstream.endpoint = endpoint;
        }
        config.upstream.api_key = lookup("RELAY_UPSTREAM_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        if let Some(model) = lookup("RELAY_MODEL") {
            config.upstream.model = model;
        }
        if let Some(v) = parse_var(&lookup, "RELAY_MAX_TOKENS")? {
            config.upstream.max_tokens = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "RELAY_TEMPERATURE")? {
            config.upstream.temperature = Some(v);
        }
        if let Some(prompt) = lookup("RELAY_SYSTEM_PROMPT") {
            config.upstream.system_prompt = Some(prompt);
        }
        if let Some(v) = parse_var(&lookup, "RELAY_UPSTREAM_TIMEOUT_SECS")? {
            config.upstream.timeout_seconds = v;
        }

        if let Some(v) = parse_var(&lookup, "RELAY_AUTH_MODE")? {
            config.auth.mode = v;
        }
        config.auth.shared_secret =
            lookup("RELAY_SHARED_SECRET").ok_or_else(|| RelayError::ConfigError {
                message: "RELAY_SHARED_SECRET environment variable is required".to_string(),
            })?;
        if let Some(v) = parse_var(&lookup, "RELAY_AUTH_WINDOW_SECS")? {
            config.auth.window_seconds = v;
        }
        if let Some(v) = parse_var(&lookup, "RELAY_AUTH_MAX_SKEW_SECS")? {
            config.auth.max_skew_seconds = v;
        }

        if let Some(v) = parse_var(&lookup, "RELAY_RATE_LIMIT_ENABLED")? {
            config.rate_limit.enabled = v;
        }
        if let Some(v) = parse_var(&lookup, "RELAY_RATE_LIMIT_MAX_REQUESTS")? {
            config.rate_limit.max_requests = v;
        }
        if let Some(v) = parse_var(&lookup, "RELAY_RATE_LIMIT_WINDOW_SECS")? {
            config.rate_limit.window_seconds = v;
        }

        if let Some(v) = parse_var(&lookup, "RELAY_MAX_MESSAGES")? {
            config.request.max_messages = v;
        }
        if let Some(v) = parse_var(&lookup, "RELAY_MAX_IMAGE_BYTES")? {
            config.request.max_image_bytes = v;
        }
        if let Some(v) = parse_var(&lookup, "RELAY_RESPONSE_FORMAT")? {
            config.response.format = v;
        }

        Ok(config)
    }
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| RelayError::InvalidConfigValueError {
                field: name.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthMode, ResponseFormat};
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<RelayConfig> {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        RelayConfig::from_lookup(|name| map.get(name).map(|v| v.to_string()))
    }

    #[test]
    fn test_shared_secret_is_required() {
        let err = config_from(&[]).unwrap_err();
        assert!(matches!(err, RelayError::ConfigError { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let config = config_from(&[
            ("RELAY_SHARED_SECRET", "env-secret"),
            ("RELAY_LISTEN", "127.0.0.1:3000"),
            ("RELAY_AUTH_MODE", "hash"),
            ("RELAY_RATE_LIMIT_MAX_REQUESTS", "7"),
            ("RELAY_RATE_LIMIT_ENABLED", "false"),
            ("RELAY_RESPONSE_FORMAT", "text"),
            ("RELAY_TEMPERATURE", "0.5"),
        ])
        .unwrap();

        assert_eq!(config.auth.shared_secret, "env-secret");
        assert_eq!(config.server.listen, "127.0.0.1:3000");
        assert_eq!(config.auth.mode, AuthMode::Hash);
        assert_eq!(config.rate_limit.max_requests, 7);
        assert!(!config.rate_limit.enabled);
        assert_eq!(config.response.format, ResponseFormat::Text);
        assert_eq!(config.upstream.temperature, Some(0.5));
    }

    #[test]
    fn test_openai_api_key_fallback() {
        let config = config_from(&[
            ("RELAY_SHARED_SECRET", "s"),
            ("OPENAI_API_KEY", "sk-fallback"),
        ])
        .unwrap();
        assert_eq!(config.upstream.api_key.as_deref(), Some("sk-fallback"));
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let err = config_from(&[
            ("RELAY_SHARED_SECRET", "s"),
            ("RELAY_MAX_MESSAGES", "many"),
        ])
        .unwrap_err();
        match err {
            RelayError::InvalidConfigValueError { field, .. } => {
                assert_eq!(field, "RELAY_MAX_MESSAGES")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
