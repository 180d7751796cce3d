use crate::config::UpstreamConfig;
use crate::domain::model::{UpstreamRequest, UpstreamResponse};
use crate::domain::ports::CompletionClient;
use crate::utils::error::{RelayError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const MAX_ERROR_MESSAGE_CHARS: usize = 500;

/// OpenAI 相容的 chat-completions 客戶端
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        tracing::debug!("Making upstream request to: {}", self.endpoint);

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(map_send_error)?;
        let status = response.status();
        tracing::debug!("Upstream response status: {}", status);

        let body = response.text().await.map_err(map_send_error)?;

        if !status.is_success() {
            let message = upstream_error_message(&body);
            tracing::warn!(status = status.as_u16(), "⚠️ Upstream returned an error: {}", message);
            return Err(RelayError::UpstreamError {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| RelayError::InvalidUpstreamResponse {
            message: format!("could not decode completion: {}", e),
        })
    }
}

fn map_send_error(error: reqwest::Error) -> RelayError {
    if error.is_timeout() {
        RelayError::UpstreamTimeout
    } else if error.is_connect() || error.is_request() {
        RelayError::UpstreamUnavailable {
            message: error.to_string(),
        }
    } else {
        RelayError::HttpClientError(error)
    }
}

/// 優先使用 `{"error": {"message": ...}}`，否則回傳截斷後的原始內容
fn upstream_error_message(body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            let error = v.get("error")?;
            error
                .get("message")
                .and_then(|m| m.as_str())
                .or_else(|| error.as_str())
                .map(str::to_string)
        });

    let message = from_json.unwrap_or_else(|| body.trim().to_string());
    if message.is_empty() {
        return "no error details".to_string();
    }

    if message.chars().count() > MAX_ERROR_MESSAGE_CHARS {
        let truncated: String = message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect();
        format!("{}…", truncated)
    } else {
        message
    }
}
