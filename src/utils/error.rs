use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    HttpClientError(#[from] reqwest::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Unsupported content type: {content_type}")]
    UnsupportedMediaType { content_type: String },

    #[error("Malformed request body: {message}")]
    MalformedBody { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Payload too large: {actual} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { limit: usize, actual: usize },

    #[error("Authentication failed: {reason}")]
    Unauthorized { reason: String },

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Upstream returned {status}: {message}")]
    UpstreamError { status: u16, message: String },

    #[error("Upstream request timed out")]
    UpstreamTimeout,

    #[error("Upstream unavailable: {message}")]
    UpstreamUnavailable { message: String },

    #[error("Invalid upstream response: {message}")]
    InvalidUpstreamResponse { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Authentication,
    RateLimit,
    Upstream,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl RelayError {
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedBody {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => ErrorCategory::Configuration,
            Self::UnsupportedMediaType { .. }
            | Self::MalformedBody { .. }
            | Self::ValidationError { .. }
            | Self::PayloadTooLarge { .. } => ErrorCategory::Input,
            Self::Unauthorized { .. } => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::HttpClientError(_)
            | Self::UpstreamError { .. }
            | Self::UpstreamTimeout
            | Self::UpstreamUnavailable { .. }
            | Self::InvalidUpstreamResponse { .. } => ErrorCategory::Upstream,
            Self::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Input | ErrorCategory::RateLimit => ErrorSeverity::Low,
            ErrorCategory::Authentication | ErrorCategory::Upstream => ErrorSeverity::Medium,
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// 對應的 HTTP 狀態碼
    pub fn status_code(&self) -> u16 {
        match self {
            Self::UnsupportedMediaType { .. } => 415,
            Self::MalformedBody { .. } | Self::ValidationError { .. } => 400,
            Self::PayloadTooLarge { .. } => 413,
            Self::Unauthorized { .. } => 401,
            Self::RateLimited { .. } => 429,
            Self::UpstreamTimeout => 504,
            Self::UpstreamError { .. }
            | Self::UpstreamUnavailable { .. }
            | Self::InvalidUpstreamResponse { .. }
            | Self::HttpClientError(_) => 502,
            _ => 500,
        }
    }

    /// 穩定的機器可讀錯誤代碼
    pub fn code(&self) -> &'static str {
        match self {
            Self::IoError(_) => "io_error",
            Self::HttpClientError(_) => "upstream_unavailable",
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => "config_error",
            Self::UnsupportedMediaType { .. } => "unsupported_media_type",
            Self::MalformedBody { .. } => "malformed_body",
            Self::ValidationError { .. } => "invalid_request",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::Unauthorized { .. } => "unauthorized",
            Self::RateLimited { .. } => "rate_limited",
            Self::UpstreamError { .. } => "upstream_error",
            Self::UpstreamTimeout => "upstream_timeout",
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::InvalidUpstreamResponse { .. } => "invalid_upstream_response",
        }
    }

    /// 回傳給客戶端的訊息；認證失敗與系統錯誤不洩漏內部細節
    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::Unauthorized { .. } => "Authentication failed".to_string(),
            Self::RateLimited { retry_after_secs } => {
                format!("Too many requests, retry after {} seconds", retry_after_secs)
            }
            Self::UpstreamTimeout => "The language model did not respond in time".to_string(),
            Self::UpstreamError { status, message } => {
                format!("Upstream error ({}): {}", status, message)
            }
            Self::UpstreamUnavailable { .. } | Self::HttpClientError(_) => {
                "The language model service is unavailable".to_string()
            }
            Self::InvalidUpstreamResponse { .. } => {
                "The language model returned an unexpected response".to_string()
            }
            Self::IoError(_) => "Internal server error".to_string(),
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => self.to_string(),
            Self::UnsupportedMediaType { .. }
            | Self::MalformedBody { .. }
            | Self::ValidationError { .. }
            | Self::PayloadTooLarge { .. } => self.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => {
                "Check the configuration file and RELAY_* environment variables"
            }
            ErrorCategory::Input => {
                "Send a JSON or form body with a non-empty `messages` list"
            }
            ErrorCategory::Authentication => {
                "Verify the shared secret and that the device clock is in sync"
            }
            ErrorCategory::RateLimit => "Wait for the rate-limit window to reset",
            ErrorCategory::Upstream => {
                "Check the upstream endpoint, API key and network connectivity"
            }
            ErrorCategory::System => "Check the server logs for details",
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
