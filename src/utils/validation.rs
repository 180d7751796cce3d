use crate::utils::error::{RelayError, Result};
use std::net::SocketAddr;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(RelayError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(RelayError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(RelayError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_socket_addr(field_name: &str, addr: &str) -> Result<SocketAddr> {
    addr.parse::<SocketAddr>()
        .map_err(|e| RelayError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: addr.to_string(),
            reason: format!("Invalid socket address: {}", e),
        })
}

/// HTTP 路徑必須以 `/` 開頭
pub fn validate_route_path(field_name: &str, path: &str) -> Result<()> {
    if !path.starts_with('/') || path.contains(char::is_whitespace) {
        return Err(RelayError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Route path must start with '/' and contain no whitespace".to_string(),
        });
    }
    Ok(())
}

pub fn validate_positive_number<T>(field_name: &str, value: T, min_value: T) -> Result<()>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if value < min_value {
        return Err(RelayError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RelayError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: String::new(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(RelayError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("upstream.endpoint", "https://example.com").is_ok());
        assert!(validate_url("upstream.endpoint", "http://example.com").is_ok());
        assert!(validate_url("upstream.endpoint", "").is_err());
        assert!(validate_url("upstream.endpoint", "invalid-url").is_err());
        assert!(validate_url("upstream.endpoint", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("rate_limit.max_requests", 5u32, 1).is_ok());
        assert!(validate_positive_number("rate_limit.max_requests", 0u32, 1).is_err());
    }

    #[test]
    fn test_validate_socket_addr() {
        assert!(validate_socket_addr("server.listen", "127.0.0.1:8080").is_ok());
        assert!(validate_socket_addr("server.listen", "localhost").is_err());
    }

    #[test]
    fn test_validate_route_path() {
        assert!(validate_route_path("server.path", "/chat").is_ok());
        assert!(validate_route_path("server.path", "chat").is_err());
        assert!(validate_route_path("server.path", "/my chat").is_err());
    }

    #[test]
    fn test_non_empty_string_does_not_echo_value() {
        let err = validate_non_empty_string("auth.shared_secret", "   ").unwrap_err();
        match err {
            RelayError::InvalidConfigValueError { value, .. } => assert!(value.is_empty()),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
