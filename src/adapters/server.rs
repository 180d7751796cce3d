use crate::config::ResponseFormat;
use crate::core::relay::RelayService;
use crate::domain::model::{InboundRequest, RelayReply};
use crate::utils::error::{RelayError, Result};
use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, DefaultBodyLimit, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use http_body_util::LengthLimitError;
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use tracing::{error, info, warn};

const UNKNOWN_CLIENT: &str = "unknown";

pub fn router(service: RelayService) -> Router {
    let path = service.config().server.path.clone();
    let body_limit = service.config().server.max_body_bytes;

    Router::new()
        .route(&path, post(handle_chat))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(service)
}

/// 啟動 HTTP 伺服器，收到 Ctrl-C 後優雅關閉
pub async fn serve(service: RelayService) -> Result<()> {
    let addr: SocketAddr = service.config().server.listen.parse().map_err(|e| {
        RelayError::InvalidConfigValueError {
            field: "server.listen".to_string(),
            value: service.config().server.listen.clone(),
            reason: format!("{}", e),
        }
    })?;
    let path = service.config().server.path.clone();

    let app = router(service);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, path = %path, "🚀 Chat relay listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("👋 Chat relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn handle_chat(State(service): State<RelayService>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let client_key = client_key(&parts.headers, peer, service.config().server.trust_forwarded_for);
    let format = negotiate_format(&parts.headers, service.config().response.format);

    let limit = service.config().server.max_body_bytes;
    let body = match read_body(body, limit).await {
        Ok(body) => body,
        Err(e) => return error_response(&e),
    };

    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let inbound = InboundRequest {
        client_key,
        content_type,
        body,
    };

    match service.handle(inbound).await {
        Ok(reply) => reply_response(reply, format),
        Err(e) => error_response(&e),
    }
}

async fn read_body(body: Body, limit: usize) -> Result<Vec<u8>> {
    to_bytes(body, limit)
        .await
        .map(|bytes| bytes.to_vec())
        .map_err(|e| body_read_error(&e, limit))
}

fn body_read_error(error: &axum::Error, limit: usize) -> RelayError {
    if exceeds_length_limit(error) {
        return RelayError::PayloadTooLarge {
            limit,
            actual: limit.saturating_add(1),
        };
    }

    warn!("Failed to read request body: {}", error);
    RelayError::malformed("request body could not be read")
}

fn exceeds_length_limit(error: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

/// 限流鍵：預設為連線位址，信任代理時取 `X-Forwarded-For` 的第一個有效 IP
pub fn client_key(headers: &HeaderMap, peer: Option<IpAddr>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok());

        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    peer.map(|ip| ip.to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

pub fn negotiate_format(headers: &HeaderMap, default: ResponseFormat) -> ResponseFormat {
    let Some(accept) = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) else {
        return default;
    };

    let media: Vec<String> = accept
        .split(',')
        .map(|part| part.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
        .collect();

    let wants_text = media.iter().any(|m| m == "text/plain");
    let wants_json = media.iter().any(|m| m == "application/json");

    match (wants_text, wants_json) {
        (true, false) => ResponseFormat::Text,
        (false, true) => ResponseFormat::Json,
        _ => default,
    }
}

fn reply_response(reply: RelayReply, format: ResponseFormat) -> Response {
    match format {
        ResponseFormat::Json => (StatusCode::OK, Json(reply)).into_response(),
        ResponseFormat::Text => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            reply.reply,
        )
            .into_response(),
    }
}

fn error_response(error: &RelayError) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if status.is_server_error() {
        error!(code = error.code(), "❌ Request failed: {}", error);
    } else {
        info!(code = error.code(), status = status.as_u16(), "Request rejected");
    }

    let mut response = (
        status,
        Json(json!({
            "error": error.user_friendly_message(),
            "code": error.code(),
        })),
    )
        .into_response();

    if let RelayError::RateLimited { retry_after_secs } = error {
        if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_key_prefers_peer_by_default() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        let peer = Some("10.0.0.2".parse().unwrap());

        assert_eq!(client_key(&headers, peer, false), "10.0.0.2");
        assert_eq!(client_key(&headers, peer, true), "203.0.113.7");
    }

    #[test]
    fn test_client_key_ignores_invalid_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("garbage, 10.0.0.9"));
        let peer = Some("10.0.0.2".parse().unwrap());

        assert_eq!(client_key(&headers, peer, true), "10.0.0.2");
        assert_eq!(client_key(&HeaderMap::new(), None, true), UNKNOWN_CLIENT);
    }

    #[test]
    fn test_negotiate_format() {
        let mut headers = HeaderMap::new();
        assert_eq!(negotiate_format(&headers, ResponseFormat::Json), ResponseFormat::Json);

        headers.insert(header::ACCEPT, HeaderValue::from_static("text/plain"));
        assert_eq!(negotiate_format(&headers, ResponseFormat::Json), ResponseFormat::Text);

        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json; q=1"));
        assert_eq!(negotiate_format(&headers, ResponseFormat::Text), ResponseFormat::Json);

        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
        assert_eq!(negotiate_format(&headers, ResponseFormat::Text), ResponseFormat::Text);
    }

    #[tokio::test]
    async fn test_read_body_within_limit() {
        let body = read_body(Body::from("hello"), 16).await.unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn test_read_body_over_limit_is_payload_too_large() {
        let err = read_body(Body::from("x".repeat(64)), 16).await.unwrap_err();
        assert_eq!(err.status_code(), 413);
    }

    #[test]
    fn test_interrupted_body_is_bad_request() {
        let aborted = axum::Error::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        ));
        let err = body_read_error(&aborted, 16);
        assert!(matches!(err, RelayError::MalformedBody { .. }));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_rate_limited_response_has_retry_after() {
        let response = error_response(&RelayError::RateLimited {
            retry_after_secs: 12,
        });
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "12");
    }
}
