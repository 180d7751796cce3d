use crate::config::{RequestLimits, UpstreamConfig};
use crate::domain::model::{
    ChatMessage, ClientRequest, ImagePayload, RelayReply, UpstreamRequest, UpstreamResponse,
    ROLE_ASSISTANT, ROLE_SYSTEM, ROLE_USER,
};
use crate::utils::error::{RelayError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};

const KNOWN_ROLES: [&str; 3] = [ROLE_SYSTEM, ROLE_USER, ROLE_ASSISTANT];

/// 檢查訊息數量、角色、內容與圖片大小
pub fn validate_request(request: &ClientRequest, limits: &RequestLimits) -> Result<()> {
    if request.messages.is_empty() {
        return Err(RelayError::validation("at least one message is required"));
    }

    if request.messages.len() > limits.max_messages {
        return Err(RelayError::validation(format!(
            "too many messages: {} (max {})",
            request.messages.len(),
            limits.max_messages
        )));
    }

    for (index, message) in request.messages.iter().enumerate() {
        if !KNOWN_ROLES.contains(&message.role.as_str()) {
            return Err(RelayError::validation(format!(
                "message {} has unknown role `{}`",
                index, message.role
            )));
        }

        let blank = match &message.content {
            Value::String(text) => text.trim().is_empty(),
            Value::Array(parts) => parts.is_empty(),
            _ => true,
        };
        if blank {
            return Err(RelayError::validation(format!(
                "message {} has empty content",
                index
            )));
        }
    }

    if let Some(image) = &request.image {
        validate_image(image, limits.max_image_bytes)?;
    }

    Ok(())
}

fn validate_image(image: &ImagePayload, max_bytes: usize) -> Result<()> {
    if !image.mime_type.starts_with("image/") {
        return Err(RelayError::validation(format!(
            "unsupported image type `{}`",
            image.mime_type
        )));
    }

    // base64 expands 3 bytes into 4 characters
    let estimated = image.base64_data.len() / 4 * 3;
    if estimated > max_bytes + 3 {
        return Err(RelayError::PayloadTooLarge {
            limit: max_bytes,
            actual: estimated,
        });
    }

    let decoded = STANDARD
        .decode(image.base64_data.as_bytes())
        .map_err(|e| RelayError::validation(format!("image is not valid base64: {}", e)))?;

    if decoded.len() > max_bytes {
        return Err(RelayError::PayloadTooLarge {
            limit: max_bytes,
            actual: decoded.len(),
        });
    }

    Ok(())
}

/// 將客戶端請求轉換為上游 chat-completions 格式
pub fn build_upstream_request(request: &ClientRequest, upstream: &UpstreamConfig) -> UpstreamRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 2);

    if let Some(prompt) = upstream.system_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
        let has_system = request.messages.iter().any(|m| m.role == ROLE_SYSTEM);
        if !has_system {
            messages.push(ChatMessage::new(ROLE_SYSTEM, prompt));
        }
    }

    messages.extend(request.messages.iter().cloned());

    if let Some(image) = &request.image {
        attach_image(&mut messages, image);
    }

    UpstreamRequest {
        model: upstream.model.clone(),
        messages,
        max_tokens: upstream.max_tokens,
        temperature: upstream.temperature,
    }
}

fn attach_image(messages: &mut Vec<ChatMessage>, image: &ImagePayload) {
    let image_part = json!({
        "type": "image_url",
        "image_url": { "url": image.data_url() }
    });

    match messages.iter_mut().rev().find(|m| m.role == ROLE_USER) {
        Some(message) => {
            let mut parts = match std::mem::take(&mut message.content) {
                Value::Array(parts) => parts,
                Value::String(text) => vec![json!({ "type": "text", "text": text })],
                _ => Vec::new(),
            };
            parts.push(image_part);
            message.content = Value::Array(parts);
        }
        None => messages.push(ChatMessage {
            role: ROLE_USER.to_string(),
            content: Value::Array(vec![image_part]),
        }),
    }
}

/// 取出第一個 choice 的內容
pub fn extract_reply(response: UpstreamResponse) -> Result<RelayReply> {
    let UpstreamResponse {
        model,
        choices,
        usage,
    } = response;

    let choice = choices
        .into_iter()
        .next()
        .ok_or_else(|| RelayError::InvalidUpstreamResponse {
            message: "response contained no choices".to_string(),
        })?;

    if let Some(reason) = choice.finish_reason.as_deref() {
        if reason != "stop" {
            tracing::debug!(finish_reason = reason, "Completion finished early");
        }
    }

    let content = choice
        .message
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| RelayError::InvalidUpstreamResponse {
            message: "first choice has no content".to_string(),
        })?;

    Ok(RelayReply {
        reply: content,
        model,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Credentials;

    fn request(messages: Vec<ChatMessage>) -> ClientRequest {
        ClientRequest {
            messages,
            credentials: Credentials::default(),
            image: None,
        }
    }

    fn upstream() -> UpstreamConfig {
        UpstreamConfig {
            model: "gpt-test".to_string(),
            max_tokens: Some(256),
            temperature: Some(0.3),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_rejects_empty_and_unknown_roles() {
        let limits = RequestLimits::default();
        assert!(validate_request(&request(vec![]), &limits).is_err());
        assert!(validate_request(&request(vec![ChatMessage::new("tool", "x")]), &limits).is_err());
        assert!(validate_request(&request(vec![ChatMessage::new(ROLE_USER, "  ")]), &limits).is_err());
        assert!(validate_request(&request(vec![ChatMessage::new(ROLE_USER, "hi")]), &limits).is_ok());
    }

    #[test]
    fn test_validate_message_limit() {
        let limits = RequestLimits {
            max_messages: 2,
            ..Default::default()
        };
        let messages = vec![ChatMessage::new(ROLE_USER, "a"); 3];
        let err = validate_request(&request(messages), &limits).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_validate_image_size_and_encoding() {
        let limits = RequestLimits {
            max_messages: 10,
            max_image_bytes: 4,
        };
        let mut req = request(vec![ChatMessage::new(ROLE_USER, "look")]);

        req.image = Some(ImagePayload {
            mime_type: "image/png".into(),
            base64_data: STANDARD.encode(b"abcd"),
        });
        assert!(validate_request(&req, &limits).is_ok());

        req.image = Some(ImagePayload {
            mime_type: "image/png".into(),
            base64_data: STANDARD.encode(b"abcdefgh"),
        });
        assert_eq!(validate_request(&req, &limits).unwrap_err().status_code(), 413);

        req.image = Some(ImagePayload {
            mime_type: "image/png".into(),
            base64_data: "@@@@".into(),
        });
        assert_eq!(validate_request(&req, &limits).unwrap_err().status_code(), 400);

        req.image = Some(ImagePayload {
            mime_type: "text/plain".into(),
            base64_data: STANDARD.encode(b"ab"),
        });
        assert!(validate_request(&req, &limits).is_err());
    }

    #[test]
    fn test_build_prepends_system_prompt() {
        let mut config = upstream();
        config.system_prompt = Some("Be brief.".into());

        let built = build_upstream_request(&request(vec![ChatMessage::new(ROLE_USER, "hi")]), &config);
        assert_eq!(built.model, "gpt-test");
        assert_eq!(built.max_tokens, Some(256));
        assert_eq!(built.messages.len(), 2);
        assert_eq!(built.messages[0], ChatMessage::new(ROLE_SYSTEM, "Be brief."));

        let with_system = request(vec![
            ChatMessage::new(ROLE_SYSTEM, "Client system"),
            ChatMessage::new(ROLE_USER, "hi"),
        ]);
        let built = build_upstream_request(&with_system, &config);
        assert_eq!(built.messages.len(), 2);
        assert_eq!(built.messages[0].text(), Some("Client system"));
    }

    #[test]
    fn test_image_attached_to_last_user_message() {
        let mut req = request(vec![
            ChatMessage::new(ROLE_USER, "first"),
            ChatMessage::new(ROLE_ASSISTANT, "ok"),
            ChatMessage::new(ROLE_USER, "what is in this picture?"),
        ]);
        req.image = Some(ImagePayload {
            mime_type: "image/png".into(),
            base64_data: "aGk=".into(),
        });

        let built = build_upstream_request(&req, &upstream());
        assert_eq!(built.messages[0].text(), Some("first"));

        let parts = built.messages[2].content.as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], json!({"type": "text", "text": "what is in this picture?"}));
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,aGk=");
    }

    #[test]
    fn test_image_without_user_message_becomes_new_message() {
        let mut req = request(vec![ChatMessage::new(ROLE_SYSTEM, "describe images")]);
        req.image = Some(ImagePayload {
            mime_type: "image/jpeg".into(),
            base64_data: "aGk=".into(),
        });

        let built = build_upstream_request(&req, &upstream());
        assert_eq!(built.messages.len(), 2);
        assert_eq!(built.messages[1].role, ROLE_USER);
    }

    #[test]
    fn test_upstream_request_serialization_skips_unset_fields() {
        let mut config = upstream();
        config.temperature = None;
        let built = build_upstream_request(&request(vec![ChatMessage::new(ROLE_USER, "hi")]), &config);
        let value = serde_json::to_value(&built).unwrap();
        assert!(value.get("temperature").is_none());
        assert_eq!(value["max_tokens"], 256);
        assert_eq!(value["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_extract_reply() {
        let response: UpstreamResponse = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "model": "gpt-test",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello there"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
        }))
        .unwrap();

        let reply = extract_reply(response).unwrap();
        assert_eq!(reply.reply, "Hello there");
        assert_eq!(reply.model.as_deref(), Some("gpt-test"));
        assert_eq!(reply.usage.unwrap().total_tokens, 5);
    }

    #[test]
    fn test_extract_reply_without_choices_fails() {
        let response: UpstreamResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        let err = extract_reply(response).unwrap_err();
        assert_eq!(err.status_code(), 502);

        let response: UpstreamResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": null}}]
        }))
        .unwrap();
        assert!(extract_reply(response).is_err());
    }
}
