use crate::domain::model::{ChatMessage, ClientRequest, Credentials, ImagePayload, ROLE_USER};
use crate::utils::error::{RelayError, Result};
use serde_json::{Map, Value};

const DEFAULT_IMAGE_MIME: &str = "image/jpeg";
// anything above this is a millisecond timestamp
const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
}

/// 依 Content-Type 解碼 JSON 或 form 請求
pub fn decode(content_type: Option<&str>, body: &[u8]) -> Result<ClientRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(RelayError::malformed("request body is empty"));
    }

    let fields = match content_type.map(media_type) {
        Some(ref media) if media.is_empty() => sniff(body)?,
        None => sniff(body)?,
        Some(media) => match classify(&media) {
            Some(BodyKind::Json) => parse_json(body)?,
            Some(BodyKind::Form) => parse_form(body),
            None => {
                return Err(RelayError::UnsupportedMediaType {
                    content_type: media,
                })
            }
        },
    };

    from_fields(fields)
}

fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn classify(media: &str) -> Option<BodyKind> {
    match media {
        "application/json" | "text/json" => Some(BodyKind::Json),
        m if m.ends_with("+json") => Some(BodyKind::Json),
        "application/x-www-form-urlencoded" => Some(BodyKind::Form),
        _ => None,
    }
}

/// 沒有 Content-Type 時：看起來像 JSON 就照 JSON 解析，否則需至少一個 `key=value` 才當作 form
fn sniff(body: &[u8]) -> Result<Map<String, Value>> {
    let first = body.iter().find(|b| !b.is_ascii_whitespace());
    if matches!(first, Some(b'{' | b'[')) || serde_json::from_slice::<Value>(body).is_ok() {
        return parse_json(body);
    }

    let has_field = body
        .split(|b| *b == b'&')
        .any(|pair| pair.contains(&b'='));
    if !has_field {
        return Err(RelayError::malformed("body is neither JSON nor form-encoded"));
    }

    Ok(parse_form(body))
}

fn parse_json(body: &[u8]) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| RelayError::malformed(format!("invalid JSON: {}", e)))?;

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(RelayError::malformed("JSON body must be an object")),
    }
}

fn parse_form(body: &[u8]) -> Map<String, Value> {
    url::form_urlencoded::parse(body)
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect()
}

fn from_fields(mut fields: Map<String, Value>) -> Result<ClientRequest> {
    let messages = take_messages(&mut fields)?;

    let credentials = Credentials {
        hash: take_string(&mut fields, &["hash"]),
        shared_secret: take_string(&mut fields, &["shared_secret", "secret"]),
        timestamp: take_timestamp(&mut fields)?,
    };

    let image = take_image(&mut fields)?;

    Ok(ClientRequest {
        messages,
        credentials,
        image,
    })
}

fn take_messages(fields: &mut Map<String, Value>) -> Result<Vec<ChatMessage>> {
    if let Some(raw) = fields.remove("messages") {
        let value = match raw {
            Value::String(s) => serde_json::from_str::<Value>(&s)
                .map_err(|e| RelayError::malformed(format!("`messages` is not valid JSON: {}", e)))?,
            other => other,
        };

        return match value {
            Value::Array(items) => items.into_iter().map(parse_message).collect(),
            _ => Err(RelayError::malformed("`messages` must be an array")),
        };
    }

    // single-message clients
    match take_string(fields, &["message", "prompt"]) {
        Some(text) => Ok(vec![ChatMessage::new(ROLE_USER, text)]),
        None => Ok(Vec::new()),
    }
}

fn parse_message(item: Value) -> Result<ChatMessage> {
    let Value::Object(mut obj) = item else {
        return Err(RelayError::malformed("each message must be an object"));
    };

    let role = match obj.remove("role") {
        Some(Value::String(role)) => role.trim().to_ascii_lowercase(),
        Some(_) => return Err(RelayError::malformed("message `role` must be a string")),
        None => return Err(RelayError::malformed("message is missing `role`")),
    };

    let content = match obj.remove("content") {
        Some(content @ (Value::String(_) | Value::Array(_))) => content,
        Some(Value::Null) | None => return Err(RelayError::malformed("message is missing `content`")),
        Some(_) => {
            return Err(RelayError::malformed(
                "message `content` must be a string or an array of parts",
            ))
        }
    };

    Ok(ChatMessage { role, content })
}

fn take_string(fields: &mut Map<String, Value>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match fields.remove(*name) {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn take_timestamp(fields: &mut Map<String, Value>) -> Result<Option<i64>> {
    let raw = ["timestamp", "ts"]
        .iter()
        .find_map(|name| fields.remove(*name).filter(|v| !v.is_null()));

    let Some(raw) = raw else {
        return Ok(None);
    };

    let parsed = match &raw {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    };

    let Some(ts) = parsed else {
        return Err(RelayError::unauthorized("timestamp is not numeric"));
    };

    Ok(Some(if ts > MILLIS_THRESHOLD { ts / 1000 } else { ts }))
}

fn take_image(fields: &mut Map<String, Value>) -> Result<Option<ImagePayload>> {
    let declared_mime = take_string(fields, &["image_type", "image_mime"]);

    let Some(image) = take_string(fields, &["image"]) else {
        return Ok(None);
    };

    let image = image.trim();
    if let Some(rest) = image.strip_prefix("data:") {
        let (header, data) = rest
            .split_once(',')
            .ok_or_else(|| RelayError::malformed("image data URL has no payload"))?;
        let (mime, encoding) = header.split_once(';').unwrap_or((header, ""));
        if !encoding.eq_ignore_ascii_case("base64") {
            return Err(RelayError::malformed("image data URL must be base64 encoded"));
        }
        let mime = if mime.is_empty() {
            declared_mime.unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string())
        } else {
            mime.to_string()
        };
        return Ok(Some(ImagePayload {
            mime_type: mime,
            base64_data: data.to_string(),
        }));
    }

    Ok(Some(ImagePayload {
        mime_type: declared_mime.unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string()),
        base64_data: image.to_string(),
    }))
}
