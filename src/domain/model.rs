use serde::{Deserialize, Serialize};

pub const ROLE_SYSTEM: &str = "system";
pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";

/// 單則對話訊息；`content` 可以是字串，也可以是已結構化的 content parts 陣列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: serde_json::Value,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: serde_json::Value::String(content.into()),
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.content.as_str()
    }
}

/// 客戶端附帶的圖片，保存 base64 內容與 MIME 類型
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub base64_data: String,
}

impl ImagePayload {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64_data)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    pub hash: Option<String>,
    pub shared_secret: Option<String>,
    pub timestamp: Option<i64>,
}

/// 解碼後的客戶端請求
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientRequest {
    pub messages: Vec<ChatMessage>,
    pub credentials: Credentials,
    pub image: Option<ImagePayload>,
}

/// 進入 relay 的原始請求
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub client_key: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpstreamRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamResponse {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// 回傳給客戶端的結果
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RelayReply {
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}
