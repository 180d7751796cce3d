use crate::domain::model::{UpstreamRequest, UpstreamResponse};
use crate::utils::error::Result;
use async_trait::async_trait;

/// 上游 chat-completion API 的抽象，方便在測試中替換
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: UpstreamRequest) -> Result<UpstreamResponse>;
}
