use crate::config::RelayConfig;
use crate::core::auth::Authenticator;
use crate::core::rate_limit::FixedWindowLimiter;
use crate::core::{payload, transform};
use crate::domain::model::{InboundRequest, RelayReply};
use crate::domain::ports::CompletionClient;
use crate::utils::error::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// 單一請求的處理流程：限流 → 解碼 → 認證 → 驗證 → 轉換 → 轉發 → 回覆
#[derive(Clone)]
pub struct RelayService {
    config: Arc<RelayConfig>,
    limiter: FixedWindowLimiter,
    authenticator: Authenticator,
    client: Arc<dyn CompletionClient>,
}

impl RelayService {
    pub fn new(config: RelayConfig, client: Arc<dyn CompletionClient>) -> Self {
        let limiter = FixedWindowLimiter::new(&config.rate_limit);
        let authenticator = Authenticator::new(&config.auth);
        Self {
            config: Arc::new(config),
            limiter,
            authenticator,
            client,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub async fn handle(&self, request: InboundRequest) -> Result<RelayReply> {
        self.handle_at(request, chrono::Utc::now().timestamp()).await
    }

    #[instrument(
        name = "relay.handle",
        skip_all,
        fields(client = %request.client_key, bytes = request.body.len())
    )]
    pub async fn handle_at(&self, request: InboundRequest, now: i64) -> Result<RelayReply> {
        let started = Instant::now();

        if let Err(e) = self.limiter.check(&request.client_key) {
            warn!("🚦 Rate limit exceeded");
            return Err(e);
        }

        let client_request = payload::decode(request.content_type.as_deref(), &request.body)?;

        if let Err(e) = self.authenticator.verify(&client_request.credentials, now) {
            warn!(mode = ?self.authenticator.mode(), error = %e, "🔒 Authentication rejected");
            return Err(e);
        }

        transform::validate_request(&client_request, &self.config.request)?;

        let upstream_request = transform::build_upstream_request(&client_request, &self.config.upstream);
        debug!(
            messages = upstream_request.messages.len(),
            has_image = client_request.image.is_some(),
            model = %upstream_request.model,
            "Forwarding to upstream"
        );

        let response = self.client.complete(upstream_request).await?;
        let reply = transform::extract_reply(response)?;

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            reply_chars = reply.reply.chars().count(),
            "✅ Relayed completion"
        );
        Ok(reply)
    }
}
