use crate::config::RelayConfig;
use crate::utils::error::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "chat-relay")]
#[command(about = "Authenticating chat relay in front of a chat-completion API")]
pub struct CliConfig {
    #[arg(long, short, help = "TOML configuration file; RELAY_* environment variables are used when omitted")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Override the listen address (e.g. 0.0.0.0:8080)")]
    pub listen: Option<String>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,
}

impl CliConfig {
    /// 依 CLI 參數載入配置並套用覆寫
    pub fn load(&self) -> Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => {
                tracing::info!("📄 Loading configuration from {}", path.display());
                RelayConfig::from_file(path)?
            }
            None => {
                tracing::info!("📄 Loading configuration from environment");
                RelayConfig::from_env()?
            }
        };

        if let Some(listen) = &self.listen {
            config.server.listen = listen.clone();
        }

        Ok(config)
    }
}
