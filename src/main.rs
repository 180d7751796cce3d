use chat_relay::adapters::server;
use chat_relay::utils::error::ErrorSeverity;
use chat_relay::utils::{logger, validation::Validate};
use chat_relay::{CliConfig, OpenAiClient, RelayError, RelayService};
use clap::Parser;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting chat-relay");

    if let Err(e) = run(&cli).await {
        tracing::error!(
            "❌ Chat relay failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());

        let exit_code = match e.severity() {
            ErrorSeverity::Low | ErrorSeverity::High => 1,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::Critical => 3,
        };
        std::process::exit(exit_code);
    }
}

async fn run(cli: &CliConfig) -> Result<(), RelayError> {
    let config = cli.load()?;
    if cli.verbose {
        tracing::debug!("Relay config: {:?}", config);
    }

    // 驗證配置
    config.validate()?;

    let client = OpenAiClient::new(&config.upstream)?;
    tracing::info!(
        endpoint = %config.upstream.endpoint,
        model = %config.upstream.model,
        auth_mode = ?config.auth.mode,
        "🔗 Upstream configured"
    );

    let service = RelayService::new(config, Arc::new(client));
    server::serve(service).await
}
