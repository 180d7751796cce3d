use anyhow::Result;
use chat_relay::config::AuthMode;
use chat_relay::core::auth::{derive_dynamic_secret, static_hash, window_for};
use clap::Parser;

/// 產生客戶端需要附帶的認證欄位，方便用 curl 手動測試
#[derive(Debug, Parser)]
#[command(name = "relay-sign")]
#[command(about = "Print the auth fields a client must send to chat-relay")]
struct Args {
    #[arg(long, env = "RELAY_SHARED_SECRET", hide_env_values = true)]
    secret: String,

    #[arg(long, default_value = "timestamped")]
    mode: String,

    #[arg(long, default_value = "60")]
    window_seconds: u64,

    #[arg(long, help = "Unix timestamp to sign (defaults to now)")]
    timestamp: Option<i64>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mode: AuthMode = args.mode.parse().map_err(anyhow::Error::msg)?;

    let fields = match mode {
        AuthMode::SharedSecret => serde_json::json!({ "shared_secret": args.secret }),
        AuthMode::Hash => serde_json::json!({ "hash": static_hash(&args.secret) }),
        AuthMode::Timestamped => {
            let timestamp = args
                .timestamp
                .unwrap_or_else(|| chrono::Utc::now().timestamp());
            let window = window_for(timestamp, args.window_seconds);
            serde_json::json!({
                "hash": derive_dynamic_secret(&args.secret, window),
                "timestamp": timestamp,
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&fields)?);
    Ok(())
}
