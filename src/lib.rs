pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{http::OpenAiClient, server::router};
pub use config::RelayConfig;
pub use core::relay::RelayService;
pub use utils::error::{RelayError, Result};
