// Adapters layer: concrete implementations for external systems (upstream HTTP client, HTTP server).

pub mod http;
pub mod server;
