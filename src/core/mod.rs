pub mod auth;
pub mod payload;
pub mod rate_limit;
pub mod relay;
pub mod transform;

pub use crate::domain::model::{ClientRequest, InboundRequest, RelayReply};
pub use crate::domain::ports::CompletionClient;
pub use crate::utils::error::Result;
