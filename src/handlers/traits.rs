use async_trait::async_trait;
use thiserror::Error;

use super::types::{ConfigBag, Fields, HandlerOutput};

/// Module-level failures, surfaced to clients as `{"error": ...}`
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("missing input: {0}")]
    MissingInput(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    Upstream(String),
    #[error("could not decode {0}")]
    Decode(String),
    #[error("internal module error: {0}")]
    Internal(String),
}

/// Enrichment handler behind a module name.
///
/// Handlers are shared across concurrent queries and must not keep mutable
/// state between calls. `fields` and `config` are owned so the dispatcher
/// can move them onto a spawned task.
#[async_trait]
pub trait ModuleHandler: Send + Sync {
    async fn run(&self, fields: Fields, config: ConfigBag) -> Result<HandlerOutput, HandlerError>;
}
