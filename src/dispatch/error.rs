//! Error types for query validation and dispatch.

use thiserror::Error;

use crate::handlers::HandlerError;

/// Failure of a single query, rendered verbatim as the `error` of the
/// response envelope.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No `module` in the request.
    #[error("unknown module: no module specified")]
    MissingModule,

    /// `module` names nothing in the registry.
    #[error("unknown module: {0}")]
    UnknownModule(String),

    /// Module registered but switched off by the operator.
    #[error("module disabled: {0}")]
    ModuleDisabled(String),

    /// None of the module's input fields is present.
    #[error("missing parameter for {module}: expected one of {}", expected.join(", "))]
    MissingParameter {
        module: String,
        expected: Vec<String>,
    },

    /// Handler ran and reported a failure.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// Handler did not finish within its execution budget.
    #[error("Module timeout")]
    Timeout,

    /// Handler panicked or its task was cancelled.
    #[error("module '{0}' crashed")]
    Crashed(String),
}

impl DispatchError {
    pub fn missing_parameter<I, S>(module: impl Into<String>, expected: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::MissingParameter {
            module: module.into(),
            expected: expected.into_iter().map(Into::into).collect(),
        }
    }

    /// Short label for logs and counters.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingModule | Self::UnknownModule(_) => "unknown_module",
            Self::ModuleDisabled(_) => "module_disabled",
            Self::MissingParameter { .. } => "missing_parameter",
            Self::Handler(_) => "handler_error",
            Self::Timeout => "timeout",
            Self::Crashed(_) => "crashed",
        }
    }
}
