use super::models::Config;
use crate::humanize::ByteSize;
use thiserror::Error;

/// Largest accepted request body
const MAX_PAYLOAD_LIMIT: ByteSize = ByteSize::mib(100);

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("max_payload_bytes ({actual}) exceeds limit of {limit}")]
    PayloadSizeExceedsLimit { actual: ByteSize, limit: ByteSize },

    #[error("max_payload_bytes must be positive")]
    InvalidPayloadSize,

    #[error("max_concurrent_queries must be positive")]
    InvalidConcurrency,

    #[error("Timeout must be positive: {field}")]
    InvalidTimeout { field: String },

    #[error("Module '{module}' has an empty config key")]
    EmptyConfigKey { module: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_server(config)?;
    validate_dispatch(config)?;
    validate_modules(config)?;
    Ok(())
}

fn validate_server(config: &Config) -> Result<(), ValidationError> {
    let size = config.server.max_payload_bytes;
    if size.as_u64() == 0 {
        return Err(ValidationError::InvalidPayloadSize);
    }
    if size > MAX_PAYLOAD_LIMIT {
        return Err(ValidationError::PayloadSizeExceedsLimit {
            actual: size,
            limit: MAX_PAYLOAD_LIMIT,
        });
    }
    if config.server.max_concurrent_queries == 0 {
        return Err(ValidationError::InvalidConcurrency);
    }
    Ok(())
}

fn validate_dispatch(config: &Config) -> Result<(), ValidationError> {
    if config.dispatch.default_timeout.is_zero() {
        return Err(ValidationError::InvalidTimeout {
            field: "dispatch.default_timeout".to_string(),
        });
    }
    if config.dispatch.local_timeout.is_zero() {
        return Err(ValidationError::InvalidTimeout {
            field: "dispatch.local_timeout".to_string(),
        });
    }
    Ok(())
}

fn validate_modules(config: &Config) -> Result<(), ValidationError> {
    for (name, settings) in &config.modules {
        if settings.timeout.is_some_and(|t| t.is_zero()) {
            return Err(ValidationError::InvalidTimeout {
                field: format!("modules.{name}.timeout"),
            });
        }
        if settings.config.keys().any(|key| key.trim().is_empty()) {
            return Err(ValidationError::EmptyConfigKey {
                module: name.clone(),
            });
        }
    }
    Ok(())
}
