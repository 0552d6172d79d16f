//! API utility functions
//!
//! Pure helpers for HTTP request processing, kept apart from services.rs so
//! they can be unit tested.

use axum::body::Body;
use http_body_util::{BodyExt, LengthLimitError, Limited};

use crate::api::error::ApiError;

/// Parses and validates Content-Type header for application/json
///
/// Accepts:
/// - `application/json`
/// - `application/json; charset=utf-8`
///
/// Rejects:
/// - `application/jsonp`
/// - `text/plain`
/// - Malformed media types
pub fn parse_content_type(content_type: &str) -> Result<mime::Mime, ApiError> {
    let media_type: mime::Mime = content_type.parse().map_err(|_| {
        ApiError::InvalidPayload(format!("invalid Content-Type: {}", content_type))
    })?;

    if media_type.type_() != mime::APPLICATION || media_type.subtype() != mime::JSON {
        return Err(ApiError::InvalidPayload(format!(
            "Content-Type must be application/json, got: {}/{}",
            media_type.type_(),
            media_type.subtype()
        )));
    }

    Ok(media_type)
}

/// Reads the (already decompressed) request body, failing once it grows past
/// `max_size`.
pub async fn read_body(body: Body, max_size: usize) -> Result<Vec<u8>, ApiError> {
    let collected = Limited::new(body, max_size)
        .collect()
        .await
        .map_err(|err| {
            if err.downcast_ref::<LengthLimitError>().is_some() {
                ApiError::PayloadTooLarge(max_size)
            } else {
                ApiError::InvalidPayload(format!("failed to read body: {err}"))
            }
        })?;
    Ok(collected.to_bytes().to_vec())
}

/// Decodes a JSON object body. Arrays, scalars and malformed JSON are rejected.
pub fn parse_object(data: &[u8]) -> Result<serde_json::Value, ApiError> {
    let value: serde_json::Value = serde_json::from_slice(data)?;
    if !value.is_object() {
        return Err(ApiError::InvalidPayload(
            "request body must be a JSON object".to_string(),
        ));
    }
    Ok(value)
}
