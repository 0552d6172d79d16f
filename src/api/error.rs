use axum::{Json, http::StatusCode, response::IntoResponse};
use thiserror::Error;

use super::models::ErrorResponse;

/// Transport-level failures. Module failures never surface here; they travel
/// in-band as a 200 envelope.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("payload invalid: {0}")]
    InvalidPayload(String),
    #[error("payload too large: limit is {0} bytes")]
    PayloadTooLarge(usize),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        ApiError::InvalidPayload(value.to_string())
    }
}
