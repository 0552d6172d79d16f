use axum::{Json, extract::State, http::HeaderMap};

use super::{
    models::{HealthResponse, ModuleInfo},
    state::AppState,
};
use crate::api::error::ApiError;
use crate::dispatch::{Envelope, QueryRequest, normalize};

/// Module query endpoint (POST /query)
///
/// ## Flow:
/// 1. Validate Content-Type when present (gzip bodies are already inflated
///    by `RequestDecompressionLayer`)
/// 2. Read the body up to `server.max_payload_bytes`
/// 3. Decode the JSON object into a [`QueryRequest`]
/// 4. Hand it to the dispatcher and normalize the outcome
///
/// Transport problems return 4xx. Everything that happens once a query is
/// decoded, unknown modules and timeouts included, is a 200 with an
/// in-band `error`.
pub async fn query(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<Json<Envelope>, ApiError> {
    if let Some(content_type) = headers.get(axum::http::header::CONTENT_TYPE) {
        let content_type = content_type
            .to_str()
            .map_err(|_| ApiError::InvalidPayload("invalid Content-Type header".into()))?;
        super::utils::parse_content_type(content_type)?;
    }

    let body_bytes = super::utils::read_body(body, state.max_payload_bytes()).await?;
    let object = super::utils::parse_object(&body_bytes)?;
    let request: QueryRequest = serde_json::from_value(object)?;

    let outcome = state.dispatcher.handle(request).await;
    Ok(Json(normalize(outcome)))
}

/// Module listing endpoint (GET /modules)
///
/// Enabled modules only, sorted by name.
pub async fn list_modules(State(state): State<AppState>) -> Json<Vec<ModuleInfo>> {
    let policy = state.dispatcher.policy();
    let modules = state
        .dispatcher
        .registry()
        .list()
        .filter(|descriptor| policy.is_enabled(&descriptor.name))
        .map(|descriptor| ModuleInfo::new(descriptor, policy.timeout_for(descriptor)))
        .collect();

    Json(modules)
}

/// Health check endpoint (GET /healthcheck, GET /health)
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let policy = state.dispatcher.policy();
    let modules = state
        .dispatcher
        .registry()
        .list()
        .filter(|descriptor| policy.is_enabled(&descriptor.name))
        .count();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        modules,
        started_at: state.started_at,
        queries: state.metrics.snapshot(),
    })
}
