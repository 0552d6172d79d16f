//! API models for the enrichbox HTTP endpoints.
//!
//! - `POST /query` takes a [`QueryRequest`](crate::dispatch::QueryRequest)
//!   and answers with an [`Envelope`](crate::dispatch::Envelope)
//! - `GET /modules` lists [`ModuleInfo`] for every enabled module
//! - `GET /healthcheck` returns [`HealthResponse`]
//!
//! # Query example
//!
//! ```json
//! {
//!   "module": "dns",
//!   "hostname": "www.circl.lu",
//!   "config": {"nameserver": "8.8.8.8"}
//! }
//! ```
//!
//! answered with
//!
//! ```json
//! {"results": [{"values": ["149.13.33.14"]}]}
//! ```

use serde::{Deserialize, Serialize};

use crate::handlers::ModuleDescriptor;
use crate::observability::MetricsSnapshot;

/// Body of every transport-level error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    pub description: String,
    pub input: Vec<String>,
    pub config: Vec<String>,
    pub external: bool,
    pub request_on_query: bool,
    pub timeout_ms: u64,
}

impl ModuleInfo {
    pub fn new(descriptor: &ModuleDescriptor, timeout: std::time::Duration) -> Self {
        Self {
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            input: descriptor.required_input_fields.iter().cloned().collect(),
            config: descriptor.accepts_config.iter().cloned().collect(),
            external: descriptor.makes_external_call,
            request_on_query: descriptor.request_on_query,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub modules: usize,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub queries: MetricsSnapshot,
}
