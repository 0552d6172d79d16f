use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::dispatch::{DispatchPolicy, Dispatcher};
use crate::handlers::ModuleRegistry;
use crate::observability::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub dispatcher: Dispatcher,
    pub metrics: Arc<Metrics>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Config, registry: ModuleRegistry) -> Self {
        let metrics = Arc::new(Metrics::new());
        let policy = DispatchPolicy::from_config(&config);
        let dispatcher = Dispatcher::with_metrics(registry, policy, metrics.clone());

        Self {
            config: Arc::new(config),
            dispatcher,
            metrics,
            started_at: Utc::now(),
        }
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.config.server.max_payload_bytes.as_usize()
    }
}
