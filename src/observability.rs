//! Tracing setup and in-process query counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins over `default_filter` when set. Safe to call more than
/// once; later calls are ignored.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Query counters exposed by the health endpoint
#[derive(Debug, Default)]
pub struct Metrics {
    queries_received: AtomicU64,
    queries_succeeded: AtomicU64,
    queries_failed: AtomicU64,
    queries_timed_out: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query_received(&self) {
        self.queries_received.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "queries_received", "Metric incremented");
    }

    pub fn query_succeeded(&self) {
        self.queries_succeeded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "queries_succeeded", "Metric incremented");
    }

    /// Any failed query, timeouts included
    pub fn query_failed(&self) {
        self.queries_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "queries_failed", "Metric incremented");
    }

    pub fn query_timed_out(&self) {
        self.queries_timed_out.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "queries_timed_out", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            received: self.queries_received.load(Ordering::Relaxed),
            succeeded: self.queries_succeeded.load(Ordering::Relaxed),
            failed: self.queries_failed.load(Ordering::Relaxed),
            timed_out: self.queries_timed_out.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct MetricsSnapshot {
    pub received: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
}
