use std::sync::Arc;
use std::time::Instant;

use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::error::DispatchError;
use super::normalizer::Outcome;
use super::policy::DispatchPolicy;
use super::request::QueryRequest;
use super::validator::{ValidatedRequest, validate};
use crate::handlers::{HandlerOutput, ModuleRegistry};
use crate::observability::Metrics;

/// Routes queries to module handlers.
///
/// Cheap to clone; registry, policy and counters are shared.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ModuleRegistry>,
    policy: Arc<DispatchPolicy>,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(registry: ModuleRegistry, policy: DispatchPolicy) -> Self {
        Self::with_metrics(registry, policy, Arc::new(Metrics::new()))
    }

    pub fn with_metrics(
        registry: ModuleRegistry,
        policy: DispatchPolicy,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            policy: Arc::new(policy),
            metrics,
        }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Validate then dispatch. Rejected queries never reach a handler.
    pub async fn handle(&self, request: QueryRequest) -> Outcome {
        let query_id = Uuid::now_v7();
        let module = request.module.clone().unwrap_or_default();
        let span = info_span!("query", %query_id, module = %module);

        async move {
            self.metrics.query_received();
            let result = match validate(request, &self.registry, &self.policy) {
                Ok(validated) => self.execute(validated).await,
                Err(err) => {
                    debug!(reason = err.kind(), "Query rejected: {err}");
                    Err(err)
                }
            };
            self.record(result)
        }
        .instrument(span)
        .await
    }

    /// Run an already validated query under its execution budget.
    pub async fn dispatch(&self, validated: ValidatedRequest) -> Outcome {
        let query_id = Uuid::now_v7();
        let span = info_span!("query", %query_id, module = %validated.name());

        async move {
            self.metrics.query_received();
            let result = self.execute(validated).await;
            self.record(result)
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, validated: ValidatedRequest) -> Result<HandlerOutput, DispatchError> {
        let ValidatedRequest {
            module,
            fields,
            config,
            timeout,
        } = validated;
        let name = module.descriptor.name.clone();
        let handler = Arc::clone(&module.handler);
        let started = Instant::now();

        // Dropping the JoinHandle on timeout detaches the task; its result is discarded.
        let task = tokio::spawn(async move { handler.run(fields, config).await });

        let result = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(err))) => Err(DispatchError::Handler(err)),
            Ok(Err(join_err)) => {
                if join_err.is_panic() {
                    error!(module = %name, "Module handler panicked");
                } else {
                    error!(module = %name, "Module handler task cancelled");
                }
                Err(DispatchError::Crashed(name.clone()))
            }
            Err(_) => {
                warn!(module = %name, timeout_ms = timeout.as_millis() as u64, "Module timed out");
                Err(DispatchError::Timeout)
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => info!(module = %name, elapsed_ms, "Query succeeded"),
            Err(err) => info!(module = %name, elapsed_ms, reason = err.kind(), "Query failed: {err}"),
        }
        result
    }

    fn record(&self, result: Result<HandlerOutput, DispatchError>) -> Outcome {
        match result {
            Ok(output) => {
                self.metrics.query_succeeded();
                output.into()
            }
            Err(err) => {
                self.metrics.query_failed();
                if matches!(err, DispatchError::Timeout) {
                    self.metrics.query_timed_out();
                }
                Outcome::failure(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModuleSettings;
    use crate::handlers::{
        ConfigBag, Fields, HandlerError, ModuleDescriptor, ModuleHandler, Value,
    };
    use crate::humanize::HumanDuration;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Upper;

    #[async_trait]
    impl ModuleHandler for Upper {
        async fn run(&self, fields: Fields, config: ConfigBag) -> Result<HandlerOutput, HandlerError> {
            let text = fields
                .str("text")
                .ok_or_else(|| HandlerError::MissingInput("text".into()))?;
            let mut output = HandlerOutput::values(text.to_uppercase());
            if let Some(suffix) = config.get("suffix") {
                output = output.with_data(suffix);
            }
            Ok(output)
        }
    }

    struct Hang;

    #[async_trait]
    impl ModuleHandler for Hang {
        async fn run(&self, _: Fields, _: ConfigBag) -> Result<HandlerOutput, HandlerError> {
            std::future::pending().await
        }
    }

    struct Explode;

    #[async_trait]
    impl ModuleHandler for Explode {
        async fn run(&self, _: Fields, _: ConfigBag) -> Result<HandlerOutput, HandlerError> {
            panic!("boom")
        }
    }

    struct Failing;

    #[async_trait]
    impl ModuleHandler for Failing {
        async fn run(&self, _: Fields, _: ConfigBag) -> Result<HandlerOutput, HandlerError> {
            Err(HandlerError::Upstream(
                "Not able to reach dbl.spamhaus.org or something went wrong".into(),
            ))
        }
    }

    /// Counts invocations so tests can prove a handler was never called.
    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl ModuleHandler for Counting {
        async fn run(&self, _: Fields, _: ConfigBag) -> Result<HandlerOutput, HandlerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(HandlerOutput::values(true))
        }
    }

    fn dispatcher(calls: Arc<AtomicUsize>) -> Dispatcher {
        let mut registry = ModuleRegistry::new();
        registry
            .register(
                ModuleDescriptor::new("upper").inputs(["text"]).config(["suffix"]),
                Arc::new(Upper),
            )
            .unwrap();
        registry
            .register(
                ModuleDescriptor::new("hang")
                    .inputs(["text"])
                    .timeout(Duration::from_millis(50)),
                Arc::new(Hang),
            )
            .unwrap();
        registry
            .register(ModuleDescriptor::new("explode").inputs(["text"]), Arc::new(Explode))
            .unwrap();
        registry
            .register(ModuleDescriptor::new("failing").inputs(["text"]), Arc::new(Failing))
            .unwrap();
        registry
            .register(ModuleDescriptor::new("counting").inputs(["domain"]), Arc::new(Counting(calls)))
            .unwrap();
        Dispatcher::new(registry, DispatchPolicy::default())
    }

    #[tokio::test]
    async fn test_success() {
        let dispatcher = dispatcher(Arc::default());
        let outcome = dispatcher
            .handle(QueryRequest::new("upper").field("text", "circl").option("suffix", "!"))
            .await;

        assert_eq!(
            outcome,
            Outcome::Success {
                values: Value::from("CIRCL"),
                data: Some(Value::from("!")),
            }
        );
        assert_eq!(dispatcher.metrics().snapshot().succeeded, 1);
    }

    #[tokio::test]
    async fn test_timeout_within_budget() {
        let dispatcher = dispatcher(Arc::default());
        let started = Instant::now();
        let outcome = dispatcher.handle(QueryRequest::new("hang").field("text", "x")).await;

        assert_eq!(outcome, Outcome::failure("Module timeout"));
        assert!(started.elapsed() < Duration::from_secs(2));

        let stats = dispatcher.metrics().snapshot();
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn test_configured_timeout_overrides_descriptor() {
        let mut registry = ModuleRegistry::new();
        registry
            .register(
                ModuleDescriptor::new("hang")
                    .inputs(["text"])
                    .timeout(Duration::from_secs(60)),
                Arc::new(Hang),
            )
            .unwrap();
        let policy = DispatchPolicy::default().with_module(
            "hang",
            ModuleSettings {
                timeout: Some(HumanDuration(Duration::from_millis(20))),
                ..ModuleSettings::default()
            },
        );
        let dispatcher = Dispatcher::new(registry, policy);

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            dispatcher.handle(QueryRequest::new("hang").field("text", "x")),
        )
        .await
        .unwrap();
        assert_eq!(outcome, Outcome::failure("Module timeout"));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let dispatcher = dispatcher(Arc::default());
        let outcome = dispatcher.handle(QueryRequest::new("explode").field("text", "x")).await;
        assert_eq!(outcome, Outcome::failure("module 'explode' crashed"));

        // Still serving after the crash
        let outcome = dispatcher.handle(QueryRequest::new("upper").field("text", "ok")).await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_handler_error_message_passes_through() {
        let dispatcher = dispatcher(Arc::default());
        let outcome = dispatcher.handle(QueryRequest::new("failing").field("text", "x")).await;
        assert_eq!(
            outcome,
            Outcome::failure("Not able to reach dbl.spamhaus.org or something went wrong")
        );
    }

    #[tokio::test]
    async fn test_rejections_never_reach_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = dispatcher(calls.clone());

        let outcome = dispatcher
            .handle(QueryRequest::new("counting").field("ip-src", "8.8.8.8"))
            .await;
        assert!(matches!(outcome, Outcome::Failure { ref error } if error.starts_with("missing parameter")));

        let outcome = dispatcher.handle(QueryRequest::default().field("domain", "x")).await;
        assert_eq!(outcome, Outcome::failure("unknown module: no module specified"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let outcome = dispatcher
            .handle(QueryRequest::new("counting").field("domain", "circl.lu"))
            .await;
        assert!(outcome.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = dispatcher.metrics().snapshot();
        assert_eq!(stats.received, 3);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.succeeded, 1);
    }

    #[tokio::test]
    async fn test_dispatch_validated_request() {
        let dispatcher = dispatcher(Arc::default());
        let validated = validate(
            QueryRequest::new("upper").field("text", "abc"),
            dispatcher.registry(),
            dispatcher.policy(),
        )
        .unwrap();

        let outcome = dispatcher.dispatch(validated).await;
        assert_eq!(
            outcome,
            Outcome::Success {
                values: Value::from("ABC"),
                data: None,
            }
        );

        let stats = dispatcher.metrics().snapshot();
        assert_eq!(stats.received, 1);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 0);
    }
}
