use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::config::{FlowParams, DEPLOYMENT_NAME};
use crate::database_ops::inventory_history;
use crate::database_ops::petstore::provider::PetstoreProvider;
use crate::error::Result;
use crate::models::{InventoryCounts, RawInventory};
use crate::normalization::inventory::normalize;
use crate::orchestrator::{Deployment, Flow, FlowRun, Task};
use crate::util::db::DbSettings;

pub const FLOW_NAME: &str = "collect_petstore_inventory";

pub const RETRIEVE_TASK: &str = "retrieve_inventory";
pub const NORMALIZE_TASK: &str = "clean_stats_data";
pub const PERSIST_TASK: &str = "insert_to_db";

/// Where raw inventory counts come from.
#[async_trait]
pub trait InventorySource: Send + Sync {
    async fn fetch(&self, host: &str, path: &str, secure: bool) -> Result<RawInventory>;
}

/// Where normalized counts end up.
#[async_trait]
pub trait InventorySink: Send + Sync {
    async fn store(&self, counts: &InventoryCounts) -> Result<()>;
}

#[async_trait]
impl InventorySource for PetstoreProvider {
    async fn fetch(&self, host: &str, path: &str, secure: bool) -> Result<RawInventory> {
        self.retrieve(host, path, secure).await
    }
}

/// Postgres sink writing to `inventory_history`.
#[derive(Debug, Clone)]
pub struct PgHistorySink {
    settings: DbSettings,
}

impl PgHistorySink {
    pub fn new(settings: DbSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl InventorySink for PgHistorySink {
    async fn store(&self, counts: &InventoryCounts) -> Result<()> {
        inventory_history::persist(counts, &self.settings).await
    }
}

/// fetch -> normalize -> persist, each step a tracked task. A failure in any
/// step aborts the remaining ones; the only durable write is the last step.
pub struct CollectInventoryFlow {
    params: FlowParams,
    source: Arc<dyn InventorySource>,
    sink: Arc<dyn InventorySink>,
}

impl CollectInventoryFlow {
    pub fn new(
        params: FlowParams,
        source: Arc<dyn InventorySource>,
        sink: Arc<dyn InventorySink>,
    ) -> Self {
        Self {
            params,
            source,
            sink,
        }
    }

    /// Wire the flow against the real HTTP endpoint and database.
    pub fn from_params(params: FlowParams) -> Result<Self> {
        let provider = PetstoreProvider::new(Some(params.http_timeout.as_secs()))?;
        let sink = PgHistorySink::new(params.db.clone());
        Ok(Self::new(params, Arc::new(provider), Arc::new(sink)))
    }
}

#[async_trait]
impl Flow for CollectInventoryFlow {
    fn name(&self) -> &'static str {
        FLOW_NAME
    }

    async fn run(&self, run: &FlowRun) -> Result<()> {
        let p = &self.params;

        let raw = Task::new(RETRIEVE_TASK)
            .with_retries(p.retry)
            .run(run, || self.source.fetch(&p.base_url, &p.path, p.secure))
            .await?;

        // Pure and infallible, so never retried.
        let counts = Task::new(NORMALIZE_TASK)
            .run(run, || async { Ok(normalize(&raw)) })
            .await?;
        info!(total = counts.total(), "normalized inventory");

        Task::new(PERSIST_TASK)
            .with_retries(p.retry)
            .run(run, || self.sink.store(&counts))
            .await
    }
}

/// Register the collection flow under its fixed deployment name.
pub fn deployment(params: FlowParams) -> Result<Deployment> {
    let flow = CollectInventoryFlow::from_params(params)?;
    Ok(Deployment::new(DEPLOYMENT_NAME, Arc::new(flow)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::orchestrator::{run_once, RetryPolicy, RunState};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct StubSource {
        payload: Option<RawInventory>,
        calls: AtomicU32,
    }

    impl StubSource {
        fn ok(pairs: &[(&str, i64)]) -> Self {
            Self {
                payload: Some(
                    pairs
                        .iter()
                        .map(|(k, v)| (k.to_string(), serde_json::json!(v)))
                        .collect(),
                ),
                calls: AtomicU32::new(0),
            }
        }
        fn not_found() -> Self {
            Self {
                payload: None,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl InventorySource for StubSource {
        async fn fetch(&self, host: &str, path: &str, _secure: bool) -> Result<RawInventory> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.payload {
                Some(p) => Ok(p.clone()),
                None => Err(PipelineError::Status {
                    url: format!("http://{host}{path}"),
                    status: reqwest::StatusCode::NOT_FOUND,
                }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        stored: Mutex<Vec<InventoryCounts>>,
    }

    #[async_trait]
    impl InventorySink for RecordingSink {
        async fn store(&self, counts: &InventoryCounts) -> Result<()> {
            self.stored.lock().unwrap().push(*counts);
            Ok(())
        }
    }

    fn flow_with(
        source: Arc<StubSource>,
        sink: Arc<RecordingSink>,
        params: FlowParams,
    ) -> Deployment {
        let flow = CollectInventoryFlow::new(params, source, sink);
        Deployment::new(DEPLOYMENT_NAME, Arc::new(flow))
    }

    #[tokio::test]
    async fn end_to_end_merges_casing_before_persisting() {
        let source = Arc::new(StubSource::ok(&[("Sold", 10), ("pending", 1)]));
        let sink = Arc::new(RecordingSink::default());
        let outcome = run_once(&flow_with(source.clone(), sink.clone(), FlowParams::default())).await;

        assert_eq!(outcome.state, RunState::Completed);
        assert_eq!(outcome.flow, FLOW_NAME);
        assert_eq!(outcome.deployment, "petstore-collection-deployment");
        assert_eq!(
            outcome.task_names(),
            vec![RETRIEVE_TASK, NORMALIZE_TASK, PERSIST_TASK]
        );
        let stored = sink.stored.lock().unwrap();
        assert_eq!(
            *stored,
            vec![InventoryCounts {
                sold: 10,
                available: 0,
                unavailable: 0,
                pending: 1
            }]
        );
    }

    #[tokio::test]
    async fn fetch_failure_stops_the_run() {
        let source = Arc::new(StubSource::not_found());
        let sink = Arc::new(RecordingSink::default());
        let outcome = run_once(&flow_with(source.clone(), sink.clone(), FlowParams::default())).await;

        match &outcome.state {
            RunState::Failed { error } => assert!(error.contains("404"), "{error}"),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(outcome.task_names(), vec![RETRIEVE_TASK]);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(sink.stored.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_is_retried_per_policy() {
        let source = Arc::new(StubSource::not_found());
        let sink = Arc::new(RecordingSink::default());
        let params = FlowParams {
            retry: RetryPolicy::new(2, Duration::ZERO),
            ..FlowParams::default()
        };
        let outcome = run_once(&flow_with(source.clone(), sink.clone(), params)).await;

        assert!(!outcome.state.is_completed());
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.tasks[0].attempts, 3);
        assert!(sink.stored.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn source_receives_configured_endpoint() {
        struct EchoSource(Mutex<Option<(String, String, bool)>>);

        #[async_trait]
        impl InventorySource for EchoSource {
            async fn fetch(&self, host: &str, path: &str, secure: bool) -> Result<RawInventory> {
                *self.0.lock().unwrap() = Some((host.into(), path.into(), secure));
                Ok(RawInventory::new())
            }
        }

        let source = Arc::new(EchoSource(Mutex::new(None)));
        let sink = Arc::new(RecordingSink::default());
        let params = FlowParams {
            base_url: "localhost:8080".into(),
            path: "/inv".into(),
            secure: false,
            ..FlowParams::default()
        };
        let flow = CollectInventoryFlow::new(params, source.clone(), sink.clone());
        let outcome = run_once(&Deployment::new("echo", Arc::new(flow))).await;

        assert!(outcome.state.is_completed());
        assert_eq!(
            source.0.lock().unwrap().clone(),
            Some(("localhost:8080".to_string(), "/inv".to_string(), false))
        );
        assert_eq!(
            *sink.stored.lock().unwrap(),
            vec![InventoryCounts::default()]
        );
    }
}
