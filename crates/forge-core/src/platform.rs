//! The `Platform` facade: one entry point per operation the transport layer exposes.
//!
//! Wires storage, the cluster manager, and the engines together from a
//! [`ForgeConfig`]. Backends are injectable through [`Backends`] so a real
//! trainer or evaluator can replace the simulations.

use crate::cluster::{ClusterManager, ClusterStatus, CostEstimate, HealthReport};
use crate::config::ForgeConfig;
use crate::datasets::{DatasetService, scan_pii_fields};
use crate::error::Result;
use crate::evals::{EvalComparison, EvalEngine};
use crate::models::{
    DatasetFilter, DatasetRecord, EvalFilter, EvalRecord, EvalRequest, LaunchRequest, ModelFilter,
    ModelRecord, NewDataset, Page, Pagination, PromoteRequest, PromotionStatus, RunDetail,
    RunFilter, RunMetric, RunRecord,
};
use crate::registry::RegistryService;
use crate::runs::RunEngine;
use crate::storage::{Database, SharedDatabase};
use forge_training::{
    Evaluator, ProgressSink, SimulatedEvaluator, SimulatedTrainer, TracingProgressSink, Trainer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Pluggable trainer, evaluator, and progress reporting.
#[derive(Clone)]
pub struct Backends {
    pub trainer: Arc<dyn Trainer>,
    pub evaluator: Arc<dyn Evaluator>,
    pub progress: Arc<dyn ProgressSink>,
}

impl Backends {
    /// Simulated backends tuned by the `[training]` and `[eval]` sections.
    #[must_use]
    pub fn simulated(config: &ForgeConfig) -> Self {
        Self {
            trainer: Arc::new(SimulatedTrainer::new(
                Duration::from_millis(config.training.step_interval_ms),
                config.training.seed,
            )),
            evaluator: Arc::new(SimulatedEvaluator::new(
                Duration::from_millis(config.eval.benchmark_delay_ms),
                config.eval.seed,
            )),
            progress: Arc::new(TracingProgressSink),
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }
}

pub struct Platform {
    config: ForgeConfig,
    cluster: Arc<ClusterManager>,
    datasets: DatasetService,
    runs: RunEngine,
    evals: EvalEngine,
    registry: RegistryService,
    shutdown: CancellationToken,
}

impl Platform {
    /// Opens the configured database file with simulated backends.
    pub fn open(config: ForgeConfig) -> Result<Self> {
        let db = Database::open(&config.storage.db_path)?;
        let backends = Backends::simulated(&config);
        Ok(Self::with_backends(config, db, backends))
    }

    /// In-memory database with simulated backends.
    pub fn in_memory(config: ForgeConfig) -> Result<Self> {
        let db = Database::open_in_memory()?;
        let backends = Backends::simulated(&config);
        Ok(Self::with_backends(config, db, backends))
    }

    pub fn with_backends(config: ForgeConfig, db: Database, backends: Backends) -> Self {
        let db = SharedDatabase::new(db);
        let cluster = Arc::new(ClusterManager::new(&config.cluster));
        let runs = RunEngine::new(
            db.clone(),
            Arc::clone(&cluster),
            backends.trainer,
            backends.progress,
            &config.limits,
        );
        let evals = EvalEngine::new(db.clone(), backends.evaluator, &config.limits);
        let registry = RegistryService::new(db.clone(), &config.registry.artifact_root);

        info!(
            db_path = %config.storage.db_path,
            max_concurrent_runs = config.limits.max_concurrent_runs,
            max_concurrent_evals = config.limits.max_concurrent_evals,
            "Platform initialized"
        );

        Self {
            datasets: DatasetService::new(db),
            cluster,
            runs,
            evals,
            registry,
            shutdown: CancellationToken::new(),
            config,
        }
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    /// Starts the periodic node health sweep. It stops on [`Platform::shutdown`].
    pub fn start_health_monitor(&self) -> JoinHandle<()> {
        let interval = Duration::from_secs(self.config.cluster.heartbeat_interval_secs.max(1));
        self.cluster.spawn_health_monitor(interval, self.shutdown.child_token())
    }

    pub fn shutdown(&self) {
        info!("Platform shutting down");
        self.shutdown.cancel();
    }

    // ---- datasets ----

    pub fn register_dataset(&self, input: NewDataset) -> Result<DatasetRecord> {
        self.datasets.register(input)
    }

    pub fn get_dataset(&self, id: &str) -> Result<DatasetRecord> {
        self.datasets.get(id)
    }

    pub fn list_datasets(
        &self,
        filter: &DatasetFilter,
        pagination: Pagination,
    ) -> Result<Page<DatasetRecord>> {
        self.datasets.list(filter, pagination)
    }

    pub fn get_lineage(&self, id: &str) -> Result<Vec<DatasetRecord>> {
        self.datasets.lineage(id)
    }

    pub fn delete_dataset(&self, id: &str) -> Result<()> {
        self.datasets.delete(id)
    }

    pub fn scan_pii_fields<S: AsRef<str>>(&self, fields: &[S]) -> Vec<String> {
        scan_pii_fields(fields)
    }

    // ---- runs ----

    pub async fn launch_run(&self, request: LaunchRequest) -> Result<RunRecord> {
        self.runs.launch(request).await
    }

    pub fn get_run(&self, id: &str) -> Result<RunDetail> {
        self.runs.get(id)
    }

    pub fn list_runs(&self, filter: &RunFilter, pagination: Pagination) -> Result<Page<RunRecord>> {
        self.runs.list(filter, pagination)
    }

    pub fn get_metrics(&self, id: &str, last_n: Option<u32>) -> Result<Vec<RunMetric>> {
        self.runs.metrics(id, last_n)
    }

    pub async fn cancel_run(&self, id: &str) -> Result<RunRecord> {
        self.runs.cancel(id).await
    }

    pub async fn is_run_active(&self, id: &str) -> bool {
        self.runs.is_active(id).await
    }

    pub async fn wait_for_run(&self, id: &str) -> Result<RunRecord> {
        self.runs.wait(id).await
    }

    // ---- evals ----

    pub async fn run_eval(&self, request: EvalRequest) -> Result<EvalRecord> {
        self.evals.run_eval(request).await
    }

    pub fn get_eval(&self, id: &str) -> Result<EvalRecord> {
        self.evals.get(id)
    }

    pub fn list_evals(
        &self,
        filter: &EvalFilter,
        pagination: Pagination,
    ) -> Result<Page<EvalRecord>> {
        self.evals.list(filter, pagination)
    }

    pub fn compare_evals(&self, eval_id: &str, baseline_id: &str) -> Result<EvalComparison> {
        self.evals.compare(eval_id, baseline_id)
    }

    pub async fn wait_for_eval(&self, id: &str) -> Result<EvalRecord> {
        self.evals.wait(id).await
    }

    // ---- registry ----

    pub fn promote_model(&self, request: PromoteRequest) -> Result<ModelRecord> {
        self.registry.promote(request)
    }

    pub fn get_model(&self, id: &str) -> Result<ModelRecord> {
        self.registry.get(id)
    }

    pub fn list_models(
        &self,
        filter: &ModelFilter,
        pagination: Pagination,
    ) -> Result<Page<ModelRecord>> {
        self.registry.list(filter, pagination)
    }

    pub fn update_model_status(&self, id: &str, status: PromotionStatus) -> Result<ModelRecord> {
        self.registry.update_status(id, status)
    }

    // ---- cluster ----

    pub async fn cluster_status(&self) -> ClusterStatus {
        self.cluster.status().await
    }

    pub fn estimate_cost(&self, units: u32, hours: f64) -> CostEstimate {
        self.cluster.estimate_cost(units, hours)
    }

    pub async fn check_node_health(&self, node_id: &str) -> Result<HealthReport> {
        self.cluster.check_health(node_id).await
    }

    pub async fn probe_cluster(&self) -> Vec<HealthReport> {
        self.cluster.probe_all().await
    }
}

impl Drop for Platform {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
