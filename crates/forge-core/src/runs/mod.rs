//! Run lifecycle engine.
//!
//! `launch` persists a `pending` run and hands it to a background task (see
//! [`executor`]) that provisions nodes, streams trainer metrics into storage,
//! and records the terminal state. A semaphore bounds how many runs execute
//! at once; runs waiting for a slot stay `pending`.
//!
//! Cancellation writes `cancelled` first and then trips the run's token. The
//! task stops at its next step boundary (or while still waiting for a slot)
//! and releases its nodes.

mod executor;

use crate::cluster::ClusterManager;
use crate::config::LimitsConfig;
use crate::datasets::DatasetService;
use crate::error::{ForgeError, OrNotFound, Result};
use crate::models::{
    LaunchRequest, Page, Pagination, RunDetail, RunFilter, RunMetric, RunRecord, RunStatus, new_id,
};
use crate::storage::{RunRepository, SharedDatabase, SqliteRunRepository};
use chrono::{DateTime, Utc};
use forge_training::{ProgressEvent, ProgressSink, Trainer, resolve_recipe};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Everything a background run task needs.
#[derive(Clone)]
pub(crate) struct RunContext {
    db: SharedDatabase,
    cluster: Arc<ClusterManager>,
    trainer: Arc<dyn Trainer>,
    progress: Arc<dyn ProgressSink>,
    permits: Arc<Semaphore>,
    run_timeout_seconds: u64,
}

/// Bookkeeping for a run whose task has not finished yet.
struct ActiveRun {
    cancel: CancellationToken,
    /// Tripped by the task when it exits.
    done: CancellationToken,
    launched_at: DateTime<Utc>,
}

type ActiveRuns = Arc<RwLock<HashMap<String, ActiveRun>>>;

pub struct RunEngine {
    ctx: RunContext,
    datasets: DatasetService,
    active: ActiveRuns,
}

impl RunEngine {
    pub fn new(
        db: SharedDatabase,
        cluster: Arc<ClusterManager>,
        trainer: Arc<dyn Trainer>,
        progress: Arc<dyn ProgressSink>,
        limits: &LimitsConfig,
    ) -> Self {
        let datasets = DatasetService::new(db.clone());
        Self {
            ctx: RunContext {
                db,
                cluster,
                trainer,
                progress,
                permits: Arc::new(Semaphore::new(limits.max_concurrent_runs.max(1))),
                run_timeout_seconds: limits.run_timeout_seconds,
            },
            datasets,
            active: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Validates and persists a new run, then starts it in the background.
    ///
    /// Returns the `pending` record without waiting for execution.
    pub async fn launch(&self, request: LaunchRequest) -> Result<RunRecord> {
        if request.name.trim().is_empty() {
            return Err(ForgeError::Validation("run name is required".to_string()));
        }
        if request.base_model.trim().is_empty() {
            return Err(ForgeError::Validation("base_model is required".to_string()));
        }
        if request.num_gpus == 0 {
            return Err(ForgeError::Validation("num_gpus must be >= 1".to_string()));
        }
        if !self.datasets.exists(&request.dataset_id)? {
            return Err(ForgeError::not_found("Dataset", request.dataset_id));
        }
        let config = resolve_recipe(request.recipe, &request.config_overrides)?;

        let run = RunRecord {
            id: new_id(),
            name: request.name,
            base_model: request.base_model,
            dataset_id: request.dataset_id,
            config,
            status: RunStatus::Pending,
            num_gpus: request.num_gpus,
            priority: request.priority,
            tags: request.tags,
            error_message: None,
            retry_count: 0,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        };
        {
            let mut db = self.ctx.db.lock();
            SqliteRunRepository::new(&mut db).create(&run)?;
        }

        let cancel = CancellationToken::new();
        let done = CancellationToken::new();
        self.active.write().await.insert(
            run.id.clone(),
            ActiveRun { cancel: cancel.clone(), done: done.clone(), launched_at: run.created_at },
        );

        let ctx = self.ctx.clone();
        let active = Arc::clone(&self.active);
        let task_run = run.clone();
        tokio::spawn(async move {
            let run_id = task_run.id.clone();
            executor::execute(ctx, task_run, cancel).await;
            active.write().await.remove(&run_id);
            done.cancel();
        });

        info!(run_id = %run.id, recipe = %run.recipe(), num_gpus = run.num_gpus, "Run launched");
        Ok(run)
    }

    /// The run plus its full metric series.
    pub fn get(&self, id: &str) -> Result<RunDetail> {
        let mut db = self.ctx.db.lock();
        let repo = SqliteRunRepository::new(&mut db);
        let run = repo.get_by_id(id).or_not_found("Run", id)?;
        let metrics = repo.metrics(id, None)?;
        Ok(RunDetail { run, metrics })
    }

    pub fn get_record(&self, id: &str) -> Result<RunRecord> {
        let mut db = self.ctx.db.lock();
        SqliteRunRepository::new(&mut db).get_by_id(id).or_not_found("Run", id)
    }

    pub fn list(&self, filter: &RunFilter, pagination: Pagination) -> Result<Page<RunRecord>> {
        pagination.validate().map_err(ForgeError::Validation)?;
        let mut db = self.ctx.db.lock();
        let (items, total) = SqliteRunRepository::new(&mut db).list(filter, pagination)?;
        Ok(Page::new(items, total, pagination))
    }

    /// Metrics in ascending step order; `last_n` of `None` or `0` returns all.
    pub fn metrics(&self, id: &str, last_n: Option<u32>) -> Result<Vec<RunMetric>> {
        let mut db = self.ctx.db.lock();
        let repo = SqliteRunRepository::new(&mut db);
        repo.get_by_id(id).or_not_found("Run", id)?;
        Ok(repo.metrics(id, last_n)?)
    }

    /// Cancels a run that has not reached a terminal state.
    pub async fn cancel(&self, id: &str) -> Result<RunRecord> {
        let run = self.get_record(id)?;
        if run.status.is_terminal() {
            return Err(ForgeError::Conflict(format!("Run '{id}' is already {}", run.status)));
        }

        if !self.ctx.transition(id, RunStatus::Cancelled, None)? {
            let current = self.get_record(id)?;
            return Err(ForgeError::Conflict(format!("Run '{id}' is already {}", current.status)));
        }

        let token = self.active.read().await.get(id).map(|active| active.cancel.clone());
        match token {
            Some(token) => token.cancel(),
            // No task owns the run, so nothing else will free its nodes
            None => {
                self.ctx.cluster.release(id).await;
            }
        }

        self.ctx.progress.on_event(ProgressEvent::Cancelled { job_id: id.to_string() });
        info!(run_id = %id, "Run cancelled");
        self.get_record(id)
    }

    /// Whether the run's background task is still alive.
    pub async fn is_active(&self, id: &str) -> bool {
        self.active.read().await.contains_key(id)
    }

    /// Ids of runs whose tasks are still alive, oldest launch first.
    pub async fn active_runs(&self) -> Vec<String> {
        let active = self.active.read().await;
        let mut runs: Vec<(&String, &ActiveRun)> = active.iter().collect();
        runs.sort_by_key(|(_, run)| run.launched_at);
        runs.into_iter().map(|(id, _)| id.clone()).collect()
    }

    /// Waits for the run's task to exit, then returns the stored record.
    pub async fn wait(&self, id: &str) -> Result<RunRecord> {
        let done = self.active.read().await.get(id).map(|active| active.done.clone());
        if let Some(done) = done {
            debug!(run_id = %id, "Waiting for run task");
            done.cancelled().await;
        }
        self.get_record(id)
    }
}
