//! Eval engine.
//!
//! `run_eval` persists a `queued` eval and scores it in the background, one
//! benchmark at a time. The eval passes only if every benchmark clears its
//! threshold. Backend errors end the eval in `error`.

mod catalog;
mod compare;

pub use catalog::{
    DEFAULT_SUITE, FALLBACK_THRESHOLD, SUITES, THRESHOLDS, benchmarks_for, passes, threshold_for,
};
pub use compare::{
    BenchmarkDelta, EvalComparison, MAX_PERPLEXITY_RISE, MAX_SCORE_DROP, compare_results,
};

use crate::config::LimitsConfig;
use crate::error::{ForgeError, OrNotFound, Result};
use crate::models::{
    BenchmarkResult, EvalFilter, EvalRecord, EvalRequest, EvalStatus, ModelRecord, Page, Pagination,
    new_id,
};
use crate::storage::{
    EvalRepository, ModelRepository, SharedDatabase, SqliteEvalRepository, SqliteModelRepository,
};
use chrono::Utc;
use forge_training::{EvalTarget, Evaluator, ScoreDirection};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Mean of the higher-is-better scores, rounded to 4 places. `0.0` when there are none.
#[must_use]
pub fn overall_score(results: &[BenchmarkResult]) -> f64 {
    let scores: Vec<f64> = results
        .iter()
        .filter(|r| ScoreDirection::for_benchmark(&r.benchmark) == ScoreDirection::HigherIsBetter)
        .map(|r| r.score)
        .collect();
    if scores.is_empty() {
        return 0.0;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    (mean * 10_000.0).round() / 10_000.0
}

#[derive(Clone)]
struct EvalContext {
    db: SharedDatabase,
    evaluator: Arc<dyn Evaluator>,
    permits: Arc<Semaphore>,
}

pub struct EvalEngine {
    ctx: EvalContext,
    /// Done tokens of evals whose tasks are still alive.
    active: Arc<RwLock<HashMap<String, CancellationToken>>>,
}

impl EvalEngine {
    pub fn new(db: SharedDatabase, evaluator: Arc<dyn Evaluator>, limits: &LimitsConfig) -> Self {
        Self {
            ctx: EvalContext {
                db,
                evaluator,
                permits: Arc::new(Semaphore::new(limits.max_concurrent_evals.max(1))),
            },
            active: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Persists a `queued` eval and scores it in the background.
    pub async fn run_eval(&self, request: EvalRequest) -> Result<EvalRecord> {
        let suite = if request.suite.trim().is_empty() {
            DEFAULT_SUITE.to_string()
        } else {
            request.suite
        };
        let benchmarks = if request.benchmarks.is_empty() {
            benchmarks_for(&suite)
        } else {
            request.benchmarks
        };
        if benchmarks.iter().any(|b| b.trim().is_empty()) {
            return Err(ForgeError::Validation("benchmark names must not be blank".to_string()));
        }

        let (eval, model) = {
            let mut db = self.ctx.db.lock();
            let model = SqliteModelRepository::new(&mut db)
                .get_by_id(&request.model_id)
                .or_not_found("Model", &request.model_id)?;

            let mut repo = SqliteEvalRepository::new(&mut db);
            if let Some(baseline_id) = &request.regression_baseline_id {
                repo.get_by_id(baseline_id).or_not_found("Eval", baseline_id)?;
            }

            let eval = EvalRecord {
                id: new_id(),
                model_id: model.id.clone(),
                suite,
                status: EvalStatus::Queued,
                results: Vec::new(),
                regression_baseline_id: request.regression_baseline_id,
                overall_score: None,
                error_message: None,
                started_at: None,
                completed_at: None,
                created_at: Utc::now(),
            };
            repo.create(&eval)?;
            (eval, model)
        };

        let done = CancellationToken::new();
        self.active.write().await.insert(eval.id.clone(), done.clone());

        let ctx = self.ctx.clone();
        let active = Arc::clone(&self.active);
        let eval_id = eval.id.clone();
        tokio::spawn(async move {
            ctx.execute(&eval_id, target_for(&model), benchmarks).await;
            active.write().await.remove(&eval_id);
            done.cancel();
        });

        info!(eval_id = %eval.id, model_id = %eval.model_id, suite = %eval.suite, "Eval queued");
        Ok(eval)
    }

    pub fn get(&self, id: &str) -> Result<EvalRecord> {
        let mut db = self.ctx.db.lock();
        SqliteEvalRepository::new(&mut db).get_by_id(id).or_not_found("Eval", id)
    }

    pub fn list(&self, filter: &EvalFilter, pagination: Pagination) -> Result<Page<EvalRecord>> {
        pagination.validate().map_err(ForgeError::Validation)?;
        let mut db = self.ctx.db.lock();
        let (items, total) = SqliteEvalRepository::new(&mut db).list(filter, pagination)?;
        Ok(Page::new(items, total, pagination))
    }

    /// Per-benchmark deltas of `eval_id` against `baseline_id`.
    pub fn compare(&self, eval_id: &str, baseline_id: &str) -> Result<EvalComparison> {
        let current = self.get(eval_id)?;
        let baseline = self.get(baseline_id)?;
        Ok(EvalComparison {
            eval_id: current.id,
            baseline_id: baseline.id,
            regressions: compare_results(&current.results, &baseline.results),
        })
    }

    pub async fn is_active(&self, id: &str) -> bool {
        self.active.read().await.contains_key(id)
    }

    /// Waits for the eval's task to exit, then returns the stored record.
    pub async fn wait(&self, id: &str) -> Result<EvalRecord> {
        let done = self.active.read().await.get(id).cloned();
        if let Some(done) = done {
            done.cancelled().await;
        }
        self.get(id)
    }
}

fn target_for(model: &ModelRecord) -> EvalTarget {
    EvalTarget {
        model_id: model.id.clone(),
        base_model: model.base_model.clone(),
        recipe: model.recipe,
        artifact_path: model.artifact_path.clone(),
    }
}

impl EvalContext {
    async fn execute(&self, eval_id: &str, target: EvalTarget, benchmarks: Vec<String>) {
        let outcome = self.score(eval_id, &target, &benchmarks).await;

        let recorded = match outcome {
            Ok(Some(results)) => self.finish(eval_id, &results),
            Ok(None) => Ok(()),
            Err(e) => {
                warn!(eval_id = %eval_id, error = %e, "Eval errored");
                self.with_repo(|repo| repo.mark_error(eval_id, &e.to_string(), Utc::now()))
                    .map(|_| ())
            }
        };
        if let Err(e) = recorded {
            error!(eval_id = %eval_id, error = %e, "Failed to record eval outcome");
        }
    }

    /// Scores every benchmark in order. `None` if the eval left `queued` elsewhere.
    async fn score(
        &self,
        eval_id: &str,
        target: &EvalTarget,
        benchmarks: &[String],
    ) -> Result<Option<Vec<BenchmarkResult>>> {
        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| ForgeError::ExecutionFailure("eval scheduler shut down".to_string()))?;

        if !self.with_repo(|repo| repo.mark_running(eval_id, Utc::now()))? {
            debug!(eval_id = %eval_id, "Eval no longer queued");
            return Ok(None);
        }

        let mut results = Vec::with_capacity(benchmarks.len());
        for benchmark in benchmarks {
            let scored = self.evaluator.score_benchmark(target, benchmark).await?;
            let threshold = threshold_for(benchmark);
            let passed = ScoreDirection::for_benchmark(benchmark).passes(scored.score, threshold);
            debug!(
                eval_id = %eval_id,
                benchmark = %benchmark,
                score = scored.score,
                passed,
                "Benchmark scored"
            );
            results.push(BenchmarkResult {
                benchmark: benchmark.clone(),
                score: scored.score,
                passed,
                threshold,
                details: scored.details,
            });
        }
        Ok(Some(results))
    }

    fn finish(&self, eval_id: &str, results: &[BenchmarkResult]) -> Result<()> {
        let status = if results.iter().all(|r| r.passed) {
            EvalStatus::Passed
        } else {
            EvalStatus::Failed
        };
        let overall = overall_score(results);
        if self.with_repo(|repo| repo.finish(eval_id, status, results, overall, Utc::now()))? {
            info!(eval_id = %eval_id, status = %status, overall, "Eval finished");
        }
        Ok(())
    }

    fn with_repo<T>(
        &self,
        f: impl FnOnce(&mut SqliteEvalRepository<'_>) -> crate::storage::StorageResult<T>,
    ) -> Result<T> {
        let mut db = self.db.lock();
        Ok(f(&mut SqliteEvalRepository::new(&mut db))?)
    }
}
