//! Model registry and the eval-score promotion gate.

use crate::error::{ForgeError, OrNotFound, Result};
use crate::models::{
    EvalRecord, ModelFilter, ModelRecord, Page, Pagination, PromoteRequest, PromotionStatus,
    RunStatus, new_id,
};
use crate::storage::{
    EvalRepository, ModelRepository, RunRepository, SharedDatabase, SqliteEvalRepository,
    SqliteModelRepository, SqliteRunRepository,
};
use chrono::Utc;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::info;

/// Per-benchmark scores plus `overall`, as stored on a model.
fn score_snapshot(eval: &EvalRecord) -> Map<String, Value> {
    let mut scores: Map<String, Value> =
        eval.results.iter().map(|r| (r.benchmark.clone(), Value::from(r.score))).collect();
    if let Some(overall) = eval.overall_score {
        scores.insert("overall".to_string(), Value::from(overall));
    }
    scores
}

#[derive(Clone)]
pub struct RegistryService {
    db: SharedDatabase,
    artifact_root: PathBuf,
}

impl RegistryService {
    pub fn new(db: SharedDatabase, artifact_root: impl Into<PathBuf>) -> Self {
        Self { db, artifact_root: artifact_root.into() }
    }

    /// Registers a model built from a completed run.
    ///
    /// With `min_eval_score` set, the most recently completed passed eval of
    /// any model from the same run must score at least that much. A run with
    /// no passed eval is not gated.
    pub fn promote(&self, request: PromoteRequest) -> Result<ModelRecord> {
        if request.name.trim().is_empty() || request.version.trim().is_empty() {
            return Err(ForgeError::Validation("model name and version are required".to_string()));
        }
        if request.min_eval_score.is_some_and(|score| !score.is_finite()) {
            return Err(ForgeError::Validation(
                "min_eval_score must be a finite number".to_string(),
            ));
        }

        let mut db = self.db.lock();

        let run = SqliteRunRepository::new(&mut db)
            .get_by_id(&request.run_id)
            .or_not_found("Run", &request.run_id)?;
        if run.status != RunStatus::Completed {
            return Err(ForgeError::Conflict(format!(
                "Run '{}' is {}; only completed runs can be promoted",
                run.id, run.status
            )));
        }

        if SqliteModelRepository::new(&mut db)
            .find_by_name_version(&request.name, &request.version)?
            .is_some()
        {
            return Err(ForgeError::Conflict(format!(
                "Model '{}' version '{}' already exists",
                request.name, request.version
            )));
        }

        let gating_eval = SqliteEvalRepository::new(&mut db).latest_passed_for_run(&run.id)?;
        if let (Some(threshold), Some(eval)) = (request.min_eval_score, &gating_eval) {
            let score = eval.overall_score.unwrap_or(0.0);
            if score < threshold {
                return Err(ForgeError::EvalGate { run_id: run.id, score, threshold });
            }
        }

        let id = new_id();
        let now = Utc::now();
        let model = ModelRecord {
            artifact_path: Some(self.artifact_root.join(&id).display().to_string()),
            id,
            run_id: run.id.clone(),
            name: request.name,
            version: request.version,
            description: request.description,
            status: request.target_status,
            base_model: run.base_model.clone(),
            recipe: run.recipe(),
            eval_scores: gating_eval.as_ref().map(score_snapshot).unwrap_or_default(),
            promoted_at: Some(now),
            created_at: now,
        };
        let mut repo = SqliteModelRepository::new(&mut db);
        repo.create(&model)?;
        let model = repo.get_by_id(&model.id)?;

        info!(
            model_id = %model.id,
            run_id = %model.run_id,
            name = %model.name,
            version = %model.version,
            status = %model.status,
            "Model promoted"
        );
        Ok(model)
    }

    pub fn get(&self, id: &str) -> Result<ModelRecord> {
        let mut db = self.db.lock();
        SqliteModelRepository::new(&mut db).get_by_id(id).or_not_found("Model", id)
    }

    pub fn list(&self, filter: &ModelFilter, pagination: Pagination) -> Result<Page<ModelRecord>> {
        pagination.validate().map_err(ForgeError::Validation)?;
        let mut db = self.db.lock();
        let (items, total) = SqliteModelRepository::new(&mut db).list(filter, pagination)?;
        Ok(Page::new(items, total, pagination))
    }

    /// Moves a model to `status` without re-checking the gate. Only a move
    /// into `production` re-stamps `promoted_at`.
    pub fn update_status(&self, id: &str, status: PromotionStatus) -> Result<ModelRecord> {
        let mut db = self.db.lock();
        let mut repo = SqliteModelRepository::new(&mut db);
        let promoted_at = (status == PromotionStatus::Production).then(Utc::now);
        repo.update_status(id, status, promoted_at).or_not_found("Model", id)?;
        info!(model_id = %id, status = %status, "Model status updated");
        repo.get_by_id(id).or_not_found("Model", id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BenchmarkResult, EvalStatus};
    use crate::storage::Database;
    use crate::test_support;

    fn service() -> (RegistryService, SharedDatabase) {
        let db = SharedDatabase::new(Database::open_in_memory().unwrap());
        test_support::run(&db, "run-done", RunStatus::Completed);
        (RegistryService::new(db.clone(), "/srv/models"), db)
    }

    /// Records a passed eval with the given overall score against `model_id`.
    fn passed_eval(db: &SharedDatabase, model_id: &str, overall: f64) {
        let mut guard = db.lock();
        let mut repo = SqliteEvalRepository::new(&mut guard);
        let id = new_id();
        repo.create(&EvalRecord {
            id: id.clone(),
            model_id: model_id.to_string(),
            suite: "default".to_string(),
            status: EvalStatus::Queued,
            results: vec![],
            regression_baseline_id: None,
            overall_score: None,
            error_message: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        })
        .unwrap();
        assert!(repo.mark_running(&id, Utc::now()).unwrap());
        let results = vec![BenchmarkResult {
            benchmark: "accuracy".to_string(),
            score: overall,
            passed: true,
            threshold: 0.7,
            details: Map::new(),
        }];
        assert!(repo.finish(&id, EvalStatus::Passed, &results, overall, Utc::now()).unwrap());
    }

    #[test]
    fn test_promote_completed_run() {
        let (registry, _db) = service();
        let model = registry
            .promote(PromoteRequest::new("run-done", "alpaca-7b-lora", "1.0.0"))
            .unwrap();

        assert_eq!(model.status, PromotionStatus::Staging);
        let expected_path = format!("/srv/models/{}", model.id);
        assert_eq!(model.artifact_path.as_deref(), Some(expected_path.as_str()));
        assert!(model.promoted_at.is_some());
        assert!(model.eval_scores.is_empty());
        assert_eq!(registry.get(&model.id).unwrap(), model);
    }

    #[test]
    fn test_unfinished_run_conflicts() {
        let (registry, db) = service();
        test_support::run(&db, "run-live", RunStatus::Running);
        let err = registry.promote(PromoteRequest::new("run-live", "m", "1.0.0")).unwrap_err();
        assert!(matches!(err, ForgeError::Conflict(_)));

        let err = registry.promote(PromoteRequest::new("ghost", "m", "1.0.0")).unwrap_err();
        assert!(matches!(err, ForgeError::NotFound { entity: "Run", .. }));
    }

    #[test]
    fn test_duplicate_name_version_conflicts() {
        let (registry, _db) = service();
        registry.promote(PromoteRequest::new("run-done", "m", "1.0.0")).unwrap();
        let err = registry.promote(PromoteRequest::new("run-done", "m", "1.0.0")).unwrap_err();
        assert!(matches!(err, ForgeError::Conflict(_)));
        assert!(registry.promote(PromoteRequest::new("run-done", "m", "1.1.0")).is_ok());
    }

    #[test]
    fn test_gate_rejects_strictly_lower_score() {
        let (registry, db) = service();
        test_support::model(&db, "model-prev", "run-done");
        passed_eval(&db, "model-prev", 0.74);

        let err = registry
            .promote(PromoteRequest::new("run-done", "m", "2.0.0").with_min_eval_score(0.75))
            .unwrap_err();
        match err {
            ForgeError::EvalGate { run_id, score, threshold } => {
                assert_eq!(run_id, "run-done");
                assert!((score - 0.74).abs() < 1e-9);
                assert!((threshold - 0.75).abs() < 1e-9);
            }
            other => panic!("expected eval gate error, got {other:?}"),
        }
    }

    #[test]
    fn test_gate_accepts_equal_score_and_snapshots_it() {
        let (registry, db) = service();
        test_support::model(&db, "model-prev", "run-done");
        passed_eval(&db, "model-prev", 0.75);

        let model = registry
            .promote(
                PromoteRequest::new("run-done", "m", "2.0.0")
                    .with_target(PromotionStatus::Production)
                    .with_min_eval_score(0.75),
            )
            .unwrap();
        assert_eq!(model.status, PromotionStatus::Production);
        assert_eq!(model.eval_scores.get("overall"), Some(&Value::from(0.75)));
        assert_eq!(model.eval_scores.get("accuracy"), Some(&Value::from(0.75)));
    }

    #[test]
    fn test_no_passed_eval_means_no_gate() {
        let (registry, _db) = service();
        let request = PromoteRequest::new("run-done", "m", "1.0.0").with_min_eval_score(0.99);
        let model = registry.promote(request).unwrap();
        assert_eq!(model.run_id, "run-done");
    }

    #[test]
    fn test_update_status_stamps_only_production() {
        let (registry, _db) = service();
        let model = registry.promote(PromoteRequest::new("run-done", "m", "1.0.0")).unwrap();
        let first = model.promoted_at.unwrap();

        let candidate = registry.update_status(&model.id, PromotionStatus::Candidate).unwrap();
        assert_eq!(candidate.status, PromotionStatus::Candidate);
        assert_eq!(candidate.promoted_at, Some(first));

        let production = registry.update_status(&model.id, PromotionStatus::Production).unwrap();
        assert!(production.promoted_at.unwrap() >= first);

        let archived = registry.update_status(&model.id, PromotionStatus::Archived).unwrap();
        assert_eq!(archived.promoted_at, production.promoted_at);

        assert!(matches!(
            registry.update_status("ghost", PromotionStatus::Production),
            Err(ForgeError::NotFound { .. })
        ));
    }
}
