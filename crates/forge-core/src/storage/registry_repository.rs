//! Registry and evaluation persistence.

use crate::models::{
    BenchmarkResult, EvalFilter, EvalRecord, EvalStatus, ModelFilter, ModelRecord, Pagination,
    PromotionStatus,
};
use crate::storage::database::Database;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::repositories::{
    Conditions, format_timestamp, not_found_error, parse_enum_field, parse_json_field,
    parse_optional_timestamp, parse_timestamp,
};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tracing::{debug, info};

/// Repository trait for model registry entries.
pub trait ModelRepository {
    /// Inserts a model. A duplicate `(name, version)` is a `Conflict`.
    fn create(&mut self, model: &ModelRecord) -> StorageResult<()>;

    fn get_by_id(&self, id: &str) -> StorageResult<ModelRecord>;

    fn find_by_name_version(
        &self,
        name: &str,
        version: &str,
    ) -> StorageResult<Option<ModelRecord>>;

    fn list(
        &self,
        filter: &ModelFilter,
        pagination: Pagination,
    ) -> StorageResult<(Vec<ModelRecord>, u64)>;

    /// Sets the status; `promoted_at` replaces the stored value only when given.
    fn update_status(
        &mut self,
        id: &str,
        status: PromotionStatus,
        promoted_at: Option<DateTime<Utc>>,
    ) -> StorageResult<()>;
}

/// Repository trait for evaluations and their benchmark results.
pub trait EvalRepository {
    fn create(&mut self, eval: &EvalRecord) -> StorageResult<()>;

    /// Loads the eval with its results in benchmark order.
    fn get_by_id(&self, id: &str) -> StorageResult<EvalRecord>;

    fn list(
        &self,
        filter: &EvalFilter,
        pagination: Pagination,
    ) -> StorageResult<(Vec<EvalRecord>, u64)>;

    /// `queued → running`. Returns `false` if the eval was not queued.
    fn mark_running(&mut self, id: &str, at: DateTime<Utc>) -> StorageResult<bool>;

    /// `running → passed | failed`, storing results and the overall score atomically.
    fn finish(
        &mut self,
        id: &str,
        status: EvalStatus,
        results: &[BenchmarkResult],
        overall_score: f64,
        at: DateTime<Utc>,
    ) -> StorageResult<bool>;

    /// Moves a non-terminal eval to `error`.
    fn mark_error(&mut self, id: &str, message: &str, at: DateTime<Utc>) -> StorageResult<bool>;

    /// Most recently completed passed eval of any model built from `run_id`.
    fn latest_passed_for_run(&self, run_id: &str) -> StorageResult<Option<EvalRecord>>;
}

// ============================================================================
// SQLite Model Repository
// ============================================================================

const MODEL_COLUMNS: &str = "id, run_id, name, version, description, status, base_model, recipe, \
                             artifact_path, eval_scores, promoted_at, created_at";

fn model_from_row(row: &Row) -> rusqlite::Result<ModelRecord> {
    Ok(ModelRecord {
        id: row.get(0)?,
        run_id: row.get(1)?,
        name: row.get(2)?,
        version: row.get(3)?,
        description: row.get(4)?,
        status: parse_enum_field(row, 5, "status")?,
        base_model: row.get(6)?,
        recipe: parse_enum_field(row, 7, "recipe")?,
        artifact_path: row.get(8)?,
        eval_scores: parse_json_field(row, 9, "eval_scores")?,
        promoted_at: parse_optional_timestamp(row, 10, "promoted_at")?,
        created_at: parse_timestamp(row, 11, "created_at")?,
    })
}

/// SQLite implementation of ModelRepository.
pub struct SqliteModelRepository<'a> {
    db: &'a mut Database,
}

impl<'a> SqliteModelRepository<'a> {
    pub fn new(db: &'a mut Database) -> Self {
        Self { db }
    }
}

impl ModelRepository for SqliteModelRepository<'_> {
    fn create(&mut self, model: &ModelRecord) -> StorageResult<()> {
        let scores_json = serde_json::to_string(&model.eval_scores)?;
        self.db
            .conn_mut()
            .execute(
                &format!(
                    "INSERT INTO models ({MODEL_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    model.id,
                    model.run_id,
                    model.name,
                    model.version,
                    model.description,
                    model.status.as_str(),
                    model.base_model,
                    model.recipe.as_str(),
                    model.artifact_path,
                    scores_json,
                    model.promoted_at.as_ref().map(format_timestamp),
                    format_timestamp(&model.created_at),
                ],
            )
            .map_err(|e| {
                StorageError::from_insert(e, || {
                    format!("Model '{}' version '{}' already exists", model.name, model.version)
                })
            })?;
        info!(
            model_id = %model.id,
            run_id = %model.run_id,
            status = %model.status,
            "Created model"
        );
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> StorageResult<ModelRecord> {
        self.db
            .conn()
            .query_row(
                &format!("SELECT {MODEL_COLUMNS} FROM models WHERE id = ?1"),
                params![id],
                model_from_row,
            )
            .optional()?
            .ok_or_else(|| not_found_error("models", id))
    }

    fn find_by_name_version(
        &self,
        name: &str,
        version: &str,
    ) -> StorageResult<Option<ModelRecord>> {
        let found = self
            .db
            .conn()
            .query_row(
                &format!("SELECT {MODEL_COLUMNS} FROM models WHERE name = ?1 AND version = ?2"),
                params![name, version],
                model_from_row,
            )
            .optional()?;
        Ok(found)
    }

    fn list(
        &self,
        filter: &ModelFilter,
        pagination: Pagination,
    ) -> StorageResult<(Vec<ModelRecord>, u64)> {
        let mut conditions = Conditions::default();
        if let Some(status) = filter.status {
            conditions.push("status = ?", status.as_str().to_string());
        }
        if let Some(name) = &filter.name {
            conditions.push("name LIKE ?", format!("%{name}%"));
        }

        let conn = self.db.conn();
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM models{}", conditions.where_sql()),
            params_from_iter(conditions.values()),
            |row| row.get(0),
        )?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MODEL_COLUMNS} FROM models{}{}",
            conditions.where_sql(),
            conditions.page_sql()
        ))?;
        let models = stmt
            .query_map(params_from_iter(conditions.paged_values(pagination)), model_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok((models, total as u64))
    }

    fn update_status(
        &mut self,
        id: &str,
        status: PromotionStatus,
        promoted_at: Option<DateTime<Utc>>,
    ) -> StorageResult<()> {
        let rows_affected = self.db.conn_mut().execute(
            "UPDATE models SET status = ?2, promoted_at = COALESCE(?3, promoted_at) WHERE id = ?1",
            params![id, status.as_str(), promoted_at.as_ref().map(format_timestamp)],
        )?;
        if rows_affected == 0 {
            return Err(not_found_error("models", id));
        }
        debug!(model_id = %id, status = %status, "Updated model status");
        Ok(())
    }
}

// ============================================================================
// SQLite Eval Repository
// ============================================================================

const EVAL_COLUMNS: &str = "id, model_id, suite, status, regression_baseline_id, overall_score, \
                            error_message, started_at, completed_at, created_at";

fn eval_from_row(row: &Row) -> rusqlite::Result<EvalRecord> {
    Ok(EvalRecord {
        id: row.get(0)?,
        model_id: row.get(1)?,
        suite: row.get(2)?,
        status: parse_enum_field(row, 3, "status")?,
        results: Vec::new(),
        regression_baseline_id: row.get(4)?,
        overall_score: row.get(5)?,
        error_message: row.get(6)?,
        started_at: parse_optional_timestamp(row, 7, "started_at")?,
        completed_at: parse_optional_timestamp(row, 8, "completed_at")?,
        created_at: parse_timestamp(row, 9, "created_at")?,
    })
}

fn load_results(conn: &Connection, eval_id: &str) -> StorageResult<Vec<BenchmarkResult>> {
    let mut stmt = conn.prepare(
        "SELECT benchmark, score, passed, threshold, details FROM eval_results \
         WHERE eval_id = ?1 ORDER BY position",
    )?;
    let results = stmt
        .query_map(params![eval_id], |row| {
            Ok(BenchmarkResult {
                benchmark: row.get(0)?,
                score: row.get(1)?,
                passed: row.get(2)?,
                threshold: row.get(3)?,
                details: parse_json_field(row, 4, "details")?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(results)
}

fn with_results(conn: &Connection, mut eval: EvalRecord) -> StorageResult<EvalRecord> {
    eval.results = load_results(conn, &eval.id)?;
    Ok(eval)
}

/// SQLite implementation of EvalRepository.
pub struct SqliteEvalRepository<'a> {
    db: &'a mut Database,
}

impl<'a> SqliteEvalRepository<'a> {
    pub fn new(db: &'a mut Database) -> Self {
        Self { db }
    }
}

impl EvalRepository for SqliteEvalRepository<'_> {
    fn create(&mut self, eval: &EvalRecord) -> StorageResult<()> {
        self.db
            .conn_mut()
            .execute(
                &format!(
                    "INSERT INTO evals ({EVAL_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    eval.id,
                    eval.model_id,
                    eval.suite,
                    eval.status.as_str(),
                    eval.regression_baseline_id,
                    eval.overall_score,
                    eval.error_message,
                    eval.started_at.as_ref().map(format_timestamp),
                    eval.completed_at.as_ref().map(format_timestamp),
                    format_timestamp(&eval.created_at),
                ],
            )
            .map_err(|e| {
                StorageError::from_insert(e, || format!("Eval '{}' already exists", eval.id))
            })?;
        info!(eval_id = %eval.id, model_id = %eval.model_id, suite = %eval.suite, "Created eval");
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> StorageResult<EvalRecord> {
        let conn = self.db.conn();
        let eval = conn
            .query_row(
                &format!("SELECT {EVAL_COLUMNS} FROM evals WHERE id = ?1"),
                params![id],
                eval_from_row,
            )
            .optional()?
            .ok_or_else(|| not_found_error("evals", id))?;
        with_results(conn, eval)
    }

    fn list(
        &self,
        filter: &EvalFilter,
        pagination: Pagination,
    ) -> StorageResult<(Vec<EvalRecord>, u64)> {
        let mut conditions = Conditions::default();
        if let Some(model_id) = &filter.model_id {
            conditions.push("model_id = ?", model_id.clone());
        }
        if let Some(status) = filter.status {
            conditions.push("status = ?", status.as_str().to_string());
        }

        let conn = self.db.conn();
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM evals{}", conditions.where_sql()),
            params_from_iter(conditions.values()),
            |row| row.get(0),
        )?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVAL_COLUMNS} FROM evals{}{}",
            conditions.where_sql(),
            conditions.page_sql()
        ))?;
        let evals = stmt
            .query_map(params_from_iter(conditions.paged_values(pagination)), eval_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let evals = evals
            .into_iter()
            .map(|eval| with_results(conn, eval))
            .collect::<StorageResult<Vec<_>>>()?;
        Ok((evals, total as u64))
    }

    fn mark_running(&mut self, id: &str, at: DateTime<Utc>) -> StorageResult<bool> {
        let rows_affected = self.db.conn_mut().execute(
            "UPDATE evals SET status = 'running', started_at = ?2 \
             WHERE id = ?1 AND status = 'queued'",
            params![id, format_timestamp(&at)],
        )?;
        Ok(rows_affected > 0)
    }

    fn finish(
        &mut self,
        id: &str,
        status: EvalStatus,
        results: &[BenchmarkResult],
        overall_score: f64,
        at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        if !matches!(status, EvalStatus::Passed | EvalStatus::Failed) {
            return Err(StorageError::InvalidData(format!("eval cannot finish as {status}")));
        }
        let applied = self.db.transaction(|tx| {
            let rows_affected = tx.execute(
                "UPDATE evals SET status = ?2, overall_score = ?3, completed_at = ?4 \
                 WHERE id = ?1 AND status = 'running'",
                params![id, status.as_str(), overall_score, format_timestamp(&at)],
            )?;
            if rows_affected == 0 {
                return Ok(false);
            }
            for (position, result) in results.iter().enumerate() {
                tx.execute(
                    "INSERT INTO eval_results \
                     (eval_id, position, benchmark, score, passed, threshold, details) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        id,
                        position as i64,
                        result.benchmark,
                        result.score,
                        result.passed,
                        result.threshold,
                        serde_json::to_string(&result.details)?,
                    ],
                )?;
            }
            Ok(true)
        })?;
        debug!(eval_id = %id, status = %status, applied, "Eval finished");
        Ok(applied)
    }

    fn mark_error(&mut self, id: &str, message: &str, at: DateTime<Utc>) -> StorageResult<bool> {
        let rows_affected = self.db.conn_mut().execute(
            "UPDATE evals SET status = 'error', error_message = ?2, completed_at = ?3 \
             WHERE id = ?1 AND status IN ('queued', 'running')",
            params![id, message, format_timestamp(&at)],
        )?;
        Ok(rows_affected > 0)
    }

    fn latest_passed_for_run(&self, run_id: &str) -> StorageResult<Option<EvalRecord>> {
        let conn = self.db.conn();
        let eval = conn
            .query_row(
                &format!(
                    "SELECT {EVAL_COLUMNS} FROM evals \
                     WHERE model_id IN (SELECT id FROM models WHERE run_id = ?1) \
                     AND status = 'passed' \
                     ORDER BY completed_at DESC, rowid DESC LIMIT 1"
                ),
                params![run_id],
                eval_from_row,
            )
            .optional()?;
        eval.map(|e| with_results(conn, e)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DatasetRecord, RunRecord, RunStatus};
    use crate::storage::repositories::{
        DatasetRepository, RunRepository, SqliteDatasetRepository, SqliteRunRepository,
    };
    use chrono::Duration;
    use forge_training::RecipeKind;
    use serde_json::Map;

    fn seeded() -> Database {
        let mut db = Database::open_in_memory().unwrap();
        SqliteDatasetRepository::new(&mut db)
            .create(&DatasetRecord {
                id: "ds-1".to_string(),
                name: "alpaca".to_string(),
                version: "1.0.0".to_string(),
                source_path: "s3://a".to_string(),
                format: "jsonl".to_string(),
                description: String::new(),
                license: "MIT".to_string(),
                pii_checked: true,
                tags: vec![],
                row_count: None,
                parent_dataset_id: None,
                checksum: "c".to_string(),
                created_at: Utc::now(),
            })
            .unwrap();
        SqliteRunRepository::new(&mut db)
            .create(&RunRecord {
                id: "run-1".to_string(),
                name: "r".to_string(),
                base_model: "gpt2".to_string(),
                dataset_id: "ds-1".to_string(),
                config: RecipeKind::Dpo.defaults(),
                status: RunStatus::Completed,
                num_gpus: 1,
                priority: 0,
                tags: vec![],
                error_message: None,
                retry_count: 0,
                started_at: None,
                completed_at: None,
                created_at: Utc::now(),
            })
            .unwrap();
        db
    }

    fn model(id: &str, version: &str) -> ModelRecord {
        ModelRecord {
            id: id.to_string(),
            run_id: "run-1".to_string(),
            name: "orca-7b".to_string(),
            version: version.to_string(),
            description: String::new(),
            status: PromotionStatus::Staging,
            base_model: "gpt2".to_string(),
            recipe: RecipeKind::Dpo,
            artifact_path: Some(format!("./model_registry/{id}")),
            eval_scores: Map::new(),
            promoted_at: Some(Utc::now()),
            created_at: Utc::now(),
        }
    }

    fn eval(id: &str, model_id: &str) -> EvalRecord {
        EvalRecord {
            id: id.to_string(),
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
        }
    }

    fn result(benchmark: &str, score: f64) -> BenchmarkResult {
        BenchmarkResult {
            benchmark: benchmark.to_string(),
            score,
            passed: true,
            threshold: 0.5,
            details: Map::new(),
        }
    }

    #[test]
    fn test_model_name_version_unique() {
        let mut db = seeded();
        let mut repo = SqliteModelRepository::new(&mut db);
        repo.create(&model("m-1", "1.0")).unwrap();
        assert!(matches!(repo.create(&model("m-2", "1.0")), Err(StorageError::Conflict(_))));
        assert!(repo.find_by_name_version("orca-7b", "1.0").unwrap().is_some());
    }

    #[test]
    fn test_update_status_keeps_promoted_at_unless_given() {
        let mut db = seeded();
        let mut repo = SqliteModelRepository::new(&mut db);
        repo.create(&model("m-1", "1.0")).unwrap();
        let before = repo.get_by_id("m-1").unwrap().promoted_at;

        repo.update_status("m-1", PromotionStatus::Candidate, None).unwrap();
        let after = repo.get_by_id("m-1").unwrap();
        assert_eq!(after.status, PromotionStatus::Candidate);
        assert_eq!(after.promoted_at, before);

        assert!(matches!(
            repo.update_status("missing", PromotionStatus::Archived, None),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_eval_lifecycle_persists_ordered_results() {
        let mut db = seeded();
        SqliteModelRepository::new(&mut db).create(&model("m-1", "1.0")).unwrap();
        let mut repo = SqliteEvalRepository::new(&mut db);
        repo.create(&eval("e-1", "m-1")).unwrap();

        assert!(!repo.finish("e-1", EvalStatus::Passed, &[], 0.0, Utc::now()).unwrap());
        assert!(repo.mark_running("e-1", Utc::now()).unwrap());
        let results = vec![result("toxicity", 0.1), result("accuracy", 0.8)];
        assert!(repo.finish("e-1", EvalStatus::Passed, &results, 0.45, Utc::now()).unwrap());

        let loaded = repo.get_by_id("e-1").unwrap();
        assert_eq!(loaded.status, EvalStatus::Passed);
        assert_eq!(loaded.results, results);
        assert!(!repo.mark_error("e-1", "late", Utc::now()).unwrap());
    }

    #[test]
    fn test_latest_passed_for_run_picks_most_recent_completion() {
        let mut db = seeded();
        {
            let mut models = SqliteModelRepository::new(&mut db);
            models.create(&model("m-1", "1.0")).unwrap();
            models.create(&model("m-2", "2.0")).unwrap();
        }
        let mut repo = SqliteEvalRepository::new(&mut db);
        let t0 = Utc::now();
        for (id, model_id, score, offset) in [("e-old", "m-1", 0.9, 0), ("e-new", "m-2", 0.6, 10)] {
            repo.create(&eval(id, model_id)).unwrap();
            repo.mark_running(id, t0).unwrap();
            let at = t0 + Duration::seconds(offset);
            repo.finish(id, EvalStatus::Passed, &[], score, at).unwrap();
        }
        repo.create(&eval("e-failed", "m-1")).unwrap();
        repo.mark_running("e-failed", t0).unwrap();
        repo.finish("e-failed", EvalStatus::Failed, &[], 0.1, t0 + Duration::seconds(20)).unwrap();

        let latest = repo.latest_passed_for_run("run-1").unwrap().unwrap();
        assert_eq!(latest.id, "e-new");
        assert!(repo.latest_passed_for_run("run-other").unwrap().is_none());
    }
}
