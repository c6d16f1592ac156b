//! Repository implementations for data persistence.
//!
//! This module provides the Repository pattern implementation for datasets
//! and training runs using SQLite as the backing store. Registry entries and
//! evaluations live in [`crate::storage::registry_repository`].

use crate::storage::database::Database;
use crate::storage::error::{StorageError, StorageResult};
use chrono::{DateTime, SecondsFormat, Utc};
use forge_training::{RecipeConfig, RecipeKind};
use rusqlite::types::Value as SqlValue;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};
use std::str::FromStr;
use tracing::{debug, info};

use crate::models::{
    DatasetFilter, DatasetRecord, Pagination, RunFilter, RunMetric, RunRecord, RunStatus,
};

// ============================================================================
// Row Parsing Helpers
// ============================================================================

/// Formats a timestamp the way every table stores it (RFC 3339, microseconds, `Z`).
///
/// The fixed width keeps lexical and chronological order identical.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn invalid_column(idx: usize, column_name: &str) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(idx, column_name.to_string(), rusqlite::types::Type::Text)
}

/// Parses a JSON field from a row into a deserializable type.
pub(crate) fn parse_json_field<T>(row: &Row, idx: usize, column_name: &str) -> rusqlite::Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let json_str: String = row.get(idx)?;
    serde_json::from_str(&json_str).map_err(|_| invalid_column(idx, column_name))
}

/// Parses an RFC3339 timestamp string from a row into a `DateTime<Utc>`.
pub(crate) fn parse_timestamp(
    row: &Row,
    idx: usize,
    column_name: &str,
) -> rusqlite::Result<DateTime<Utc>> {
    let timestamp_str: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&timestamp_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| invalid_column(idx, column_name))
}

pub(crate) fn parse_optional_timestamp(
    row: &Row,
    idx: usize,
    column_name: &str,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let timestamp_str: Option<String> = row.get(idx)?;
    timestamp_str
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| invalid_column(idx, column_name))
        })
        .transpose()
}

/// Parses a status or kind column through its `FromStr` impl.
pub(crate) fn parse_enum_field<T: FromStr>(
    row: &Row,
    idx: usize,
    column_name: &str,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|_| invalid_column(idx, column_name))
}

pub(crate) fn not_found_error(table: &str, id: &str) -> StorageError {
    StorageError::NotFound(format!("{table} with id {id} not found"))
}

/// `WHERE` clause plus bound values, built up filter by filter.
#[derive(Default)]
pub(crate) struct Conditions {
    clauses: Vec<String>,
    values: Vec<SqlValue>,
}

impl Conditions {
    pub(crate) fn push(&mut self, clause: &str, value: impl Into<SqlValue>) {
        self.values.push(value.into());
        self.clauses.push(clause.replace('?', &format!("?{}", self.values.len())));
    }

    pub(crate) fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub(crate) fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Values followed by LIMIT and OFFSET, numbered after the filters.
    pub(crate) fn page_sql(&self) -> String {
        let n = self.values.len();
        format!(" ORDER BY created_at DESC, rowid DESC LIMIT ?{} OFFSET ?{}", n + 1, n + 2)
    }

    pub(crate) fn paged_values(&self, pagination: Pagination) -> Vec<SqlValue> {
        let mut values = self.values.clone();
        values.push(SqlValue::Integer(i64::from(pagination.limit)));
        values.push(SqlValue::Integer(i64::from(pagination.offset)));
        values
    }
}

// ============================================================================
// Repository Traits
// ============================================================================

/// Repository trait for dataset operations.
pub trait DatasetRepository {
    /// Inserts a dataset. A duplicate `(name, version)` is a `Conflict`.
    fn create(&mut self, dataset: &DatasetRecord) -> StorageResult<()>;

    fn get_by_id(&self, id: &str) -> StorageResult<DatasetRecord>;

    fn find_by_name_version(
        &self,
        name: &str,
        version: &str,
    ) -> StorageResult<Option<DatasetRecord>>;

    /// Filtered page, newest first, plus the filtered total.
    fn list(
        &self,
        filter: &DatasetFilter,
        pagination: Pagination,
    ) -> StorageResult<(Vec<DatasetRecord>, u64)>;

    /// Number of runs that reference the dataset.
    fn count_references(&self, id: &str) -> StorageResult<u64>;

    fn delete(&mut self, id: &str) -> StorageResult<()>;
}

/// Repository trait for run and metric operations.
pub trait RunRepository {
    fn create(&mut self, run: &RunRecord) -> StorageResult<()>;

    fn get_by_id(&self, id: &str) -> StorageResult<RunRecord>;

    fn list(
        &self,
        filter: &RunFilter,
        pagination: Pagination,
    ) -> StorageResult<(Vec<RunRecord>, u64)>;

    /// Moves a run to `to` only if its current status is a legal predecessor.
    ///
    /// Entering `running` stamps `started_at`; entering a terminal state stamps
    /// `completed_at`. Returns `false` when no row matched, i.e. the run was
    /// already moved elsewhere (typically cancelled).
    fn transition(
        &mut self,
        id: &str,
        to: RunStatus,
        error_message: Option<&str>,
        at: DateTime<Utc>,
    ) -> StorageResult<bool>;

    /// Appends one step, but only while the run is `running`.
    ///
    /// Returns `false` if the run has left `running`, so no metric can land
    /// after a cancellation has been recorded.
    fn append_metric(&mut self, metric: &RunMetric) -> StorageResult<bool>;

    /// Metrics in ascending step order. `last_n` keeps only the most recent N.
    fn metrics(&self, run_id: &str, last_n: Option<u32>) -> StorageResult<Vec<RunMetric>>;
}

// ============================================================================
// SQLite Dataset Repository
// ============================================================================

const DATASET_COLUMNS: &str = "id, name, version, source_path, format, description, license, \
                               pii_checked, tags, row_count, parent_dataset_id, checksum, \
                               created_at";

fn dataset_from_row(row: &Row) -> rusqlite::Result<DatasetRecord> {
    let row_count: Option<i64> = row.get(9)?;
    Ok(DatasetRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        version: row.get(2)?,
        source_path: row.get(3)?,
        format: row.get(4)?,
        description: row.get(5)?,
        license: row.get(6)?,
        pii_checked: row.get(7)?,
        tags: parse_json_field(row, 8, "tags")?,
        row_count: row_count.map(|n| n as u64),
        parent_dataset_id: row.get(10)?,
        checksum: row.get(11)?,
        created_at: parse_timestamp(row, 12, "created_at")?,
    })
}

/// SQLite implementation of DatasetRepository.
pub struct SqliteDatasetRepository<'a> {
    db: &'a mut Database,
}

impl<'a> SqliteDatasetRepository<'a> {
    pub fn new(db: &'a mut Database) -> Self {
        Self { db }
    }
}

impl DatasetRepository for SqliteDatasetRepository<'_> {
    fn create(&mut self, dataset: &DatasetRecord) -> StorageResult<()> {
        let tags_json = serde_json::to_string(&dataset.tags)?;
        self.db
            .conn_mut()
            .execute(
                &format!(
                    "INSERT INTO datasets ({DATASET_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ),
                params![
                    dataset.id,
                    dataset.name,
                    dataset.version,
                    dataset.source_path,
                    dataset.format,
                    dataset.description,
                    dataset.license,
                    dataset.pii_checked,
                    tags_json,
                    dataset.row_count.map(|n| n as i64),
                    dataset.parent_dataset_id,
                    dataset.checksum,
                    format_timestamp(&dataset.created_at),
                ],
            )
            .map_err(|e| {
                StorageError::from_insert(e, || {
                    format!(
                        "Dataset '{}' version '{}' already exists",
                        dataset.name, dataset.version
                    )
                })
            })?;
        info!(
            dataset_id = %dataset.id,
            name = %dataset.name,
            version = %dataset.version,
            "Created dataset"
        );
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> StorageResult<DatasetRecord> {
        self.db
            .conn()
            .query_row(
                &format!("SELECT {DATASET_COLUMNS} FROM datasets WHERE id = ?1"),
                params![id],
                dataset_from_row,
            )
            .optional()?
            .ok_or_else(|| not_found_error("datasets", id))
    }

    fn find_by_name_version(
        &self,
        name: &str,
        version: &str,
    ) -> StorageResult<Option<DatasetRecord>> {
        let found = self
            .db
            .conn()
            .query_row(
                &format!("SELECT {DATASET_COLUMNS} FROM datasets WHERE name = ?1 AND version = ?2"),
                params![name, version],
                dataset_from_row,
            )
            .optional()?;
        Ok(found)
    }

    fn list(
        &self,
        filter: &DatasetFilter,
        pagination: Pagination,
    ) -> StorageResult<(Vec<DatasetRecord>, u64)> {
        let mut conditions = Conditions::default();
        if let Some(name) = &filter.name {
            conditions.push("name LIKE ?", format!("%{name}%"));
        }
        if let Some(version) = &filter.version {
            conditions.push("version = ?", version.clone());
        }
        if let Some(tag) = &filter.tag {
            conditions.push(
                "EXISTS (SELECT 1 FROM json_each(datasets.tags) WHERE json_each.value = ?)",
                tag.clone(),
            );
        }

        let conn = self.db.conn();
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM datasets{}", conditions.where_sql()),
            params_from_iter(conditions.values()),
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {DATASET_COLUMNS} FROM datasets{}{}",
            conditions.where_sql(),
            conditions.page_sql()
        ))?;
        let datasets = stmt
            .query_map(params_from_iter(conditions.paged_values(pagination)), dataset_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok((datasets, total as u64))
    }

    fn count_references(&self, id: &str) -> StorageResult<u64> {
        let count: i64 = self.db.conn().query_row(
            "SELECT COUNT(*) FROM runs WHERE dataset_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn delete(&mut self, id: &str) -> StorageResult<()> {
        let rows_affected =
            self.db.conn_mut().execute("DELETE FROM datasets WHERE id = ?1", params![id])?;
        if rows_affected == 0 {
            return Err(not_found_error("datasets", id));
        }
        info!(dataset_id = %id, "Deleted dataset");
        Ok(())
    }
}

// ============================================================================
// SQLite Run Repository
// ============================================================================

const RUN_COLUMNS: &str = "id, name, base_model, dataset_id, recipe, config, status, num_gpus, \
                           priority, tags, error_message, retry_count, started_at, completed_at, \
                           created_at";

fn run_from_row(row: &Row) -> rusqlite::Result<RunRecord> {
    let recipe: RecipeKind = parse_enum_field(row, 4, "recipe")?;
    let settings: serde_json::Value = parse_json_field(row, 5, "config")?;
    let config = RecipeConfig::from_settings(recipe, &settings)
        .map_err(|_| invalid_column(5, "config"))?;
    let num_gpus: i64 = row.get(7)?;
    let retry_count: i64 = row.get(11)?;
    Ok(RunRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        base_model: row.get(2)?,
        dataset_id: row.get(3)?,
        config,
        status: parse_enum_field(row, 6, "status")?,
        num_gpus: num_gpus as u32,
        priority: row.get(8)?,
        tags: parse_json_field(row, 9, "tags")?,
        error_message: row.get(10)?,
        retry_count: retry_count as u32,
        started_at: parse_optional_timestamp(row, 12, "started_at")?,
        completed_at: parse_optional_timestamp(row, 13, "completed_at")?,
        created_at: parse_timestamp(row, 14, "created_at")?,
    })
}

fn metric_from_row(row: &Row) -> rusqlite::Result<RunMetric> {
    let step: i64 = row.get(1)?;
    Ok(RunMetric {
        run_id: row.get(0)?,
        step: step as u64,
        loss: row.get(2)?,
        learning_rate: row.get(3)?,
        epoch: row.get(4)?,
        gpu_memory_mb: row.get(5)?,
        throughput_samples_sec: row.get(6)?,
        timestamp: parse_timestamp(row, 7, "timestamp")?,
    })
}

/// SQLite implementation of RunRepository.
pub struct SqliteRunRepository<'a> {
    db: &'a mut Database,
}

impl<'a> SqliteRunRepository<'a> {
    pub fn new(db: &'a mut Database) -> Self {
        Self { db }
    }
}

impl RunRepository for SqliteRunRepository<'_> {
    fn create(&mut self, run: &RunRecord) -> StorageResult<()> {
        let settings = run
            .config
            .settings()
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;
        let config_json = serde_json::to_string(&settings)?;
        let tags_json = serde_json::to_string(&run.tags)?;
        self.db
            .conn_mut()
            .execute(
                &format!(
                    "INSERT INTO runs ({RUN_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
                ),
                params![
                    run.id,
                    run.name,
                    run.base_model,
                    run.dataset_id,
                    run.recipe().as_str(),
                    config_json,
                    run.status.as_str(),
                    i64::from(run.num_gpus),
                    run.priority,
                    tags_json,
                    run.error_message,
                    i64::from(run.retry_count),
                    run.started_at.as_ref().map(format_timestamp),
                    run.completed_at.as_ref().map(format_timestamp),
                    format_timestamp(&run.created_at),
                ],
            )
            .map_err(|e| {
                StorageError::from_insert(e, || format!("Run '{}' already exists", run.id))
            })?;
        info!(run_id = %run.id, recipe = %run.recipe(), "Created run");
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> StorageResult<RunRecord> {
        self.db
            .conn()
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1"),
                params![id],
                run_from_row,
            )
            .optional()?
            .ok_or_else(|| not_found_error("runs", id))
    }

    fn list(
        &self,
        filter: &RunFilter,
        pagination: Pagination,
    ) -> StorageResult<(Vec<RunRecord>, u64)> {
        let mut conditions = Conditions::default();
        if let Some(status) = filter.status {
            conditions.push("status = ?", status.as_str().to_string());
        }
        if let Some(recipe) = filter.recipe {
            conditions.push("recipe = ?", recipe.as_str().to_string());
        }

        let conn = self.db.conn();
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM runs{}", conditions.where_sql()),
            params_from_iter(conditions.values()),
            |row| row.get(0),
        )?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM runs{}{}",
            conditions.where_sql(),
            conditions.page_sql()
        ))?;
        let runs = stmt
            .query_map(params_from_iter(conditions.paged_values(pagination)), run_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok((runs, total as u64))
    }

    fn transition(
        &mut self,
        id: &str,
        to: RunStatus,
        error_message: Option<&str>,
        at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let predecessors = RunStatus::predecessors(to);
        if predecessors.is_empty() {
            return Ok(false);
        }
        let placeholders: Vec<String> =
            (0..predecessors.len()).map(|i| format!("?{}", i + 5)).collect();
        let sql = format!(
            "UPDATE runs SET status = ?2, \
             started_at = CASE WHEN ?2 = 'running' THEN ?3 ELSE started_at END, \
             completed_at = CASE WHEN ?2 IN ('completed', 'failed', 'cancelled') \
                 THEN ?3 ELSE completed_at END, \
             error_message = COALESCE(?4, error_message) \
             WHERE id = ?1 AND status IN ({})",
            placeholders.join(", ")
        );

        let mut values: Vec<SqlValue> = vec![
            SqlValue::Text(id.to_string()),
            SqlValue::Text(to.as_str().to_string()),
            SqlValue::Text(format_timestamp(&at)),
            error_message.map_or(SqlValue::Null, |m| SqlValue::Text(m.to_string())),
        ];
        values.extend(predecessors.iter().map(|s| SqlValue::Text(s.as_str().to_string())));

        let rows_affected = self.db.conn_mut().execute(&sql, params_from_iter(values))?;
        debug!(run_id = %id, to = %to, applied = rows_affected > 0, "Run transition");
        Ok(rows_affected > 0)
    }

    fn append_metric(&mut self, metric: &RunMetric) -> StorageResult<bool> {
        let rows_affected = self
            .db
            .conn_mut()
            .execute(
                "INSERT INTO run_metrics (run_id, step, loss, learning_rate, epoch, gpu_memory_mb, \
                 throughput_samples_sec, timestamp) \
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8 \
                 WHERE EXISTS (SELECT 1 FROM runs WHERE id = ?1 AND status = 'running')",
                params![
                    metric.run_id,
                    metric.step as i64,
                    metric.loss,
                    metric.learning_rate,
                    metric.epoch,
                    metric.gpu_memory_mb,
                    metric.throughput_samples_sec,
                    format_timestamp(&metric.timestamp),
                ],
            )
            .map_err(|e| {
                StorageError::from_insert(e, || {
                    format!("step {} already recorded for run {}", metric.step, metric.run_id)
                })
            })?;
        Ok(rows_affected > 0)
    }

    fn metrics(&self, run_id: &str, last_n: Option<u32>) -> StorageResult<Vec<RunMetric>> {
        const SELECT: &str = "SELECT run_id, step, loss, learning_rate, epoch, gpu_memory_mb, \
                              throughput_samples_sec, timestamp FROM run_metrics WHERE run_id = ?1";
        let conn = self.db.conn();
        let metrics = match last_n {
            Some(n) if n > 0 => {
                let mut stmt = conn.prepare(&format!("{SELECT} ORDER BY step DESC LIMIT ?2"))?;
                let mut recent = stmt
                    .query_map(params![run_id, i64::from(n)], metric_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                recent.reverse();
                recent
            }
            _ => {
                let mut stmt = conn.prepare(&format!("{SELECT} ORDER BY step ASC"))?;
                stmt.query_map(params![run_id], metric_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(metrics)
    }
}
