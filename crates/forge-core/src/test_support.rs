//! Fixtures shared by unit tests that need rows behind foreign keys.

use crate::models::{DatasetRecord, ModelRecord, PromotionStatus, RunRecord, RunStatus};
use crate::storage::{
    DatasetRepository, ModelRepository, RunRepository, SharedDatabase, SqliteDatasetRepository,
    SqliteModelRepository, SqliteRunRepository,
};
use chrono::Utc;
use forge_training::RecipeKind;
use serde_json::Map;

pub(crate) fn dataset(db: &SharedDatabase, id: &str) -> DatasetRecord {
    let record = DatasetRecord {
        id: id.to_string(),
        name: format!("dataset-{id}"),
        version: "1.0.0".to_string(),
        source_path: format!("s3://forge-datasets/{id}"),
        format: "jsonl".to_string(),
        description: String::new(),
        license: "apache-2.0".to_string(),
        pii_checked: true,
        tags: vec![],
        row_count: Some(1000),
        parent_dataset_id: None,
        checksum: "0123456789abcdef".to_string(),
        created_at: Utc::now(),
    };
    SqliteDatasetRepository::new(&mut db.lock()).create(&record).unwrap();
    record
}

pub(crate) fn run(db: &SharedDatabase, id: &str, status: RunStatus) -> RunRecord {
    if SqliteDatasetRepository::new(&mut db.lock()).get_by_id("ds-fixture").is_err() {
        dataset(db, "ds-fixture");
    }
    let now = Utc::now();
    let record = RunRecord {
        id: id.to_string(),
        name: format!("run-{id}"),
        base_model: "meta-llama/Llama-2-7b-hf".to_string(),
        dataset_id: "ds-fixture".to_string(),
        config: RecipeKind::LoraSft.defaults(),
        status,
        num_gpus: 1,
        priority: 0,
        tags: vec![],
        error_message: None,
        retry_count: 0,
        started_at: Some(now),
        completed_at: status.is_terminal().then_some(now),
        created_at: now,
    };
    SqliteRunRepository::new(&mut db.lock()).create(&record).unwrap();
    record
}

pub(crate) fn model(db: &SharedDatabase, id: &str, run_id: &str) -> ModelRecord {
    let record = ModelRecord {
        id: id.to_string(),
        run_id: run_id.to_string(),
        name: format!("model-{id}"),
        version: "1.0.0".to_string(),
        description: String::new(),
        status: PromotionStatus::Staging,
        base_model: "meta-llama/Llama-2-7b-hf".to_string(),
        recipe: RecipeKind::LoraSft,
        artifact_path: None,
        eval_scores: Map::new(),
        promoted_at: None,
        created_at: Utc::now(),
    };
    SqliteModelRepository::new(&mut db.lock()).create(&record).unwrap();
    record
}
