//! Dataset registry: registration, lookup, listing, deletion, and lineage.

mod lineage;
mod pii;

pub use lineage::resolve_lineage;
pub use pii::{PII_PATTERNS, scan_pii_fields};

use crate::error::{ForgeError, OrNotFound, Result};
use crate::models::{DatasetFilter, DatasetRecord, NewDataset, Page, Pagination, new_id};
use crate::storage::repositories::format_timestamp;
use crate::storage::{DatasetRepository, SharedDatabase, SqliteDatasetRepository};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::info;

/// First 16 hex chars of SHA-256 over the source locator and registration time.
fn compute_checksum(source_path: &str, created_at: &DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_path.as_bytes());
    hasher.update(format_timestamp(created_at).as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(16);
    digest
}

#[derive(Clone)]
pub struct DatasetService {
    db: SharedDatabase,
}

impl DatasetService {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    pub fn register(&self, input: NewDataset) -> Result<DatasetRecord> {
        input.validate().map_err(ForgeError::Validation)?;

        let mut db = self.db.lock();
        let mut repo = SqliteDatasetRepository::new(&mut db);

        if repo.find_by_name_version(&input.name, &input.version)?.is_some() {
            return Err(ForgeError::Conflict(format!(
                "Dataset '{}' version '{}' already exists",
                input.name, input.version
            )));
        }
        if let Some(parent_id) = &input.parent_dataset_id {
            repo.get_by_id(parent_id).or_not_found("Dataset", parent_id)?;
        }

        let created_at = Utc::now();
        let record = DatasetRecord {
            id: new_id(),
            checksum: compute_checksum(&input.source_path, &created_at),
            name: input.name,
            version: input.version,
            source_path: input.source_path,
            format: input.format,
            description: input.description,
            license: input.license,
            pii_checked: input.pii_checked,
            tags: input.tags,
            row_count: input.row_count,
            parent_dataset_id: input.parent_dataset_id,
            created_at,
        };
        repo.create(&record)?;
        Ok(record)
    }

    pub fn get(&self, id: &str) -> Result<DatasetRecord> {
        let mut db = self.db.lock();
        SqliteDatasetRepository::new(&mut db).get_by_id(id).or_not_found("Dataset", id)
    }

    pub fn exists(&self, id: &str) -> Result<bool> {
        match self.get(id) {
            Ok(_) => Ok(true),
            Err(ForgeError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn list(
        &self,
        filter: &DatasetFilter,
        pagination: Pagination,
    ) -> Result<Page<DatasetRecord>> {
        pagination.validate().map_err(ForgeError::Validation)?;
        let mut db = self.db.lock();
        let (items, total) = SqliteDatasetRepository::new(&mut db).list(filter, pagination)?;
        Ok(Page::new(items, total, pagination))
    }

    /// The dataset followed by its ancestors, nearest first.
    pub fn lineage(&self, id: &str) -> Result<Vec<DatasetRecord>> {
        let mut db = self.db.lock();
        let repo = SqliteDatasetRepository::new(&mut db);
        resolve_lineage(id, |current| match repo.get_by_id(current) {
            Ok(record) => Ok(Some(record)),
            Err(crate::storage::StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        })
    }

    /// Deletes a dataset no run refers to.
    pub fn delete(&self, id: &str) -> Result<()> {
        let mut db = self.db.lock();
        let mut repo = SqliteDatasetRepository::new(&mut db);
        repo.get_by_id(id).or_not_found("Dataset", id)?;

        let references = repo.count_references(id)?;
        if references > 0 {
            return Err(ForgeError::Conflict(format!(
                "Cannot delete dataset '{id}': referenced by {references} run(s)"
            )));
        }
        repo.delete(id).or_not_found("Dataset", id)?;
        info!(dataset_id = %id, "Dataset deleted");
        Ok(())
    }
}
