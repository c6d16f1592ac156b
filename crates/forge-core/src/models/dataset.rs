//! Dataset records.
//!
//! Datasets are immutable once registered. The only mutation is deletion,
//! which is refused while any run still references the dataset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered dataset version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: String,
    pub name: String,
    pub version: String,
    /// Where the data lives (e.g. `s3://bucket/prefix`).
    pub source_path: String,
    pub format: String,
    pub description: String,
    pub license: String,
    pub pii_checked: bool,
    pub tags: Vec<String>,
    pub row_count: Option<u64>,
    /// Dataset this one was derived from.
    pub parent_dataset_id: Option<String>,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

/// Registration input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDataset {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub source_path: String,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_license")]
    pub license: String,
    #[serde(default)]
    pub pii_checked: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub row_count: Option<u64>,
    #[serde(default)]
    pub parent_dataset_id: Option<String>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_format() -> String {
    "jsonl".to_string()
}

fn default_license() -> String {
    "unknown".to_string()
}

impl NewDataset {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        source_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            source_path: source_path.into(),
            format: default_format(),
            description: String::new(),
            license: default_license(),
            pii_checked: false,
            tags: Vec::new(),
            row_count: None,
            parent_dataset_id: None,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_dataset_id = Some(parent_id.into());
        self
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("dataset name is required".to_string());
        }
        if self.version.trim().is_empty() {
            return Err("dataset version is required".to_string());
        }
        if self.source_path.trim().is_empty() {
            return Err("dataset source_path is required".to_string());
        }
        Ok(())
    }
}

/// Listing filters. `name` is a substring match, `version` exact, `tag` membership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetFilter {
    pub name: Option<String>,
    pub version: Option<String>,
    pub tag: Option<String>,
}
