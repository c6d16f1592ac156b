//! Model registry records.

use chrono::{DateTime, Utc};
use forge_training::RecipeKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use super::UnknownStatus;

/// Where a registered model sits in the release process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionStatus {
    #[default]
    Staging,
    Candidate,
    Production,
    Archived,
}

impl PromotionStatus {
    pub const ALL: [Self; 4] = [Self::Staging, Self::Candidate, Self::Production, Self::Archived];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Staging => "staging",
            Self::Candidate => "candidate",
            Self::Production => "production",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for PromotionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromotionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus { kind: "model", value: s.to_string() })
    }
}

/// A registry entry created from a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: String,
    pub run_id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub status: PromotionStatus,
    pub base_model: String,
    pub recipe: RecipeKind,
    pub artifact_path: Option<String>,
    /// Per-benchmark scores plus `overall`, copied from the gating eval.
    pub eval_scores: Map<String, Value>,
    pub promoted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoteRequest {
    pub run_id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub target_status: PromotionStatus,
    /// Gate threshold; `None` skips the gate.
    #[serde(default)]
    pub min_eval_score: Option<f64>,
}

impl PromoteRequest {
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            name: name.into(),
            version: version.into(),
            description: String::new(),
            target_status: PromotionStatus::Staging,
            min_eval_score: None,
        }
    }

    #[must_use]
    pub fn with_target(mut self, status: PromotionStatus) -> Self {
        self.target_status = status;
        self
    }

    #[must_use]
    pub fn with_min_eval_score(mut self, score: f64) -> Self {
        self.min_eval_score = Some(score);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFilter {
    pub status: Option<PromotionStatus>,
    pub name: Option<String>,
}
