//! Evaluation records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use super::UnknownStatus;

/// Eval state: `queued → running → {passed | failed | error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalStatus {
    Queued,
    Running,
    Passed,
    Failed,
    Error,
}

impl EvalStatus {
    pub const ALL: [Self; 5] = [
        Self::Queued,
        Self::Running,
        Self::Passed,
        Self::Failed,
        Self::Error,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Error => "error",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Passed | Self::Failed | Self::Error)
    }
}

impl fmt::Display for EvalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvalStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus { kind: "eval", value: s.to_string() })
    }
}

/// Outcome of a single benchmark within an eval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub benchmark: String,
    pub score: f64,
    pub passed: bool,
    pub threshold: f64,
    #[serde(default)]
    pub details: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRecord {
    pub id: String,
    pub model_id: String,
    pub suite: String,
    pub status: EvalStatus,
    /// In benchmark order.
    pub results: Vec<BenchmarkResult>,
    pub regression_baseline_id: Option<String>,
    /// Mean of the higher-is-better scores; set once the eval finishes.
    pub overall_score: Option<f64>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for starting an evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalRequest {
    pub model_id: String,
    #[serde(default = "default_suite")]
    pub suite: String,
    /// Explicit benchmark list; empty means "use the suite's list".
    #[serde(default)]
    pub benchmarks: Vec<String>,
    #[serde(default)]
    pub regression_baseline_id: Option<String>,
}

fn default_suite() -> String {
    "default".to_string()
}

impl EvalRequest {
    #[must_use]
    pub fn new(model_id: impl Into<String>, suite: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            suite: suite.into(),
            benchmarks: Vec::new(),
            regression_baseline_id: None,
        }
    }

    #[must_use]
    pub fn with_benchmarks<I, S>(mut self, benchmarks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.benchmarks = benchmarks.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_baseline(mut self, baseline_id: impl Into<String>) -> Self {
        self.regression_baseline_id = Some(baseline_id.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalFilter {
    pub model_id: Option<String>,
    pub status: Option<EvalStatus>,
}
