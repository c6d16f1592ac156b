//! Training run records and the run state machine.

use chrono::{DateTime, Utc};
use forge_training::{RecipeConfig, RecipeKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use super::UnknownStatus;

/// Run state.
///
/// `pending → provisioning → running → {completed | failed}`; a run that
/// cannot be provisioned goes straight to `failed`, and `cancelled` is
/// reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Provisioning,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::Provisioning,
        Self::Running,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Provisioning => "provisioning",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Checks if a run in this state may move to `to`.
    #[must_use]
    #[allow(clippy::match_same_arms)] // Each arm represents a distinct state transition rule
    pub fn can_transition_to(self, to: Self) -> bool {
        match (self, to) {
            (Self::Pending, Self::Provisioning) => true,
            (Self::Provisioning, Self::Running | Self::Failed) => true,
            (Self::Running, Self::Completed | Self::Failed) => true,
            (from, Self::Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }

    /// States from which `to` is reachable in one step.
    #[must_use]
    pub fn predecessors(to: Self) -> Vec<Self> {
        Self::ALL.into_iter().filter(|from| from.can_transition_to(to)).collect()
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus { kind: "run", value: s.to_string() })
    }
}

/// A training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub name: String,
    pub base_model: String,
    pub dataset_id: String,
    /// Defaults merged with the caller's overrides.
    pub config: RecipeConfig,
    pub status: RunStatus,
    pub num_gpus: u32,
    pub priority: i32,
    pub tags: Vec<String>,
    pub error_message: Option<String>,
    /// Reserved; the lifecycle engine never retries.
    pub retry_count: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RunRecord {
    #[must_use]
    pub fn recipe(&self) -> RecipeKind {
        self.config.kind()
    }
}

/// One persisted training step. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetric {
    pub run_id: String,
    pub step: u64,
    pub loss: f64,
    pub learning_rate: f64,
    pub epoch: f64,
    pub gpu_memory_mb: Option<f64>,
    pub throughput_samples_sec: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// A run together with its full metric series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDetail {
    #[serde(flatten)]
    pub run: RunRecord,
    pub metrics: Vec<RunMetric>,
}

/// Launch input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub name: String,
    pub base_model: String,
    pub dataset_id: String,
    #[serde(default = "default_recipe")]
    pub recipe: RecipeKind,
    #[serde(default)]
    pub config_overrides: Map<String, Value>,
    #[serde(default = "default_num_gpus")]
    pub num_gpus: u32,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_recipe() -> RecipeKind {
    RecipeKind::LoraSft
}

fn default_num_gpus() -> u32 {
    1
}

impl LaunchRequest {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        base_model: impl Into<String>,
        dataset_id: impl Into<String>,
        recipe: RecipeKind,
    ) -> Self {
        Self {
            name: name.into(),
            base_model: base_model.into(),
            dataset_id: dataset_id.into(),
            recipe,
            config_overrides: Map::new(),
            num_gpus: default_num_gpus(),
            priority: 0,
            tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config_overrides.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_gpus(mut self, num_gpus: u32) -> Self {
        self.num_gpus = num_gpus;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFilter {
    pub status: Option<RunStatus>,
    pub recipe: Option<RecipeKind>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_edges() {
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Provisioning));
        assert!(RunStatus::Provisioning.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Completed));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Failed));
    }

    #[test]
    fn test_no_skipping_or_leaving_terminal_states() {
        assert!(!RunStatus::Pending.can_transition_to(RunStatus::Running));
        assert!(!RunStatus::Pending.can_transition_to(RunStatus::Completed));
        for terminal in [RunStatus::Completed, RunStatus::Failed, RunStatus::Cancelled] {
            for to in RunStatus::ALL {
                assert!(!terminal.can_transition_to(to), "{terminal} -> {to}");
            }
        }
    }

    #[test]
    fn test_cancel_reachable_from_every_live_state() {
        assert_eq!(
            RunStatus::predecessors(RunStatus::Cancelled),
            vec![RunStatus::Pending, RunStatus::Provisioning, RunStatus::Running]
        );
        assert_eq!(RunStatus::predecessors(RunStatus::Completed), vec![RunStatus::Running]);
    }

    #[test]
    fn test_status_strings_round_trip() {
        for status in RunStatus::ALL {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
        assert!("paused".parse::<RunStatus>().is_err());
    }
}
