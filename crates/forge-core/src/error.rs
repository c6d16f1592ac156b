//! Error types for the forge core.

use crate::config::ConfigError;
use crate::storage::StorageError;
use forge_training::TrainingError;
use serde::Serialize;
use thiserror::Error;

/// Stable error category for the transport layer to map onto status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    EvalGate,
    ExecutionFailure,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Validation => "validation",
            Self::EvalGate => "eval_gate",
            Self::ExecutionFailure => "execution_failure",
            Self::Internal => "internal",
        }
    }
}

/// Core error type for forge operations.
#[derive(Error, Debug)]
pub enum ForgeError {
    /// A referenced entity does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// Uniqueness or state precondition violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Malformed caller input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Promotion blocked by the eval score gate.
    #[error("Eval gate failed for run '{run_id}': score {score:.4} below threshold {threshold:.4}")]
    EvalGate { run_id: String, score: f64, threshold: f64 },

    /// A background task ended in failure.
    #[error("Execution failed: {0}")]
    ExecutionFailure(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(StorageError),

    /// Trainer or evaluator backend errors
    #[error("Training error: {0}")]
    Training(TrainingError),
}

impl ForgeError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Validation(_) => ErrorKind::Validation,
            Self::EvalGate { .. } => ErrorKind::EvalGate,
            Self::ExecutionFailure(_) => ErrorKind::ExecutionFailure,
            Self::Config(_) | Self::Storage(_) | Self::Training(_) => ErrorKind::Internal,
        }
    }
}

impl From<StorageError> for ForgeError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Storage(other),
        }
    }
}

impl From<TrainingError> for ForgeError {
    fn from(err: TrainingError) -> Self {
        match err {
            TrainingError::InvalidRecipe(msg) | TrainingError::InvalidSpec(msg) => {
                Self::Validation(msg)
            }
            other => Self::Training(other),
        }
    }
}

/// Result type alias for forge operations.
pub type Result<T> = std::result::Result<T, ForgeError>;

/// Names the missing entity when a storage lookup comes back empty.
pub(crate) trait OrNotFound<T> {
    fn or_not_found(self, entity: &'static str, id: &str) -> Result<T>;
}

impl<T> OrNotFound<T> for crate::storage::StorageResult<T> {
    fn or_not_found(self, entity: &'static str, id: &str) -> Result<T> {
        self.map_err(|err| match err {
            StorageError::NotFound(_) => ForgeError::not_found(entity, id),
            other => other.into(),
        })
    }
}
