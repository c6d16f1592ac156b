use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("invalid training job spec: {0}")]
    InvalidSpec(String),

    #[error("invalid recipe configuration: {0}")]
    InvalidRecipe(String),

    #[error("trainer error: {0}")]
    Trainer(String),

    #[error("evaluator error: {0}")]
    Evaluator(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
