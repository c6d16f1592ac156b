//! Forge Training
//!
//! Backend-agnostic training primitives for:
//! - Describing recipes and merging caller overrides (`resolve_recipe`)
//! - Describing a training job (`TrainingJobSpec`)
//! - Implementing training and evaluation backends (`Trainer`, `Evaluator`)
//! - Reporting progress (`ProgressSink`)

pub mod error;
pub mod evaluator;
pub mod job;
pub mod metrics;
pub mod progress;
pub mod recipe;
pub mod simulated;
pub mod trainer;

pub use error::{TrainingError, TrainingResult};
pub use evaluator::{BenchmarkScore, EvalTarget, Evaluator, ScoreDirection};
pub use job::{STEPS_PER_EPOCH, TrainingJobSpec};
pub use metrics::StepMetrics;
pub use progress::{ProgressEvent, ProgressSink, StdoutProgressSink, TracingProgressSink};
pub use recipe::{DpoConfig, LoraSftConfig, RecipeConfig, RecipeKind, RlhfConfig, resolve_recipe};
pub use simulated::{SimulatedEvaluator, SimulatedTrainer};
pub use trainer::{MetricStream, Trainer};
