use crate::error::TrainingResult;
use crate::job::TrainingJobSpec;
use crate::metrics::StepMetrics;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Stream of per-step readings. Ends after the final step; an `Err` item is
/// a terminal trainer failure.
pub type MetricStream = BoxStream<'static, TrainingResult<StepMetrics>>;

/// A training backend.
///
/// The lifecycle engine only ever sees the metric stream, so a real backend
/// can replace the simulation without touching run state handling.
#[async_trait]
pub trait Trainer: Send + Sync {
    fn id(&self) -> &'static str;

    async fn prepare(&self, job: &TrainingJobSpec) -> TrainingResult<()> {
        job.validate()
    }

    fn produce_metric_stream(&self, job: &TrainingJobSpec) -> TrainingResult<MetricStream>;
}
