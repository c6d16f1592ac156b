//! Data structures for the forge platform.
//!
//! Records are what the persistence layer stores and what the platform hands
//! back to the transport layer. Request types carry caller input.

pub mod dataset;
pub mod eval;
pub mod page;
pub mod registry;
pub mod run;

pub use dataset::{DatasetFilter, DatasetRecord, NewDataset};
pub use eval::{BenchmarkResult, EvalFilter, EvalRecord, EvalRequest, EvalStatus};
pub use page::{Page, Pagination};
pub use registry::{ModelFilter, ModelRecord, PromoteRequest, PromotionStatus};
pub use run::{LaunchRequest, RunDetail, RunFilter, RunMetric, RunRecord, RunStatus};

/// Short random identifier used for every record.
#[must_use]
pub fn new_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

/// Error returned when a stored status string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} status: {value}")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}
