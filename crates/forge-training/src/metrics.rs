use serde::{Deserialize, Serialize};

/// Readings produced by a trainer for a single optimizer step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepMetrics {
    /// 1-based step number.
    pub step: u64,
    pub loss: f64,
    pub learning_rate: f64,
    /// Fractional epoch reached at this step.
    pub epoch: f64,
    #[serde(default)]
    pub gpu_memory_mb: Option<f64>,
    #[serde(default)]
    pub throughput_samples_sec: Option<f64>,
}
