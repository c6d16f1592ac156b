//! Forge Core - orchestration core of the forge post-training platform.
//!
//! This crate provides:
//! - Cluster resource management (allocation, health probes, cost estimates)
//! - Dataset registration and lineage resolution
//! - The run lifecycle engine
//! - The eval engine and regression comparison
//! - The model registry and its promotion gate
//!
//! # Example
//!
//! ```rust,no_run
//! use forge_core::{ForgeConfig, Platform};
//!
//! #[tokio::main]
//! async fn main() -> forge_core::Result<()> {
//!     let platform = Platform::open(ForgeConfig::load(None)?)?;
//!     let status = platform.cluster_status().await;
//!     println!("{} of {} GPUs free", status.available_gpus, status.total_gpus);
//!     Ok(())
//! }
//! ```

pub mod cluster;
pub mod config;
pub mod datasets;
pub mod error;
pub mod evals;
pub mod models;
pub mod platform;
pub mod registry;
pub mod runs;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

pub use cluster::{
    Allocation, ClusterManager, ClusterStatus, CostEstimate, HealthReport, Node, NodeHealth,
};
pub use config::{ConfigError, ForgeConfig};
pub use datasets::{DatasetService, resolve_lineage, scan_pii_fields};
pub use error::{ErrorKind, ForgeError, Result};
pub use evals::{BenchmarkDelta, EvalComparison, EvalEngine};
pub use models::{
    BenchmarkResult, DatasetFilter, DatasetRecord, EvalFilter, EvalRecord, EvalRequest, EvalStatus,
    LaunchRequest, ModelFilter, ModelRecord, NewDataset, Page, Pagination, PromoteRequest,
    PromotionStatus, RunDetail, RunFilter, RunMetric, RunRecord, RunStatus,
};
pub use platform::{Backends, Platform};
pub use registry::RegistryService;
pub use runs::RunEngine;
pub use storage::{Database, SharedDatabase, StorageError};
