//! Node and cluster snapshot types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeHealth {
    Healthy,
    Degraded,
    Offline,
}

impl NodeHealth {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for NodeHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A simulated compute node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub node_id: String,
    pub gpu_count: u32,
    pub gpu_type: String,
    pub status: NodeHealth,
    pub gpu_utilization: f64,
    pub memory_utilization: f64,
    pub last_heartbeat: DateTime<Utc>,
    /// Run currently holding the node.
    pub assigned_run_id: Option<String>,
    /// Consecutive failed probes.
    pub failure_count: u32,
}

impl Node {
    /// Healthy and not held by any run.
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.status == NodeHealth::Healthy && self.assigned_run_id.is_none()
    }
}

/// Point-in-time view of the whole cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub total_nodes: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub offline: usize,
    pub total_gpus: u32,
    /// Units on healthy, unassigned nodes.
    pub available_gpus: u32,
    pub avg_gpu_utilization: f64,
    pub cost_per_gpu_hour: f64,
    pub nodes: Vec<Node>,
}

/// Nodes handed to one run. `units` may fall short of the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub node_ids: Vec<String>,
    pub units: u32,
}

impl Allocation {
    #[must_use]
    pub fn covers(&self, requested: u32) -> bool {
        self.units >= requested
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub node_id: String,
    pub status: NodeHealth,
    pub failure_count: u32,
    pub healthy: bool,
}

/// Cost breakdown; money values are rounded to cents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub gpu_cost: f64,
    pub platform_overhead: f64,
    pub total_estimated: f64,
    pub units: u32,
    pub hours: f64,
    pub rate_per_unit_hour: f64,
}
