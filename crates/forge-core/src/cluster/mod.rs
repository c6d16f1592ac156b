//! Cluster resource manager.
//!
//! Owns a fixed table of simulated nodes and arbitrates accelerator
//! allocation between runs. The whole table sits behind one async mutex, so
//! a node can never be handed to two runs at once.

mod node;

pub use node::{Allocation, ClusterStatus, CostEstimate, HealthReport, Node, NodeHealth};

use crate::config::ClusterConfig;
use crate::error::{ForgeError, Result};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

struct ClusterState {
    /// Keyed by node id; iteration order is the allocation order.
    nodes: BTreeMap<String, Node>,
    rng: StdRng,
}

pub struct ClusterManager {
    state: Mutex<ClusterState>,
    cost_per_gpu_hour: f64,
    overhead_rate: f64,
    failure_probability: f64,
    offline_after_failures: u32,
}

impl ClusterManager {
    /// Builds the node table from configuration with idle utilization readings.
    #[must_use]
    pub fn new(config: &ClusterConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let now = Utc::now();
        let nodes = config
            .nodes
            .iter()
            .map(|spec| {
                let node = Node {
                    node_id: spec.id.clone(),
                    gpu_count: spec.gpu_count,
                    gpu_type: spec.gpu_type.clone(),
                    status: NodeHealth::Healthy,
                    gpu_utilization: rng.gen_range(0.0..0.3),
                    memory_utilization: rng.gen_range(0.1..0.4),
                    last_heartbeat: now,
                    assigned_run_id: None,
                    failure_count: 0,
                };
                (spec.id.clone(), node)
            })
            .collect::<BTreeMap<_, _>>();

        let total_gpus = nodes.values().map(|n| n.gpu_count).sum::<u32>();
        info!(nodes = nodes.len(), total_gpus, "Cluster initialized");

        Self {
            state: Mutex::new(ClusterState { nodes, rng }),
            cost_per_gpu_hour: config.cost_per_gpu_hour,
            overhead_rate: config.overhead_rate,
            failure_probability: config.probe_failure_probability.clamp(0.0, 1.0),
            offline_after_failures: config.offline_after_failures.max(1),
        }
    }

    pub async fn status(&self) -> ClusterStatus {
        let state = self.state.lock().await;
        let nodes: Vec<Node> = state.nodes.values().cloned().collect();
        let count = |health: NodeHealth| nodes.iter().filter(|n| n.status == health).count();
        let avg_gpu_utilization = if nodes.is_empty() {
            0.0
        } else {
            nodes.iter().map(|n| n.gpu_utilization).sum::<f64>() / nodes.len() as f64
        };

        ClusterStatus {
            total_nodes: nodes.len(),
            healthy: count(NodeHealth::Healthy),
            degraded: count(NodeHealth::Degraded),
            offline: count(NodeHealth::Offline),
            total_gpus: nodes.iter().map(|n| n.gpu_count).sum(),
            available_gpus: nodes.iter().filter(|n| n.is_free()).map(|n| n.gpu_count).sum(),
            avg_gpu_utilization: round_to(avg_gpu_utilization, 2),
            cost_per_gpu_hour: self.cost_per_gpu_hour,
            nodes,
        }
    }

    /// Assigns free nodes to `run_id` in node-id order until their combined
    /// capacity reaches `units_requested`.
    ///
    /// Best effort: the returned allocation may be short (or empty). Callers
    /// that need the full amount must check [`Allocation::covers`].
    pub async fn allocate(&self, run_id: &str, units_requested: u32) -> Allocation {
        let mut state = self.state.lock().await;
        let ClusterState { nodes, rng } = &mut *state;

        let mut allocation = Allocation::default();
        for node in nodes.values_mut() {
            if allocation.units >= units_requested {
                break;
            }
            if !node.is_free() {
                continue;
            }
            node.assigned_run_id = Some(run_id.to_string());
            node.gpu_utilization = rng.gen_range(0.7..0.95);
            node.memory_utilization = rng.gen_range(0.6..0.9);
            allocation.units += node.gpu_count;
            allocation.node_ids.push(node.node_id.clone());
        }

        if allocation.covers(units_requested) {
            debug!(
                run_id = %run_id,
                nodes = ?allocation.node_ids,
                units = allocation.units,
                "Allocated nodes"
            );
        } else {
            warn!(
                run_id = %run_id,
                requested = units_requested,
                granted = allocation.units,
                "Partial allocation"
            );
        }
        allocation
    }

    /// Frees every node held by `run_id`. Returns the freed node ids.
    pub async fn release(&self, run_id: &str) -> Vec<String> {
        let mut state = self.state.lock().await;
        let ClusterState { nodes, rng } = &mut *state;

        let mut freed = Vec::new();
        for node in nodes.values_mut().filter(|n| n.assigned_run_id.as_deref() == Some(run_id)) {
            node.assigned_run_id = None;
            node.gpu_utilization = rng.gen_range(0.0..0.1);
            node.memory_utilization = rng.gen_range(0.1..0.2);
            freed.push(node.node_id.clone());
        }
        if !freed.is_empty() {
            debug!(run_id = %run_id, nodes = ?freed, "Released nodes");
        }
        freed
    }

    /// One probabilistic health probe.
    ///
    /// A failed probe bumps the failure counter and marks the node degraded,
    /// or offline once the counter reaches the configured limit. A passing
    /// probe refreshes the heartbeat and, for a degraded node, walks the
    /// counter back down until the node is healthy again. Offline nodes stay
    /// offline.
    pub async fn check_health(&self, node_id: &str) -> Result<HealthReport> {
        let mut state = self.state.lock().await;
        let ClusterState { nodes, rng } = &mut *state;
        let node = nodes.get_mut(node_id).ok_or_else(|| ForgeError::not_found("Node", node_id))?;

        let probe_failed = rng.gen_bool(self.failure_probability);
        if probe_failed {
            node.failure_count += 1;
            if node.failure_count >= self.offline_after_failures {
                if node.status != NodeHealth::Offline {
                    warn!(node_id = %node_id, failures = node.failure_count, "Node marked offline");
                }
                node.status = NodeHealth::Offline;
            } else {
                node.status = NodeHealth::Degraded;
                debug!(node_id = %node_id, failures = node.failure_count, "Node degraded");
            }
        } else {
            if node.status == NodeHealth::Degraded && node.failure_count > 0 {
                node.failure_count -= 1;
                if node.failure_count == 0 {
                    node.status = NodeHealth::Healthy;
                    info!(node_id = %node_id, "Node recovered");
                }
            }
            node.last_heartbeat = Utc::now();
        }

        Ok(HealthReport {
            node_id: node.node_id.clone(),
            status: node.status,
            failure_count: node.failure_count,
            healthy: node.status == NodeHealth::Healthy,
        })
    }

    /// Probes every node once, in node-id order.
    pub async fn probe_all(&self) -> Vec<HealthReport> {
        let ids: Vec<String> = self.state.lock().await.nodes.keys().cloned().collect();
        let mut reports = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok(report) = self.check_health(&id).await {
                reports.push(report);
            }
        }
        reports
    }

    /// Runs [`ClusterManager::probe_all`] every `interval` until `token` is cancelled.
    pub fn spawn_health_monitor(
        self: &Arc<Self>,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let cluster = Arc::clone(self);
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Cluster health monitor started");
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = token.cancelled() => {
                        info!("Cluster health monitor stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let reports = cluster.probe_all().await;
                        let unhealthy = reports.iter().filter(|r| !r.healthy).count();
                        debug!(probed = reports.len(), unhealthy, "Health sweep complete");
                    }
                }
            }
        })
    }

    /// `units × hours × rate` plus the platform overhead. No side effects.
    #[must_use]
    pub fn estimate_cost(&self, units: u32, hours: f64) -> CostEstimate {
        let gpu_cost = f64::from(units) * hours * self.cost_per_gpu_hour;
        let overhead = gpu_cost * self.overhead_rate;
        CostEstimate {
            gpu_cost: round_to(gpu_cost, 2),
            platform_overhead: round_to(overhead, 2),
            total_estimated: round_to(gpu_cost + overhead, 2),
            units,
            hours,
            rate_per_unit_hour: self.cost_per_gpu_hour,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeSpec;

    fn config() -> ClusterConfig {
        ClusterConfig { seed: Some(11), ..ClusterConfig::default() }
    }

    fn manager_with_failure_rate(p: f64) -> ClusterManager {
        ClusterManager::new(&ClusterConfig { probe_failure_probability: p, ..config() })
    }

    #[tokio::test]
    async fn test_initial_status() {
        let cluster = ClusterManager::new(&config());
        let status = cluster.status().await;
        assert_eq!(status.total_nodes, 4);
        assert_eq!(status.healthy, 4);
        assert_eq!(status.total_gpus, 24);
        assert_eq!(status.available_gpus, 24);
        assert!(status.nodes.iter().all(|n| n.gpu_utilization < 0.3));
    }

    #[tokio::test]
    async fn test_allocate_accumulates_until_covered() {
        let cluster = ClusterManager::new(&config());
        let allocation = cluster.allocate("run-a", 12).await;
        assert_eq!(allocation.node_ids, vec!["node-01", "node-02"]);
        assert_eq!(allocation.units, 16);
        assert!(allocation.covers(12));

        let status = cluster.status().await;
        assert_eq!(status.available_gpus, 8);
        let busy = status.nodes.iter().find(|n| n.node_id == "node-01").unwrap();
        assert!(busy.gpu_utilization >= 0.7);
    }

    #[tokio::test]
    async fn test_allocations_never_share_nodes() {
        let cluster = ClusterManager::new(&config());
        let a = cluster.allocate("run-a", 8).await;
        let b = cluster.allocate("run-b", 8).await;
        assert!(a.node_ids.iter().all(|id| !b.node_ids.contains(id)));

        let status = cluster.status().await;
        for node in &status.nodes {
            if a.node_ids.contains(&node.node_id) {
                assert_eq!(node.assigned_run_id.as_deref(), Some("run-a"));
            }
            if b.node_ids.contains(&node.node_id) {
                assert_eq!(node.assigned_run_id.as_deref(), Some("run-b"));
            }
        }
    }

    #[tokio::test]
    async fn test_short_allocation_is_returned_not_raised() {
        let cluster = ClusterManager::new(&config());
        let allocation = cluster.allocate("run-big", 64).await;
        assert_eq!(allocation.units, 24);
        assert!(!allocation.covers(64));
        assert_eq!(cluster.allocate("run-next", 1).await, Allocation::default());
    }

    #[tokio::test]
    async fn test_release_frees_only_own_nodes() {
        let cluster = ClusterManager::new(&config());
        cluster.allocate("run-a", 8).await;
        cluster.allocate("run-b", 8).await;

        let freed = cluster.release("run-a").await;
        assert_eq!(freed, vec!["node-01"]);

        let status = cluster.status().await;
        assert_eq!(status.available_gpus, 16);
        let node_02 = status.nodes.iter().find(|n| n.node_id == "node-02").unwrap();
        assert_eq!(node_02.assigned_run_id.as_deref(), Some("run-b"));
        assert!(cluster.release("run-unknown").await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_allocations_are_exclusive() {
        let cluster = Arc::new(ClusterManager::new(&config()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cluster = Arc::clone(&cluster);
                tokio::spawn(async move { cluster.allocate(&format!("run-{i}"), 4).await })
            })
            .collect();

        let mut seen = std::collections::HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap().node_ids {
                assert!(seen.insert(id), "node allocated twice");
            }
        }
        assert_eq!(seen.len(), 4);
    }

    #[tokio::test]
    async fn test_three_failures_take_node_offline() {
        let cluster = manager_with_failure_rate(1.0);
        let first = cluster.check_health("node-03").await.unwrap();
        assert_eq!(first.status, NodeHealth::Degraded);
        cluster.check_health("node-03").await.unwrap();
        let third = cluster.check_health("node-03").await.unwrap();
        assert_eq!(third.status, NodeHealth::Offline);
        assert_eq!(third.failure_count, 3);

        assert_eq!(cluster.allocate("run-a", 24).await.units, 20);
    }

    #[tokio::test]
    async fn test_degraded_node_recovers_after_passing_probes() {
        let config = ClusterConfig { probe_failure_probability: 1.0, ..config() };
        let failing = ClusterManager::new(&config);
        failing.check_health("node-01").await.unwrap();
        failing.check_health("node-01").await.unwrap();

        // Same table, now with probes that always pass
        let recovering = ClusterManager {
            state: Mutex::new(failing.state.into_inner()),
            failure_probability: 0.0,
            ..ClusterManager::new(&ClusterConfig { nodes: vec![], ..config })
        };
        let report = recovering.check_health("node-01").await.unwrap();
        assert_eq!((report.status, report.failure_count), (NodeHealth::Degraded, 1));
        let report = recovering.check_health("node-01").await.unwrap();
        assert_eq!((report.status, report.failure_count), (NodeHealth::Healthy, 0));
    }

    #[tokio::test]
    async fn test_offline_node_stays_offline() {
        let failing = manager_with_failure_rate(1.0);
        for _ in 0..3 {
            failing.check_health("node-04").await.unwrap();
        }
        let passing = ClusterManager {
            state: Mutex::new(failing.state.into_inner()),
            failure_probability: 0.0,
            ..manager_with_failure_rate(0.0)
        };
        let report = passing.check_health("node-04").await.unwrap();
        assert_eq!(report.status, NodeHealth::Offline);
    }

    #[tokio::test]
    async fn test_unknown_node_probe_is_not_found() {
        let cluster = ClusterManager::new(&config());
        let err = cluster.check_health("node-99").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_probe_all_covers_every_node() {
        let cluster = manager_with_failure_rate(0.0);
        let reports = cluster.probe_all().await;
        assert_eq!(reports.len(), 4);
        assert!(reports.iter().all(|r| r.healthy));
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_monitor_stops_on_cancel() {
        let cluster = Arc::new(manager_with_failure_rate(1.0));
        let token = CancellationToken::new();
        let handle = cluster.spawn_health_monitor(Duration::from_secs(30), token.clone());

        tokio::time::sleep(Duration::from_secs(95)).await;
        token.cancel();
        handle.await.unwrap();

        let status = cluster.status().await;
        assert_eq!(status.offline, 4);
    }

    #[test]
    fn test_cost_estimate_rounds_to_cents() {
        let cluster = ClusterManager::new(&config());
        let estimate = cluster.estimate_cost(4, 2.0);
        assert!((estimate.gpu_cost - 20.00).abs() < 1e-9);
        assert!((estimate.platform_overhead - 3.00).abs() < 1e-9);
        assert!((estimate.total_estimated - 23.00).abs() < 1e-9);
        assert!((estimate.rate_per_unit_hour - 2.5).abs() < 1e-9);

        let odd = cluster.estimate_cost(3, 1.333);
        assert!((odd.total_estimated - 11.50).abs() < 1e-9);
    }

    #[test]
    fn test_custom_node_table() {
        let cluster = ClusterManager::new(&ClusterConfig {
            nodes: vec![NodeSpec::new("gpu-b", 2, "T4"), NodeSpec::new("gpu-a", 2, "T4")],
            ..config()
        });
        let ids = cluster.state.try_lock().unwrap().nodes.keys().cloned().collect::<Vec<_>>();
        assert_eq!(ids, vec!["gpu-a", "gpu-b"]);
    }
}
