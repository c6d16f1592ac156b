//! Common test utilities for integration tests.

#![allow(dead_code)]

use forge_core::config::NodeSpec;
use forge_core::{ForgeConfig, NewDataset, Platform};
use std::path::Path;

/// Deterministic configuration: no step or benchmark delays, fixed seeds,
/// and health probes that never fail.
pub fn fast_config() -> ForgeConfig {
    let mut config = ForgeConfig::default();
    config.training.step_interval_ms = 0;
    config.training.seed = Some(42);
    config.eval.benchmark_delay_ms = 0;
    config.eval.seed = Some(7);
    config.cluster.seed = Some(1);
    config.cluster.probe_failure_probability = 0.0;
    config.registry.artifact_root = "/srv/forge/models".to_string();
    config
}

pub fn platform() -> Platform {
    Platform::in_memory(fast_config()).expect("in-memory platform")
}

pub fn platform_at(db_path: &Path) -> Platform {
    let mut config = fast_config();
    config.storage.db_path = db_path.display().to_string();
    Platform::open(config).expect("file-backed platform")
}

/// Single node with `gpus` accelerators.
pub fn tiny_cluster(config: &mut ForgeConfig, gpus: u32) {
    config.cluster.nodes = vec![NodeSpec::new("node-solo", gpus, "H100")];
}

/// Registers the three datasets the demo uses; returns their ids in order.
pub fn seed_datasets(platform: &Platform) -> Vec<String> {
    let alpaca = platform
        .register_dataset(
            NewDataset::new(
                "instruct-alpaca-cleaned",
                "2.1.0",
                "s3://forge-datasets/alpaca-cleaned",
            )
            .with_tags(["instruction", "sft"]),
        )
        .expect("register alpaca");
    let orca = platform
        .register_dataset(
            NewDataset::new("orca-dpo-pairs", "1.0.0", "s3://forge-datasets/orca-dpo")
                .with_tags(["preference", "dpo"]),
        )
        .expect("register orca");
    let filtered = platform
        .register_dataset(
            NewDataset::new("alpaca-filtered", "1.0.0", "s3://forge-datasets/alpaca-filtered")
                .with_parent(&alpaca.id)
                .with_tags(["instruction"]),
        )
        .expect("register filtered");
    vec![alpaca.id, orca.id, filtered.id]
}
