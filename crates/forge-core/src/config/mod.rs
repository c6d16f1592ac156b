//! Configuration for the forge platform.
//!
//! Loaded from TOML with every field defaulted, then overlaid with `FORGE_*`
//! environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    /// Failed to parse configuration file.
    #[error("Failed to parse configuration file: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file path, or `:memory:`.
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { db_path: "forge.db".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_concurrent_runs: usize,
    pub max_concurrent_evals: usize,
    /// Recorded with each launch; runs are not stopped when it elapses.
    pub run_timeout_seconds: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self { max_concurrent_runs: 4, max_concurrent_evals: 4, run_timeout_seconds: 86_400 }
    }
}

/// One simulated compute node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    pub gpu_count: u32,
    pub gpu_type: String,
}

impl NodeSpec {
    #[must_use]
    pub fn new(id: impl Into<String>, gpu_count: u32, gpu_type: impl Into<String>) -> Self {
        Self { id: id.into(), gpu_count, gpu_type: gpu_type.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub cost_per_gpu_hour: f64,
    /// Platform surcharge as a fraction of the GPU cost.
    pub overhead_rate: f64,
    /// Chance that a single health probe fails.
    pub probe_failure_probability: f64,
    /// Consecutive failed probes before a node goes offline.
    pub offline_after_failures: u32,
    pub heartbeat_interval_secs: u64,
    pub seed: Option<u64>,
    pub nodes: Vec<NodeSpec>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cost_per_gpu_hour: 2.50,
            overhead_rate: 0.15,
            probe_failure_probability: 0.05,
            offline_after_failures: 3,
            heartbeat_interval_secs: 30,
            seed: None,
            nodes: vec![
                NodeSpec::new("node-01", 8, "A100-80GB"),
                NodeSpec::new("node-02", 8, "A100-80GB"),
                NodeSpec::new("node-03", 4, "A100-40GB"),
                NodeSpec::new("node-04", 4, "H100"),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Pause between simulated steps.
    pub step_interval_ms: u64,
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self { step_interval_ms: 20, seed: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub benchmark_delay_ms: u64,
    pub seed: Option<u64>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self { benchmark_delay_ms: 50, seed: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Model artifacts are addressed as `<artifact_root>/<model_id>`.
    pub artifact_root: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { artifact_root: "./model_registry".to_string() }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    pub log_level: Option<String>,
    pub storage: StorageConfig,
    pub limits: LimitsConfig,
    pub cluster: ClusterConfig,
    pub training: TrainingConfig,
    pub eval: EvalConfig,
    pub registry: RegistryConfig,
}

impl ForgeConfig {
    /// Default local configuration file path.
    pub fn default_local_path() -> PathBuf {
        PathBuf::from("forge.toml")
    }

    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    /// Resolve the effective configuration.
    ///
    /// An explicit path must exist. Without one, `./forge.toml` is used when
    /// present and defaults otherwise. Environment overrides apply last.
    pub fn load(explicit: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => {
                let local = Self::default_local_path();
                if local.exists() {
                    Self::load_from_file(&local)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `FORGE_*` variables read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("FORGE_DB_PATH") {
            self.storage.db_path = path;
        }
        if let Some(raw) = lookup("FORGE_MAX_CONCURRENT_RUNS") {
            self.limits.max_concurrent_runs = parse_env("FORGE_MAX_CONCURRENT_RUNS", &raw)?;
        }
        if let Some(raw) = lookup("FORGE_COST_PER_GPU_HOUR") {
            self.cluster.cost_per_gpu_hour = parse_env("FORGE_COST_PER_GPU_HOUR", &raw)?;
        }
        if let Some(level) = lookup("FORGE_LOG_LEVEL") {
            self.log_level = Some(level);
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.limits.max_concurrent_runs == 0 || self.limits.max_concurrent_evals == 0 {
            return Err(ConfigError::InvalidValue("concurrency limits must be >= 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.cluster.probe_failure_probability) {
            return Err(ConfigError::InvalidValue(format!(
                "cluster.probe_failure_probability must be within [0, 1], got {}",
                self.cluster.probe_failure_probability
            )));
        }
        if self.cluster.cost_per_gpu_hour < 0.0 || self.cluster.overhead_rate < 0.0 {
            return Err(ConfigError::InvalidValue("cluster rates must be non-negative".to_string()));
        }
        let mut seen = std::collections::HashSet::new();
        for node in &self.cluster.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(ConfigError::InvalidValue(format!("duplicate node id: {}", node.id)));
            }
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> ConfigResult<T> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue(format!("{key}={raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_match_simulated_cluster() {
        let config = ForgeConfig::default();
        assert_eq!(config.cluster.nodes.len(), 4);
        assert_eq!(config.cluster.nodes.iter().map(|n| n.gpu_count).sum::<u32>(), 24);
        assert!((config.cluster.cost_per_gpu_hour - 2.5).abs() < f64::EPSILON);
        assert_eq!(config.limits.max_concurrent_runs, 4);
        assert_eq!(config.limits.run_timeout_seconds, 86_400);
        assert_eq!(config.registry.artifact_root, "./model_registry");
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[limits]\nmax_concurrent_runs = 2\n\n[training]\nstep_interval_ms = 0\nseed = 7"
        )
        .unwrap();

        let config = ForgeConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.limits.max_concurrent_runs, 2);
        assert_eq!(config.limits.max_concurrent_evals, 4);
        assert_eq!(config.training.seed, Some(7));
        assert_eq!(config.cluster.nodes.len(), 4);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = ForgeConfig::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_malformed_toml_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[limits\nmax_concurrent_runs = ").unwrap();
        assert!(matches!(
            ForgeConfig::load_from_file(file.path()),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("FORGE_DB_PATH", "/tmp/other.db"),
            ("FORGE_MAX_CONCURRENT_RUNS", "8"),
            ("FORGE_COST_PER_GPU_HOUR", "3.25"),
        ]
        .into_iter()
        .collect();

        let mut config = ForgeConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(ToString::to_string)).unwrap();
        assert_eq!(config.storage.db_path, "/tmp/other.db");
        assert_eq!(config.limits.max_concurrent_runs, 8);
        assert!((config.cluster.cost_per_gpu_hour - 3.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_bad_env_value_is_rejected() {
        let mut config = ForgeConfig::default();
        let err = config
            .apply_env_overrides(|key| {
                (key == "FORGE_MAX_CONCURRENT_RUNS").then(|| "many".to_string())
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_validate_rejects_duplicate_nodes() {
        let mut config = ForgeConfig::default();
        config.cluster.nodes.push(NodeSpec::new("node-01", 2, "T4"));
        assert!(config.validate().is_err());
    }
}
