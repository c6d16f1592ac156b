//! Training recipes and their strongly typed configurations.
//!
//! A run is launched with a [`RecipeKind`] plus a bag of caller overrides. The
//! overrides are merged over the kind's defaults by [`resolve_recipe`], which
//! rejects unknown keys and wrongly typed values.

use crate::error::{TrainingError, TrainingResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// A named training strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeKind {
    /// Supervised fine-tuning through a low-rank adapter.
    LoraSft,
    /// Direct preference optimization.
    Dpo,
    /// Reinforcement learning from human feedback (PPO).
    Rlhf,
}

impl RecipeKind {
    pub const ALL: [Self; 3] = [Self::LoraSft, Self::Dpo, Self::Rlhf];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoraSft => "lora_sft",
            Self::Dpo => "dpo",
            Self::Rlhf => "rlhf",
        }
    }

    /// Default configuration for this recipe.
    #[must_use]
    pub fn defaults(self) -> RecipeConfig {
        match self {
            Self::LoraSft => RecipeConfig::LoraSft(LoraSftConfig::default()),
            Self::Dpo => RecipeConfig::Dpo(DpoConfig::default()),
            Self::Rlhf => RecipeConfig::Rlhf(RlhfConfig::default()),
        }
    }
}

impl fmt::Display for RecipeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecipeKind {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| TrainingError::InvalidRecipe(format!("unknown recipe: {s}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoraSftConfig {
    pub r: u32,
    pub lora_alpha: u32,
    pub lora_dropout: f64,
    pub target_modules: Vec<String>,
    pub learning_rate: f64,
    pub batch_size: u32,
    pub gradient_accumulation_steps: u32,
    pub num_epochs: u32,
    pub warmup_ratio: f64,
    pub max_seq_length: u32,
}

impl Default for LoraSftConfig {
    fn default() -> Self {
        Self {
            r: 16,
            lora_alpha: 32,
            lora_dropout: 0.05,
            target_modules: vec!["c_attn".to_string(), "c_proj".to_string()],
            learning_rate: 2e-4,
            batch_size: 4,
            gradient_accumulation_steps: 8,
            num_epochs: 1,
            warmup_ratio: 0.03,
            max_seq_length: 2048,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DpoConfig {
    pub beta: f64,
    pub learning_rate: f64,
    pub batch_size: u32,
    pub gradient_accumulation_steps: u32,
    pub num_epochs: u32,
    pub max_prompt_length: u32,
    pub max_length: u32,
}

impl Default for DpoConfig {
    fn default() -> Self {
        Self {
            beta: 0.1,
            learning_rate: 5e-5,
            batch_size: 2,
            gradient_accumulation_steps: 4,
            num_epochs: 1,
            max_prompt_length: 512,
            max_length: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RlhfConfig {
    pub reward_model: Option<String>,
    pub ppo_epochs: u32,
    pub num_epochs: u32,
    pub learning_rate: f64,
    pub batch_size: u32,
    pub kl_penalty: f64,
    pub clip_range: f64,
}

impl Default for RlhfConfig {
    fn default() -> Self {
        Self {
            reward_model: None,
            ppo_epochs: 4,
            num_epochs: 1,
            learning_rate: 1.5e-5,
            batch_size: 4,
            kl_penalty: 0.2,
            clip_range: 0.2,
        }
    }
}

/// Resolved configuration, one variant per recipe kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "recipe", content = "config", rename_all = "snake_case")]
pub enum RecipeConfig {
    LoraSft(LoraSftConfig),
    Dpo(DpoConfig),
    Rlhf(RlhfConfig),
}

impl RecipeConfig {
    #[must_use]
    pub fn kind(&self) -> RecipeKind {
        match self {
            Self::LoraSft(_) => RecipeKind::LoraSft,
            Self::Dpo(_) => RecipeKind::Dpo,
            Self::Rlhf(_) => RecipeKind::Rlhf,
        }
    }

    #[must_use]
    pub fn num_epochs(&self) -> u32 {
        match self {
            Self::LoraSft(c) => c.num_epochs,
            Self::Dpo(c) => c.num_epochs,
            Self::Rlhf(c) => c.num_epochs,
        }
    }

    #[must_use]
    pub fn learning_rate(&self) -> f64 {
        match self {
            Self::LoraSft(c) => c.learning_rate,
            Self::Dpo(c) => c.learning_rate,
            Self::Rlhf(c) => c.learning_rate,
        }
    }

    pub fn validate(&self) -> TrainingResult<()> {
        if self.num_epochs() == 0 {
            return Err(TrainingError::InvalidRecipe("num_epochs must be >= 1".to_string()));
        }
        let lr = self.learning_rate();
        if !lr.is_finite() || lr <= 0.0 {
            return Err(TrainingError::InvalidRecipe("learning_rate must be > 0".to_string()));
        }
        Ok(())
    }

    /// The variant's settings as a flat JSON object (no recipe tag).
    pub fn settings(&self) -> TrainingResult<Value> {
        let value = match self {
            Self::LoraSft(c) => serde_json::to_value(c)?,
            Self::Dpo(c) => serde_json::to_value(c)?,
            Self::Rlhf(c) => serde_json::to_value(c)?,
        };
        Ok(value)
    }

    /// Rebuild a configuration from a kind and flat settings previously
    /// produced by [`RecipeConfig::settings`].
    pub fn from_settings(kind: RecipeKind, settings: &Value) -> TrainingResult<Self> {
        let overrides = match settings {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                return Err(TrainingError::InvalidRecipe(format!(
                    "recipe settings must be an object, got {other}"
                )));
            }
        };
        resolve_recipe(kind, &overrides)
    }
}

/// Merge caller overrides over the recipe defaults.
///
/// Pure: the same kind and overrides always produce the same configuration.
pub fn resolve_recipe(
    kind: RecipeKind,
    overrides: &Map<String, Value>,
) -> TrainingResult<RecipeConfig> {
    let config = match kind {
        RecipeKind::LoraSft => {
            RecipeConfig::LoraSft(merge_over(LoraSftConfig::default(), overrides, kind)?)
        }
        RecipeKind::Dpo => RecipeConfig::Dpo(merge_over(DpoConfig::default(), overrides, kind)?),
        RecipeKind::Rlhf => RecipeConfig::Rlhf(merge_over(RlhfConfig::default(), overrides, kind)?),
    };
    config.validate()?;
    Ok(config)
}

fn merge_over<T>(defaults: T, overrides: &Map<String, Value>, kind: RecipeKind) -> TrainingResult<T>
where
    T: Serialize + DeserializeOwned,
{
    let mut merged = serde_json::to_value(defaults)?;
    if let Value::Object(map) = &mut merged {
        for (key, value) in overrides {
            map.insert(key.clone(), value.clone());
        }
    }
    serde_json::from_value(merged)
        .map_err(|e| TrainingError::InvalidRecipe(format!("{kind} overrides rejected: {e}")))
}
