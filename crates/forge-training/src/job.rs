use crate::error::{TrainingError, TrainingResult};
use crate::recipe::RecipeConfig;
use serde::{Deserialize, Serialize};

/// Number of optimizer steps the trainers emit per epoch.
pub const STEPS_PER_EPOCH: u64 = 100;

/// Everything a trainer needs to know about one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingJobSpec {
    pub job_id: String,
    pub base_model: String,
    pub recipe: RecipeConfig,
    pub num_gpus: u32,
}

impl TrainingJobSpec {
    #[must_use]
    pub fn new(
        job_id: impl Into<String>,
        base_model: impl Into<String>,
        recipe: RecipeConfig,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            base_model: base_model.into(),
            recipe,
            num_gpus: 1,
        }
    }

    #[must_use]
    pub fn total_steps(&self) -> u64 {
        u64::from(self.recipe.num_epochs()) * STEPS_PER_EPOCH
    }

    pub fn validate(&self) -> TrainingResult<()> {
        if self.job_id.trim().is_empty() {
            return Err(TrainingError::InvalidSpec("job_id is required".to_string()));
        }
        if self.base_model.trim().is_empty() {
            return Err(TrainingError::InvalidSpec("base_model is required".to_string()));
        }
        if self.num_gpus == 0 {
            return Err(TrainingError::InvalidSpec("num_gpus must be >= 1".to_string()));
        }
        self.recipe.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::{LoraSftConfig, RecipeKind};

    #[test]
    fn test_job_spec_validate_requires_base_model() {
        let spec = TrainingJobSpec::new("job-1", "  ", RecipeKind::LoraSft.defaults());
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_total_steps_scales_with_epochs() {
        let recipe = RecipeConfig::LoraSft(LoraSftConfig {
            num_epochs: 3,
            ..LoraSftConfig::default()
        });
        let spec = TrainingJobSpec::new("job-1", "gpt2", recipe);
        assert_eq!(spec.total_steps(), 300);
    }
}
