use crate::error::TrainingResult;
use crate::recipe::RecipeKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which way a benchmark score improves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreDirection {
    HigherIsBetter,
    /// Perplexity-style benchmarks.
    LowerIsBetter,
}

impl ScoreDirection {
    /// Direction for a benchmark name. Only the perplexity family is lower-is-better.
    #[must_use]
    pub fn for_benchmark(benchmark: &str) -> Self {
        if benchmark == "perplexity" {
            Self::LowerIsBetter
        } else {
            Self::HigherIsBetter
        }
    }

    #[must_use]
    pub fn passes(self, score: f64, threshold: f64) -> bool {
        match self {
            Self::HigherIsBetter => score >= threshold,
            Self::LowerIsBetter => score <= threshold,
        }
    }
}

/// The model under evaluation, as far as a backend needs to know.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalTarget {
    pub model_id: String,
    pub base_model: String,
    pub recipe: RecipeKind,
    pub artifact_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkScore {
    pub score: f64,
    #[serde(default)]
    pub details: Map<String, Value>,
}

/// An evaluation backend that scores one benchmark at a time.
#[async_trait]
pub trait Evaluator: Send + Sync {
    fn id(&self) -> &'static str;

    async fn score_benchmark(
        &self,
        target: &EvalTarget,
        benchmark: &str,
    ) -> TrainingResult<BenchmarkScore>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perplexity_is_lower_is_better() {
        assert_eq!(ScoreDirection::for_benchmark("perplexity"), ScoreDirection::LowerIsBetter);
        assert_eq!(ScoreDirection::for_benchmark("accuracy"), ScoreDirection::HigherIsBetter);
    }

    #[test]
    fn test_threshold_is_inclusive_both_ways() {
        assert!(ScoreDirection::HigherIsBetter.passes(0.7, 0.7));
        assert!(!ScoreDirection::HigherIsBetter.passes(0.69, 0.7));
        assert!(ScoreDirection::LowerIsBetter.passes(50.0, 50.0));
        assert!(!ScoreDirection::LowerIsBetter.passes(50.1, 50.0));
    }
}
