//! Regression comparison between two evals.

use crate::models::BenchmarkResult;
use forge_training::ScoreDirection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Largest tolerated drop for a higher-is-better benchmark.
pub const MAX_SCORE_DROP: f64 = 0.05;
/// Largest tolerated rise for a lower-is-better benchmark.
pub const MAX_PERPLEXITY_RISE: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkDelta {
    pub benchmark: String,
    pub current: f64,
    pub baseline: f64,
    /// `current - baseline`, rounded to 4 places.
    pub delta: f64,
    pub regressed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalComparison {
    pub eval_id: String,
    pub baseline_id: String,
    pub regressions: Vec<BenchmarkDelta>,
}

impl EvalComparison {
    #[must_use]
    pub fn has_regressions(&self) -> bool {
        self.regressions.iter().any(|d| d.regressed)
    }
}

/// Pairs results by benchmark name in `current` order. Benchmarks missing
/// from either side are skipped.
#[must_use]
pub fn compare_results(
    current: &[BenchmarkResult],
    baseline: &[BenchmarkResult],
) -> Vec<BenchmarkDelta> {
    let baseline_scores: HashMap<&str, f64> =
        baseline.iter().map(|r| (r.benchmark.as_str(), r.score)).collect();

    current
        .iter()
        .filter_map(|result| {
            let baseline = *baseline_scores.get(result.benchmark.as_str())?;
            let delta = result.score - baseline;
            let regressed = match ScoreDirection::for_benchmark(&result.benchmark) {
                ScoreDirection::HigherIsBetter => delta < -MAX_SCORE_DROP,
                ScoreDirection::LowerIsBetter => delta > MAX_PERPLEXITY_RISE,
            };
            Some(BenchmarkDelta {
                benchmark: result.benchmark.clone(),
                current: result.score,
                baseline,
                delta: (delta * 10_000.0).round() / 10_000.0,
                regressed,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn result(benchmark: &str, score: f64) -> BenchmarkResult {
        BenchmarkResult {
            benchmark: benchmark.to_string(),
            score,
            passed: true,
            threshold: 0.5,
            details: Map::new(),
        }
    }

    #[test]
    fn test_large_drop_regresses() {
        let deltas = compare_results(&[result("accuracy", 0.70)], &[result("accuracy", 0.80)]);
        assert_eq!(deltas.len(), 1);
        assert!(deltas[0].regressed);
        assert!((deltas[0].delta + 0.10).abs() < 1e-9);
    }

    #[test]
    fn test_small_drop_is_tolerated() {
        let deltas = compare_results(&[result("accuracy", 0.76)], &[result("accuracy", 0.80)]);
        assert!(!deltas[0].regressed);
        assert!((deltas[0].delta + 0.04).abs() < 1e-9);
    }

    #[test]
    fn test_perplexity_regresses_when_rising() {
        let deltas = compare_results(
            &[result("perplexity", 40.0), result("coherence", 0.5)],
            &[result("perplexity", 30.0), result("coherence", 0.9)],
        );
        assert!(deltas[0].regressed);
        assert!(deltas[1].regressed);

        let improved =
            compare_results(&[result("perplexity", 20.0)], &[result("perplexity", 30.0)]);
        assert!(!improved[0].regressed);
    }

    #[test]
    fn test_unmatched_benchmarks_are_skipped() {
        let deltas = compare_results(
            &[result("accuracy", 0.8), result("fluency", 0.9)],
            &[result("accuracy", 0.8), result("bias", 0.1)],
        );
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].benchmark, "accuracy");
    }
}
