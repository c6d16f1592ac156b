//! Randomized stand-ins for a real trainer and evaluator.
//!
//! The trainer follows an exponential-decay loss curve with small Gaussian
//! jitter; the evaluator draws benchmark scores uniformly from fixed bands.
//! Both accept a seed so tests can pin their output.

use crate::error::TrainingResult;
use crate::evaluator::{BenchmarkScore, EvalTarget, Evaluator, ScoreDirection};
use crate::job::TrainingJobSpec;
use crate::metrics::StepMetrics;
use crate::trainer::{MetricStream, Trainer};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value};
use std::f64::consts::TAU;
use std::sync::Mutex;
use std::time::Duration;

const INITIAL_LOSS_CENTER: f64 = 3.5;
const INITIAL_LOSS_SPREAD: f64 = 0.5;
const LOSS_DECAY_RATE: f64 = 3.0;
const LOSS_ASYMPTOTE: f64 = 0.3;
const LOSS_FLOOR: f64 = 0.1;
const LOSS_NOISE_STD: f64 = 0.02;
/// Fraction of the initial learning rate removed by the final step.
const LR_DECAY_FRACTION: f64 = 0.9;

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Zero-mean Gaussian sample (Box-Muller).
fn gaussian(rng: &mut StdRng, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos() * std_dev
}

/// Curve parameters fixed for the lifetime of one run.
#[derive(Debug, Clone, Copy)]
struct LossCurve {
    initial_loss: f64,
    base_lr: f64,
    num_epochs: f64,
    total_steps: u64,
}

impl LossCurve {
    fn sample(&self, step: u64, rng: &mut StdRng) -> StepMetrics {
        let progress = step as f64 / self.total_steps as f64;
        let decay = (-LOSS_DECAY_RATE * progress).exp();
        let noise = gaussian(rng, LOSS_NOISE_STD);
        let loss = (self.initial_loss * decay + LOSS_ASYMPTOTE + noise).max(LOSS_FLOOR);
        let learning_rate = self.base_lr * (1.0 - progress * LR_DECAY_FRACTION);
        let gpu_memory_mb = 4000.0 + rng.gen_range(-200.0..=200.0);
        let throughput = 12.0 + rng.gen_range(-2.0..=2.0);

        StepMetrics {
            step,
            loss: round_to(loss, 4),
            learning_rate,
            epoch: round_to(progress * self.num_epochs, 2),
            gpu_memory_mb: Some(round_to(gpu_memory_mb, 1)),
            throughput_samples_sec: Some(round_to(throughput, 1)),
        }
    }
}

/// Simulated trainer emitting `num_epochs * 100` steps at a steady cadence.
#[derive(Debug, Clone)]
pub struct SimulatedTrainer {
    step_interval: Duration,
    seed: Option<u64>,
}

impl Default for SimulatedTrainer {
    fn default() -> Self {
        Self { step_interval: Duration::from_millis(20), seed: None }
    }
}

impl SimulatedTrainer {
    #[must_use]
    pub fn new(step_interval: Duration, seed: Option<u64>) -> Self {
        Self { step_interval, seed }
    }
}

#[async_trait]
impl Trainer for SimulatedTrainer {
    fn id(&self) -> &'static str {
        "simulated"
    }

    fn produce_metric_stream(&self, job: &TrainingJobSpec) -> TrainingResult<MetricStream> {
        job.validate()?;

        let mut rng = make_rng(self.seed);
        let spread = rng.gen_range(-INITIAL_LOSS_SPREAD..=INITIAL_LOSS_SPREAD);
        let curve = LossCurve {
            initial_loss: INITIAL_LOSS_CENTER + spread,
            base_lr: job.recipe.learning_rate(),
            num_epochs: f64::from(job.recipe.num_epochs()),
            total_steps: job.total_steps(),
        };
        let interval = self.step_interval;

        let stream = futures::stream::unfold((1u64, rng), move |(step, mut rng)| async move {
            if step > curve.total_steps {
                return None;
            }
            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
            let metrics = curve.sample(step, &mut rng);
            Some((Ok(metrics), (step + 1, rng)))
        });
        Ok(Box::pin(stream))
    }
}

/// Simulated evaluator: perplexity in `[15, 80]`, everything else in `[0.4, 0.95]`.
#[derive(Debug)]
pub struct SimulatedEvaluator {
    benchmark_delay: Duration,
    rng: Mutex<StdRng>,
}

impl Default for SimulatedEvaluator {
    fn default() -> Self {
        Self::new(Duration::from_millis(50), None)
    }
}

impl SimulatedEvaluator {
    #[must_use]
    pub fn new(benchmark_delay: Duration, seed: Option<u64>) -> Self {
        Self { benchmark_delay, rng: Mutex::new(make_rng(seed)) }
    }
}

#[async_trait]
impl Evaluator for SimulatedEvaluator {
    fn id(&self) -> &'static str {
        "simulated"
    }

    async fn score_benchmark(
        &self,
        _target: &EvalTarget,
        benchmark: &str,
    ) -> TrainingResult<BenchmarkScore> {
        if !self.benchmark_delay.is_zero() {
            tokio::time::sleep(self.benchmark_delay).await;
        }

        let (score, samples) = {
            let mut rng = self.rng.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let score = match ScoreDirection::for_benchmark(benchmark) {
                ScoreDirection::LowerIsBetter => rng.gen_range(15.0..=80.0),
                ScoreDirection::HigherIsBetter => rng.gen_range(0.4..=0.95),
            };
            (score, rng.gen_range(100..=1000u32))
        };

        let mut details = Map::new();
        details.insert("samples_evaluated".to_string(), Value::from(samples));
        Ok(BenchmarkScore { score: round_to(score, 4), details })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::{LoraSftConfig, RecipeConfig, RecipeKind};
    use futures::StreamExt;

    fn job(epochs: u32) -> TrainingJobSpec {
        let recipe = RecipeConfig::LoraSft(LoraSftConfig {
            num_epochs: epochs,
            ..LoraSftConfig::default()
        });
        TrainingJobSpec::new("job-sim", "gpt2", recipe)
    }

    async fn collect(trainer: &SimulatedTrainer, job: &TrainingJobSpec) -> Vec<StepMetrics> {
        trainer
            .produce_metric_stream(job)
            .unwrap()
            .map(|item| item.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_stream_emits_one_hundred_steps_per_epoch() {
        let trainer = SimulatedTrainer::new(Duration::ZERO, Some(7));
        let metrics = collect(&trainer, &job(2)).await;
        assert_eq!(metrics.len(), 200);
        assert_eq!(metrics.first().unwrap().step, 1);
        assert_eq!(metrics.last().unwrap().step, 200);
        assert!(metrics.windows(2).all(|w| w[1].step == w[0].step + 1));
        assert!((metrics.last().unwrap().epoch - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_learning_rate_decays_to_ten_percent() {
        let trainer = SimulatedTrainer::new(Duration::ZERO, Some(7));
        let metrics = collect(&trainer, &job(1)).await;
        let last = metrics.last().unwrap();
        assert!((last.learning_rate - 2e-5).abs() < 1e-12);
        assert!(metrics.windows(2).all(|w| w[1].learning_rate < w[0].learning_rate));
    }

    #[tokio::test]
    async fn test_loss_trends_down_and_respects_floor() {
        let mut early = 0.0;
        let mut late = 0.0;
        for seed in 0..10 {
            let trainer = SimulatedTrainer::new(Duration::ZERO, Some(seed));
            let metrics = collect(&trainer, &job(1)).await;
            assert!(metrics.iter().all(|m| m.loss >= LOSS_FLOOR));
            early += metrics[..10].iter().map(|m| m.loss).sum::<f64>();
            late += metrics[90..].iter().map(|m| m.loss).sum::<f64>();
        }
        assert!(late < early);
    }

    #[tokio::test]
    async fn test_same_seed_same_series() {
        let a = collect(&SimulatedTrainer::new(Duration::ZERO, Some(42)), &job(1)).await;
        let b = collect(&SimulatedTrainer::new(Duration::ZERO, Some(42)), &job(1)).await;
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_evaluator_score_bands() {
        let evaluator = SimulatedEvaluator::new(Duration::ZERO, Some(3));
        let target = EvalTarget {
            model_id: "m-1".to_string(),
            base_model: "gpt2".to_string(),
            recipe: RecipeKind::LoraSft,
            artifact_path: None,
        };
        for _ in 0..20 {
            let ppl = evaluator.score_benchmark(&target, "perplexity").await.unwrap();
            assert!((15.0..=80.0).contains(&ppl.score));
            let acc = evaluator.score_benchmark(&target, "accuracy").await.unwrap();
            assert!((0.4..=0.95).contains(&acc.score));
            assert!(acc.details.contains_key("samples_evaluated"));
        }
    }
}
