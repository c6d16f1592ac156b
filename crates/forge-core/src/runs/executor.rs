//! Background execution of a single run.
//!
//! One task per run owns every status write after `pending` and every metric
//! write for that run. All status writes are guarded, so a cancellation
//! recorded by [`super::RunEngine::cancel`] is never overwritten.

use super::RunContext;
use crate::error::{ForgeError, Result};
use crate::models::{RunMetric, RunRecord, RunStatus};
use crate::storage::{RunRepository, SqliteRunRepository};
use chrono::Utc;
use forge_training::{ProgressEvent, StepMetrics, TrainingJobSpec};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How the task ended.
#[derive(Debug)]
pub(crate) enum Outcome {
    Completed { steps: u64 },
    Failed(String),
    /// Cancelled, or moved to a terminal state by someone else.
    Superseded,
}

pub(crate) async fn execute(ctx: RunContext, run: RunRecord, cancel: CancellationToken) {
    let run_id = run.id.clone();

    let outcome = match drive(&ctx, &run, &cancel).await {
        Ok(outcome) => outcome,
        Err(e) => Outcome::Failed(e.to_string()),
    };

    match &outcome {
        Outcome::Completed { steps } => {
            match ctx.transition(&run_id, RunStatus::Completed, None) {
                Ok(true) => {
                    info!(run_id = %run_id, steps, "Run completed");
                    ctx.progress.on_event(ProgressEvent::Finished { job_id: run_id.clone() });
                }
                Ok(false) => {
                    debug!(run_id = %run_id, "Run left running before completion was recorded");
                }
                Err(e) => error!(run_id = %run_id, error = %e, "Failed to record run completion"),
            }
        }
        Outcome::Failed(reason) => match ctx.transition(&run_id, RunStatus::Failed, Some(reason)) {
            Ok(true) => {
                warn!(run_id = %run_id, reason = %reason, "Run failed");
                ctx.progress.on_event(ProgressEvent::Failed {
                    job_id: run_id.clone(),
                    reason: reason.clone(),
                });
            }
            Ok(false) => {
                debug!(run_id = %run_id, reason = %reason, "Failure after run already terminal");
            }
            Err(e) => error!(run_id = %run_id, error = %e, "Failed to record run failure"),
        },
        Outcome::Superseded => debug!(run_id = %run_id, "Run stopped early"),
    }

    ctx.cluster.release(&run_id).await;
}

async fn drive(ctx: &RunContext, run: &RunRecord, cancel: &CancellationToken) -> Result<Outcome> {
    let run_id = run.id.as_str();

    let _permit = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(Outcome::Superseded),
        permit = ctx.permits.clone().acquire_owned() => {
            permit.map_err(|_| ForgeError::ExecutionFailure("run scheduler shut down".to_string()))?
        }
    };

    if !ctx.transition(run_id, RunStatus::Provisioning, None)? {
        return Ok(Outcome::Superseded);
    }

    let allocation = ctx.cluster.allocate(run_id, run.num_gpus).await;
    if !allocation.covers(run.num_gpus) {
        return Ok(Outcome::Failed(format!(
            "insufficient accelerator capacity: requested {}, allocated {}",
            run.num_gpus, allocation.units
        )));
    }
    ctx.progress.on_event(ProgressEvent::Provisioned {
        job_id: run.id.clone(),
        nodes: allocation.node_ids,
    });

    if !ctx.transition(run_id, RunStatus::Running, None)? {
        return Ok(Outcome::Superseded);
    }
    ctx.progress.on_event(ProgressEvent::Started { job_id: run.id.clone() });

    let job = TrainingJobSpec {
        job_id: run.id.clone(),
        base_model: run.base_model.clone(),
        recipe: run.config.clone(),
        num_gpus: run.num_gpus,
    };
    let total = job.total_steps();
    info!(
        run_id = %run_id,
        trainer = ctx.trainer.id(),
        total_steps = total,
        timeout_secs = ctx.run_timeout_seconds,
        "Training started"
    );

    ctx.trainer.prepare(&job).await?;
    let mut stream = ctx.trainer.produce_metric_stream(&job)?;
    let mut last_step = 0;

    loop {
        let item = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(Outcome::Superseded),
            item = stream.next() => item,
        };
        let Some(item) = item else {
            break;
        };
        let step = match item {
            Ok(step) => step,
            Err(e) => return Ok(Outcome::Failed(e.to_string())),
        };

        // Steps start at 1 and strictly increase
        if step.step <= last_step || (last_step == 0 && step.step != 1) {
            return Ok(Outcome::Failed(format!(
                "trainer emitted step {} after {}",
                step.step, last_step
            )));
        }

        if !ctx.record_metric(run_id, &step)? {
            return Ok(Outcome::Superseded);
        }
        last_step = step.step;
        ctx.progress.on_event(ProgressEvent::Step {
            job_id: run.id.clone(),
            step: step.step,
            total,
            loss: step.loss,
        });
    }

    Ok(Outcome::Completed { steps: last_step })
}

impl RunContext {
    pub(crate) fn transition(
        &self,
        run_id: &str,
        to: RunStatus,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let mut db = self.db.lock();
        let applied =
            SqliteRunRepository::new(&mut db).transition(run_id, to, error_message, Utc::now())?;
        Ok(applied)
    }

    fn record_metric(&self, run_id: &str, step: &StepMetrics) -> Result<bool> {
        let metric = RunMetric {
            run_id: run_id.to_string(),
            step: step.step,
            loss: step.loss,
            learning_rate: step.learning_rate,
            epoch: step.epoch,
            gpu_memory_mb: step.gpu_memory_mb,
            throughput_samples_sec: step.throughput_samples_sec,
            timestamp: Utc::now(),
        };
        let mut db = self.db.lock();
        let appended = SqliteRunRepository::new(&mut db).append_metric(&metric)?;
        Ok(appended)
    }
}
