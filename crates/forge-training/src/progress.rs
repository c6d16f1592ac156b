use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Milestones of a run as seen by the lifecycle engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { job_id: String },
    Provisioned { job_id: String, nodes: Vec<String> },
    Step { job_id: String, step: u64, total: u64, loss: f64 },
    Finished { job_id: String },
    Failed { job_id: String, reason: String },
    Cancelled { job_id: String },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

/// Prints milestones and every tenth step.
#[derive(Debug, Default)]
pub struct StdoutProgressSink;

impl ProgressSink for StdoutProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { job_id } => println!("[run:{job_id}] started"),
            ProgressEvent::Provisioned { job_id, nodes } => {
                println!("[run:{job_id}] provisioned on {}", nodes.join(", "));
            }
            ProgressEvent::Step { job_id, step, total, loss } => {
                if step % 10 == 0 || step == total {
                    println!("[run:{job_id}] step {step}/{total} loss={loss:.4}");
                }
            }
            ProgressEvent::Finished { job_id } => println!("[run:{job_id}] finished"),
            ProgressEvent::Failed { job_id, reason } => println!("[run:{job_id}] failed: {reason}"),
            ProgressEvent::Cancelled { job_id } => println!("[run:{job_id}] cancelled"),
        }
    }
}

/// Routes progress into the `tracing` pipeline.
#[derive(Debug, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { job_id } => info!(run_id = %job_id, "Run started"),
            ProgressEvent::Provisioned { job_id, nodes } => {
                info!(run_id = %job_id, nodes = ?nodes, "Run provisioned");
            }
            ProgressEvent::Step { job_id, step, total, loss } => {
                debug!(run_id = %job_id, step, total, loss, "Training step");
            }
            ProgressEvent::Finished { job_id } => info!(run_id = %job_id, "Run finished"),
            ProgressEvent::Failed { job_id, reason } => {
                warn!(run_id = %job_id, reason = %reason, "Run failed");
            }
            ProgressEvent::Cancelled { job_id } => info!(run_id = %job_id, "Run cancelled"),
        }
    }
}
