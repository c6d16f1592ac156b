//! End-to-end demo: seed datasets, train two runs, evaluate, promote, compare.

use anyhow::{Context, Result};
use colored::Colorize;
use forge_core::{
    Backends, Database, DatasetFilter, DatasetRecord, EvalRequest, ForgeConfig, ForgeError,
    LaunchRequest, NewDataset, Pagination, Platform, PromoteRequest, PromotionStatus, RunStatus,
};
use forge_training::{ProgressSink, RecipeKind, StdoutProgressSink, TracingProgressSink};
use serde_json::json;
use std::sync::Arc;

const BASE_MODEL: &str = "meta-llama/Llama-2-7b-hf";

/// Registers a dataset, or returns the existing one with the same name and version.
fn ensure_dataset(platform: &Platform, input: NewDataset) -> Result<DatasetRecord> {
    let filter = DatasetFilter {
        name: Some(input.name.clone()),
        version: Some(input.version.clone()),
        tag: None,
    };
    match platform.register_dataset(input) {
        Ok(dataset) => Ok(dataset),
        Err(ForgeError::Conflict(_)) => platform
            .list_datasets(&filter, Pagination::new(1, 0))?
            .items
            .into_iter()
            .next()
            .context("Dataset reported as duplicate but not found"),
        Err(e) => Err(e.into()),
    }
}

pub async fn execute(config: ForgeConfig, json_output: bool) -> Result<()> {
    let db = Database::open(&config.storage.db_path)
        .with_context(|| format!("Failed to open database at {}", config.storage.db_path))?;
    // JSON output owns stdout, so progress goes to the log instead
    let progress: Arc<dyn ProgressSink> = if json_output {
        Arc::new(TracingProgressSink)
    } else {
        Arc::new(StdoutProgressSink)
    };
    let backends = Backends::simulated(&config).with_progress(progress);
    let platform = Platform::with_backends(config, db, backends);

    if !json_output {
        println!();
        println!("{}", "Forge demo".bold().cyan());
        println!();
    }

    let alpaca = ensure_dataset(
        &platform,
        NewDataset::new("instruct-alpaca-cleaned", "2.1.0", "s3://forge-datasets/alpaca-cleaned")
            .with_tags(["instruction", "sft"]),
    )?;
    let orca = ensure_dataset(
        &platform,
        NewDataset::new("orca-dpo-pairs", "1.0.0", "s3://forge-datasets/orca-dpo")
            .with_tags(["preference", "dpo"]),
    )?;
    let filtered = ensure_dataset(
        &platform,
        NewDataset::new("alpaca-filtered", "1.0.0", "s3://forge-datasets/alpaca-filtered")
            .with_parent(&alpaca.id)
            .with_tags(["instruction"]),
    )?;
    let lineage = platform.get_lineage(&filtered.id)?;
    if !json_output {
        println!(
            "  Datasets: {}, {}, {}",
            alpaca.name.cyan(),
            orca.name.cyan(),
            filtered.name.cyan()
        );
        println!("  Lineage of {}: {} hop(s)", filtered.name, lineage.len() - 1);
        println!();
    }

    let lora = platform
        .launch_run(
            LaunchRequest::new("alpaca-lora-7b", BASE_MODEL, &filtered.id, RecipeKind::LoraSft)
                .with_override("num_epochs", 1)
                .with_gpus(4),
        )
        .await?;
    let dpo = platform
        .launch_run(
            LaunchRequest::new("orca-dpo-7b", BASE_MODEL, &orca.id, RecipeKind::Dpo).with_gpus(2),
        )
        .await?;

    let lora = platform.wait_for_run(&lora.id).await?;
    let dpo = platform.wait_for_run(&dpo.id).await?;
    for run in [&lora, &dpo] {
        if run.status != RunStatus::Completed {
            anyhow::bail!(
                "Run {} ended {}: {}",
                run.id,
                run.status,
                run.error_message.as_deref().unwrap_or("no message")
            );
        }
    }

    let baseline_model = platform.promote_model(
        PromoteRequest::new(&lora.id, "alpaca-7b-lora", format!("1.0.0+{}", lora.id))
            .with_target(PromotionStatus::Candidate),
    )?;
    let baseline_eval = platform.run_eval(EvalRequest::new(&baseline_model.id, "default")).await?;
    let baseline_eval = platform.wait_for_eval(&baseline_eval.id).await?;

    let candidate = platform.promote_model(
        PromoteRequest::new(&dpo.id, "orca-7b-dpo", format!("1.0.0+{}", dpo.id))
            .with_min_eval_score(0.6),
    )?;
    let candidate_eval = platform
        .run_eval(EvalRequest::new(&candidate.id, "default").with_baseline(&baseline_eval.id))
        .await?;
    let candidate_eval = platform.wait_for_eval(&candidate_eval.id).await?;
    let comparison = platform.compare_evals(&candidate_eval.id, &baseline_eval.id)?;

    if json_output {
        let summary = json!({
            "datasets": [alpaca.id, orca.id, filtered.id],
            "runs": [lora, dpo],
            "models": [baseline_model, candidate],
            "evals": [baseline_eval, candidate_eval],
            "comparison": comparison,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!();
    println!("{}", "Evaluations".bold().cyan());
    for (label, eval) in [("baseline", &baseline_eval), ("candidate", &candidate_eval)] {
        println!(
            "  {:<10} {} status={} overall={:.4}",
            label,
            eval.id.cyan(),
            eval.status,
            eval.overall_score.unwrap_or(0.0)
        );
    }

    println!();
    println!("{}", "Comparison".bold().cyan());
    println!("  {:<14} {:>9} {:>9} {:>9}", "Benchmark", "Current", "Baseline", "Delta");
    for delta in &comparison.regressions {
        let flag = if delta.regressed {
            "regressed".red()
        } else {
            "ok".green()
        };
        println!(
            "  {:<14} {:>9.4} {:>9.4} {:>+9.4} {}",
            delta.benchmark, delta.current, delta.baseline, delta.delta, flag
        );
    }
    println!();
    Ok(())
}
