//! Run listing command.

use super::open_platform;
use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use forge_core::{ForgeConfig, Pagination, RunFilter, RunStatus};
use forge_training::RecipeKind;

#[derive(Subcommand, Debug)]
pub enum RunsCommand {
    /// List training runs, newest first
    List {
        /// Filter by status (pending, provisioning, running, completed, failed, cancelled)
        #[arg(long)]
        status: Option<String>,
        /// Filter by recipe (lora_sft, dpo, rlhf)
        #[arg(long)]
        recipe: Option<String>,
        /// Page size (1-200)
        #[arg(short = 'n', long, default_value = "50")]
        limit: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the last metrics of a run
    Metrics {
        /// Run ID
        id: String,
        /// Number of trailing steps (0 for all)
        #[arg(short = 'n', long, default_value = "10")]
        last: u32,
    },
}

fn status_label(status: RunStatus) -> colored::ColoredString {
    match status {
        RunStatus::Completed => status.as_str().green(),
        RunStatus::Failed => status.as_str().red(),
        RunStatus::Cancelled => status.as_str().yellow(),
        _ => status.as_str().cyan(),
    }
}

pub fn execute(cmd: RunsCommand, config: ForgeConfig) -> Result<()> {
    let platform = open_platform(config)?;
    match cmd {
        RunsCommand::List { status, recipe, limit, json } => {
            let filter = RunFilter {
                status: status
                    .map(|s| s.parse::<RunStatus>())
                    .transpose()
                    .context("Invalid --status")?,
                recipe: recipe
                    .map(|r| r.parse::<RecipeKind>())
                    .transpose()
                    .context("Invalid --recipe")?,
            };
            let page = platform.list_runs(&filter, Pagination::new(limit, 0))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&page)?);
                return Ok(());
            }

            println!();
            println!("{}", format!("Runs ({})", page.total).bold().cyan());
            println!();
            if page.items.is_empty() {
                println!("  {}", "No runs found.".dimmed());
                println!();
                return Ok(());
            }
            println!("  {:<14} {:<24} {:<9} {:<5} {}", "ID", "Name", "Recipe", "GPUs", "Status");
            println!("  {}", "─".repeat(70));
            for run in &page.items {
                println!(
                    "  {:<14} {:<24} {:<9} {:<5} {}",
                    run.id.cyan(),
                    run.name,
                    run.recipe().as_str(),
                    run.num_gpus,
                    status_label(run.status)
                );
                if let Some(message) = &run.error_message {
                    println!("  {:<14} {}", "", message.red().dimmed());
                }
            }
            println!();
            Ok(())
        }
        RunsCommand::Metrics { id, last } => {
            let metrics = platform.get_metrics(&id, Some(last))?;
            println!();
            println!("  {:>6} {:>8} {:>12} {:>7}", "Step", "Loss", "LR", "Epoch");
            for m in &metrics {
                println!(
                    "  {:>6} {:>8.4} {:>12.3e} {:>7.2}",
                    m.step, m.loss, m.learning_rate, m.epoch
                );
            }
            println!();
            Ok(())
        }
    }
}
