//! Model registry listing command.

use super::open_platform;
use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use forge_core::{ForgeConfig, ModelFilter, Pagination, PromotionStatus};

#[derive(Subcommand, Debug)]
pub enum ModelsCommand {
    /// List registered models, newest first
    List {
        /// Filter by status (staging, candidate, production, archived)
        #[arg(long)]
        status: Option<String>,
        /// Only models whose name contains this text
        #[arg(long)]
        name: Option<String>,
        /// Page size (1-200)
        #[arg(short = 'n', long, default_value = "50")]
        limit: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn execute(cmd: ModelsCommand, config: ForgeConfig) -> Result<()> {
    let platform = open_platform(config)?;
    match cmd {
        ModelsCommand::List { status, name, limit, json } => {
            let filter = ModelFilter {
                status: status
                    .map(|s| s.parse::<PromotionStatus>())
                    .transpose()
                    .context("Invalid --status")?,
                name,
            };
            let page = platform.list_models(&filter, Pagination::new(limit, 0))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&page)?);
                return Ok(());
            }

            println!();
            println!("{}", format!("Models ({})", page.total).bold().cyan());
            println!();
            if page.items.is_empty() {
                println!("  {}", "No models registered.".dimmed());
                println!();
                return Ok(());
            }
            println!(
                "  {:<14} {:<24} {:<9} {:<11} {}",
                "ID", "Name", "Version", "Status", "Overall"
            );
            println!("  {}", "─".repeat(72));
            for model in &page.items {
                let overall = model
                    .eval_scores
                    .get("overall")
                    .and_then(serde_json::Value::as_f64)
                    .map_or_else(|| "-".to_string(), |score| format!("{score:.4}"));
                println!(
                    "  {:<14} {:<24} {:<9} {:<11} {}",
                    model.id.cyan(),
                    model.name,
                    model.version,
                    model.status.as_str(),
                    overall
                );
            }
            println!();
            Ok(())
        }
    }
}
