//! Dataset listing command.

use super::{open_platform, truncate};
use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use forge_core::{DatasetFilter, ForgeConfig, Pagination};

#[derive(Subcommand, Debug)]
pub enum DatasetsCommand {
    /// List registered datasets, newest first
    List {
        /// Only datasets whose name contains this text
        #[arg(long)]
        name: Option<String>,
        /// Only datasets carrying this tag
        #[arg(long)]
        tag: Option<String>,
        /// Page size (1-200)
        #[arg(short = 'n', long, default_value = "50")]
        limit: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a dataset and its ancestors
    Lineage {
        /// Dataset ID
        id: String,
    },
}

pub fn execute(cmd: DatasetsCommand, config: ForgeConfig) -> Result<()> {
    let platform = open_platform(config)?;
    match cmd {
        DatasetsCommand::List { name, tag, limit, json } => {
            let filter = DatasetFilter { name, version: None, tag };
            let page = platform.list_datasets(&filter, Pagination::new(limit, 0))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&page)?);
                return Ok(());
            }

            println!();
            println!("{}", format!("Datasets ({})", page.total).bold().cyan());
            println!();
            if page.items.is_empty() {
                println!("  {}", "No datasets registered.".dimmed());
                println!();
                return Ok(());
            }
            println!("  {:<14} {:<28} {:<10} {:<8} {}", "ID", "Name", "Version", "Format", "Tags");
            println!("  {}", "─".repeat(80));
            for dataset in &page.items {
                println!(
                    "  {:<14} {:<28} {:<10} {:<8} {}",
                    dataset.id.cyan(),
                    truncate(&dataset.name, 28),
                    dataset.version,
                    dataset.format,
                    dataset.tags.join(",").dimmed()
                );
            }
            println!();
            Ok(())
        }
        DatasetsCommand::Lineage { id } => {
            let lineage = platform.get_lineage(&id)?;
            println!();
            for (depth, dataset) in lineage.iter().enumerate() {
                let indent = "  ".repeat(depth + 1);
                println!(
                    "{indent}{} {}@{} ({})",
                    "└".dimmed(),
                    dataset.name.bold(),
                    dataset.version,
                    dataset.id.cyan()
                );
            }
            println!();
            Ok(())
        }
    }
}
