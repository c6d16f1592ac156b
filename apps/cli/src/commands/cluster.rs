//! Cluster inspection commands.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use forge_core::{ForgeConfig, NodeHealth, Platform};

#[derive(Subcommand, Debug)]
pub enum ClusterCommand {
    /// Show node health and free capacity
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Estimate the cost of a job
    Cost {
        /// Accelerator units
        #[arg(long)]
        units: u32,
        /// Wall-clock hours
        #[arg(long)]
        hours: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Probe every node once and report the results
    Probe,
}

pub async fn execute(cmd: ClusterCommand, config: ForgeConfig) -> Result<()> {
    // The node table is process-local, so no database is needed here
    let platform = Platform::in_memory(config)?;
    match cmd {
        ClusterCommand::Status { json } => status(&platform, json).await,
        ClusterCommand::Cost { units, hours, json } => cost(&platform, units, hours, json),
        ClusterCommand::Probe => probe(&platform).await,
    }
}

fn health_label(status: NodeHealth) -> colored::ColoredString {
    match status {
        NodeHealth::Healthy => "healthy".green(),
        NodeHealth::Degraded => "degraded".yellow(),
        NodeHealth::Offline => "offline".red(),
    }
}

async fn status(platform: &Platform, json_output: bool) -> Result<()> {
    let status = platform.cluster_status().await;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!("{}", "Cluster Status".bold().cyan());
    println!();
    println!(
        "  Nodes: {} ({} healthy, {} degraded, {} offline)",
        status.total_nodes, status.healthy, status.degraded, status.offline
    );
    println!("  GPUs:  {} free of {}", status.available_gpus, status.total_gpus);
    println!("  Rate:  ${:.2} per GPU-hour", status.cost_per_gpu_hour);
    println!();
    println!("  {:<10} {:<6} {:<12} {:<10} {}", "Node", "GPUs", "Type", "Health", "Run");
    println!("  {}", "─".repeat(56));
    for node in &status.nodes {
        println!(
            "  {:<10} {:<6} {:<12} {:<10} {}",
            node.node_id,
            node.gpu_count,
            node.gpu_type,
            health_label(node.status),
            node.assigned_run_id.as_deref().unwrap_or("-").dimmed()
        );
    }
    println!();
    Ok(())
}

fn cost(platform: &Platform, units: u32, hours: f64, json_output: bool) -> Result<()> {
    if !hours.is_finite() || hours < 0.0 {
        anyhow::bail!("--hours must be a non-negative number");
    }
    let estimate = platform.estimate_cost(units, hours);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&estimate)?);
        return Ok(());
    }

    println!();
    println!("{}", "Cost Estimate".bold().cyan());
    println!(
        "  {} units × {} h at ${:.2}",
        estimate.units, estimate.hours, estimate.rate_per_unit_hour
    );
    println!("  GPU cost:          ${:.2}", estimate.gpu_cost);
    println!("  Platform overhead: ${:.2}", estimate.platform_overhead);
    println!("  {}", format!("Total:             ${:.2}", estimate.total_estimated).bold());
    println!();
    Ok(())
}

async fn probe(platform: &Platform) -> Result<()> {
    let reports = platform.probe_cluster().await;

    println!();
    println!("{}", "Health Probe".bold().cyan());
    for report in reports {
        let mark = if report.healthy {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "  {} {:<10} {:<10} failures={}",
            mark,
            report.node_id,
            health_label(report.status),
            report.failure_count
        );
    }
    println!();
    Ok(())
}
