//! Check command - Compare an environment's deployed state with its topology.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use topo_audit::{CategoryStatus, ConsistencyChecker, ConsistencyReport};
use topo_iac::{driver_for, Backend, EnvironmentLayout};

use super::{load_catalog, parse_backend, print_list, CommandFailure};
use crate::ExitCodes;

#[derive(Args)]
pub struct CheckArgs {
    /// Generated environment directory
    pub env_dir: PathBuf,

    /// State file to check; the environment's terraform.tfstate otherwise
    #[arg(long)]
    pub state: Option<PathBuf>,

    /// Backend, when it cannot be detected from main.tf
    #[arg(long, value_parser = parse_backend)]
    pub backend: Option<Backend>,

    /// Catalog used to derive the expected images and size classes
    #[arg(long, env = "TOPOFORGE_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: CheckArgs) -> Result<()> {
    info!("Checking environment: {}", args.env_dir.display());

    let layout = EnvironmentLayout::detect(&args.env_dir)
        .with_context(|| format!("Environment not found: {}", args.env_dir.display()))?;
    let topology = layout.load_topology()?;

    // Expected images and size classes come from re-matching the topology.
    let mut matches = BTreeMap::new();
    match args.backend.or(layout.backend) {
        Some(backend) => {
            let catalog = load_catalog(backend, args.catalog.as_ref())
                .await
                .context("Failed to load backend catalog")?;
            let report = driver_for(backend).match_resources(&topology, &catalog);
            for message in &report.messages {
                warn!("{}", message);
            }
            matches = report.matches;
        }
        None => warn!("Backend unknown; image and size checks skipped"),
    }

    let report = ConsistencyChecker::new()
        .with_matches(&matches)
        .check_environment(&args.env_dir, args.state.as_deref())?;

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        print_report(&report);
    }

    if report.is_consistent() {
        Ok(())
    } else {
        Err(CommandFailure::new(ExitCodes::DRIFT, format!("Environment is {}", report.status)).into())
    }
}

fn print_report(report: &ConsistencyReport) {
    println!("🔍 Consistency check ({})", report.checked_at.format("%Y-%m-%d %H:%M:%S UTC"));
    for (category, result) in &report.per_category {
        let marker = match result.status {
            CategoryStatus::Pass => "✅",
            CategoryStatus::Fail => "❌",
            CategoryStatus::Skip => "➖",
        };
        println!(
            "   {} {}s: {} ({} declared, {} reported)",
            marker,
            category,
            result.status,
            result.expected.len(),
            result.actual.len()
        );
        print_list("   missing:", &result.missing);
        print_list("   unexpected:", &result.unexpected);
        print_list("  ", &result.mismatches);
    }
    println!();
    println!("{}: {}", report.status, report.summary);
}
