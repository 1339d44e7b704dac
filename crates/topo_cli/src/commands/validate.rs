//! Validate command - Schema and network logic checks for a topology.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use topo_validate::{TopologyReport, TopologyValidator};

use super::{print_list, CommandFailure};
use crate::ExitCodes;

#[derive(Args)]
pub struct ValidateArgs {
    /// Topology document to validate
    #[arg(short, long, default_value = "topology.json")]
    pub topology: PathBuf,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: ValidateArgs) -> Result<()> {
    let report = load_and_validate(&args.topology)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.is_valid() {
        Ok(())
    } else {
        Err(CommandFailure::new(ExitCodes::VALIDATION_FAILURE, "Topology validation failed").into())
    }
}

/// Validate a topology file, failing on a missing or unparsable file.
pub fn load_and_validate(path: &Path) -> Result<TopologyReport> {
    if !path.is_file() {
        anyhow::bail!("Topology file not found: {}", path.display());
    }
    info!("Validating topology: {}", path.display());
    TopologyValidator::validate_file(path).with_context(|| format!("Failed to read {}", path.display()))
}

pub fn print_report(report: &TopologyReport) {
    println!("📋 Schema validation...");
    if report.schema.valid {
        println!("   ✅ Schema validation passed");
    } else {
        println!("   ❌ Schema validation failed:");
        print_list("-", &report.schema.errors);
    }
    print_list("⚠️ ", &report.schema.warnings);

    if report.topology.is_none() {
        return;
    }

    println!("🌐 Network logic validation...");
    if report.logic.valid {
        println!("   ✅ Network logic validation passed");
    } else {
        println!("   ❌ Network logic validation failed:");
        print_list("-", &report.logic.errors);
    }
    print_list("⚠️ ", &report.logic.warnings);
}
