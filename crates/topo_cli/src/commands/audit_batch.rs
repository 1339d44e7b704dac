//! Audit-batch command - Structural uniformity across the copies of a batch.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use topo_audit::audit_batch;

use super::{print_list, CommandFailure};
use crate::ExitCodes;

#[derive(Args)]
pub struct AuditBatchArgs {
    /// Project directory holding the generated copies
    pub project_dir: PathBuf,

    /// Print the audit as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: AuditBatchArgs) -> Result<()> {
    info!("Auditing batch under {}", args.project_dir.display());
    if !args.project_dir.is_dir() {
        anyhow::bail!("Project directory not found: {}", args.project_dir.display());
    }

    let audit = audit_batch(&args.project_dir)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&audit)?);
    } else {
        println!("📦 {} cop{} found", audit.copies.len(), if audit.copies.len() == 1 { "y" } else { "ies" });
        for copy in &audit.copies {
            println!(
                "   {}: {} network(s), {} instance(s), {} router(s)",
                copy.dir.display(),
                copy.networks,
                copy.instances,
                copy.routers
            );
        }
        print_list("❌", &audit.problems);
    }

    if audit.is_uniform() {
        if !args.json {
            println!("✅ All copies are structurally uniform");
        }
        Ok(())
    } else {
        Err(CommandFailure::new(ExitCodes::DRIFT, "Batch copies differ").into())
    }
}
