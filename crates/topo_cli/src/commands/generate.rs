//! Generate command - Validate, match, clone and write Terraform environments.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use ipnet::Ipv4Net;
use tracing::info;

use topo_iac::{
    ArtifactGenerator, Backend, CloneEngine, CloneSet, CloudConfigRenderer, ProviderSettings, SeededTokens,
};
use topo_model::Topology;

use super::validate::{load_and_validate, print_report};
use super::{load_catalog, parse_backend, print_list, CommandFailure};
use crate::ExitCodes;

#[derive(Args)]
pub struct GenerateArgs {
    /// Target backend (aws, openstack)
    #[arg(value_parser = parse_backend)]
    pub backend: Backend,

    /// Number of copies to generate
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    pub copies: u32,

    /// Topology document
    #[arg(short, long, default_value = "topology.json")]
    pub topology: PathBuf,

    /// Project directory the environments are written to
    #[arg(short, long, env = "TOPOFORGE_OUTPUT_DIR", default_value = "terraform-projects")]
    pub output: PathBuf,

    /// Backend catalog file (yaml, json or toml); the built-in one otherwise
    #[arg(long, env = "TOPOFORGE_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Directory holding boot configuration documents (defaults to the
    /// topology's directory)
    #[arg(long, env = "TOPOFORGE_USERDATA_DIR")]
    pub userdata_dir: Option<PathBuf>,

    /// Seed for clone suffixes; random when omitted
    #[arg(long, env = "TOPOFORGE_SEED")]
    pub seed: Option<u64>,

    /// Address block shared clones are carved from
    #[arg(long, env = "TOPOFORGE_SUPER_BLOCK")]
    pub super_block: Option<Ipv4Net>,
}

pub async fn execute(args: GenerateArgs) -> Result<()> {
    info!("Generating {} copies for {}", args.copies, args.backend);

    let report = load_and_validate(&args.topology)?;
    let Some(topology) = report.topology.as_ref().filter(|_| report.is_valid()) else {
        print_report(&report);
        return Err(CommandFailure::new(ExitCodes::VALIDATION_FAILURE, "Topology validation failed").into());
    };
    print_list("⚠️ ", report.combined().warnings);

    let generator = ArtifactGenerator::new(args.backend)
        .with_settings(ProviderSettings::from_env(args.backend))
        .with_boot_renderer(CloudConfigRenderer::new(userdata_dir(&args)));

    println!("🔎 Matching resources against the {} catalog...", args.backend);
    let catalog = load_catalog(args.backend, args.catalog.as_ref())
        .await
        .context("Failed to load backend catalog")?;
    let matches = generator.driver().match_resources(topology, &catalog);
    if !matches.ok {
        print_list("❌", &matches.messages);
        return Err(CommandFailure::new(ExitCodes::MATCHING_FAILURE, "Resource matching failed").into());
    }
    println!("   ✅ {} instance(s) matched", matches.matches.len());

    let set = clone_batch(topology, &args)?;
    let batch_problems = set.check_batch();
    if !batch_problems.is_empty() {
        print_list("❌", &batch_problems);
        return Err(CommandFailure::new(ExitCodes::GENERATION_FAILURE, "Clone batch is not collision-free").into());
    }

    let result = generator
        .generate_batch(&set, &matches.matches, &args.output)
        .with_context(|| format!("Failed to generate into {}", args.output.display()))?;

    for environment in result.results() {
        println!("📁 {}", environment.output_dir.display());
        print_list("-", environment.files.iter().map(|f| f.display()));
    }
    print_list("⚠️ ", result.warnings());

    if result.is_success() {
        println!();
        println!("✅ Generated {} environment(s) in {}", result.environments.len(), args.output.display());
        Ok(())
    } else {
        print_list("❌", result.errors());
        Err(CommandFailure::new(
            ExitCodes::GENERATION_FAILURE,
            format!("Generation finished with {} error(s)", result.errors().len()),
        )
        .into())
    }
}

fn userdata_dir(args: &GenerateArgs) -> PathBuf {
    args.userdata_dir.clone().unwrap_or_else(|| {
        args.topology
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

fn clone_batch(topology: &Topology, args: &GenerateArgs) -> Result<CloneSet> {
    let tokens = match args.seed {
        Some(seed) => SeededTokens::new(seed),
        None => SeededTokens::from_entropy(),
    };
    let mut engine = CloneEngine::new(tokens);
    if let Some(block) = args.super_block {
        engine = engine.with_super_block(block);
    }
    let set = engine
        .clone_for(topology, args.copies as usize, args.backend)
        .context("Cloning failed")?;

    if let Some(plan) = &set.plan {
        info!(
            "Shared address plan: VPC {} with {} child block(s)",
            plan.vpc_cidr,
            plan.children.len()
        );
    }
    Ok(set)
}
