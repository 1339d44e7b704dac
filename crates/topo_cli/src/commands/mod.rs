//! CLI command definitions.
//!
//! Each subcommand maps to one stage of the topology workflow: validate a
//! document, generate environments from it, and check deployed state
//! against what was generated.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;

use topo_iac::{Backend, BuiltinCatalogSource, Catalog, CatalogSource, FileCatalogSource, RetryPolicy};

pub mod audit_batch;
pub mod check;
pub mod generate;
pub mod validate;

/// topoforge - topology to infrastructure-as-code generator
#[derive(Parser)]
#[command(name = "topoforge")]
#[command(version, about = "topoforge - topology to infrastructure-as-code generator")]
#[command(long_about = r#"
topoforge turns a provider-agnostic topology document (networks, instances,
routers) into Terraform environments for AWS or OpenStack, optionally
cloned N times without name or address collisions, and checks deployed
state against the declared topology.

WORKFLOWS:
  validate      → Schema and network logic checks
  generate      → Validate, match, clone and write Terraform environments
  check         → Compare one environment's deployed state with its topology
  audit-batch   → Verify every copy of a batch has the same resource counts

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Validation failure
  4 - Matching failure
  5 - Generation failure
  6 - Consistency drift
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a topology document
    Validate(validate::ValidateArgs),

    /// Generate Terraform environments for a backend
    Generate(generate::GenerateArgs),

    /// Check an environment's deployed state against its topology
    Check(check::CheckArgs),

    /// Check that every copy of a batch deployed the same resources
    #[command(name = "audit-batch")]
    AuditBatch(audit_batch::AuditBatchArgs),
}

/// A command ran to completion but its verdict is a failure.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CommandFailure {
    pub code: u8,
    pub message: String,
}

impl CommandFailure {
    pub fn new(code: u8, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

pub fn parse_backend(value: &str) -> Result<Backend, String> {
    Backend::from_str(value).ok_or_else(|| {
        let known: Vec<_> = Backend::all().iter().map(|b| b.as_str()).collect();
        format!("unknown backend '{}' (expected one of: {})", value, known.join(", "))
    })
}

/// Fetch the catalog from `path`, or the built-in one.
pub async fn load_catalog(backend: Backend, path: Option<&PathBuf>) -> anyhow::Result<Catalog> {
    let source: Box<dyn CatalogSource> = match path {
        Some(path) => Box::new(FileCatalogSource::new(path)),
        None => Box::new(BuiltinCatalogSource),
    };
    Ok(topo_iac::fetch_catalog_with_retry(source.as_ref(), backend, &RetryPolicy::default()).await?)
}

pub fn print_list(marker: &str, items: impl IntoIterator<Item = impl std::fmt::Display>) {
    for item in items {
        println!("   {} {}", marker, item);
    }
}
