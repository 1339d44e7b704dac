//! topoforge CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Validation failure
//! - 4: Matching failure
//! - 5: Generation failure
//! - 6: Consistency drift

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, Commands, CommandFailure};
use topo_iac::IacError;

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const VALIDATION_FAILURE: u8 = 3;
    pub const MATCHING_FAILURE: u8 = 4;
    pub const GENERATION_FAILURE: u8 = 5;
    pub const DRIFT: u8 = 6;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // `topo` prefixes both the binary and the library crates.
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("topo={},warn", level)));
    // Already initialized is fine.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    let result = match cli.command {
        Commands::Validate(args) => commands::validate::execute(args).await,
        Commands::Generate(args) => commands::generate::execute(args).await,
        Commands::Check(args) => commands::check::execute(args).await,
        Commands::AuditBatch(args) => commands::audit_batch::execute(args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    if let Some(failure) = e.downcast_ref::<CommandFailure>() {
        return failure.code;
    }
    if let Some(IacError::InvalidCopies(_) | IacError::InvalidBackend(_)) = e.downcast_ref::<IacError>() {
        return ExitCodes::INVALID_ARGS;
    }

    let msg = e.to_string().to_lowercase();
    if msg.contains("not found") || msg.contains("argument") {
        ExitCodes::INVALID_ARGS
    } else {
        ExitCodes::GENERAL_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failure_keeps_its_code() {
        let error = anyhow::Error::new(CommandFailure::new(ExitCodes::DRIFT, "drift"));
        assert_eq!(categorize_error(&error), ExitCodes::DRIFT);
    }

    #[test]
    fn test_invalid_copies_is_an_argument_error() {
        let error = anyhow::Error::new(IacError::InvalidCopies(0)).context("Cloning failed");
        assert_eq!(categorize_error(&error), ExitCodes::INVALID_ARGS);
    }

    #[test]
    fn test_other_errors_are_general() {
        assert_eq!(categorize_error(&anyhow::anyhow!("disk full")), ExitCodes::GENERAL_ERROR);
        assert_eq!(
            categorize_error(&anyhow::anyhow!("Topology file not found: x.json")),
            ExitCodes::INVALID_ARGS
        );
    }
}
