//! Error types for consistency auditing.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;

/// Errors that stop a consistency report from being produced.
///
/// Drift between the topology and the deployment is never an error; it is
/// the content of the report.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Deployed state not found: {0}")]
    StateNotFound(PathBuf),

    #[error("Invalid deployed state: {0}")]
    InvalidState(String),

    #[error("Invalid search pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Topology error: {0}")]
    Model(#[from] topo_model::ModelError),

    #[error("Environment error: {0}")]
    Iac(#[from] topo_iac::IacError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
