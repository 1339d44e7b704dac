//! Error types for the validation crate.

use thiserror::Error;

/// Result type alias for validation entry points that touch the filesystem.
pub type ValidateResult<T> = Result<T, ValidateError>;

/// Errors that prevent a validation report from being produced at all.
///
/// Problems found *inside* a topology are never reported this way; they are
/// collected into a [`crate::ValidationResult`].
#[derive(Error, Debug)]
pub enum ValidateError {
    #[error("Topology error: {0}")]
    Model(#[from] topo_model::ModelError),
}
