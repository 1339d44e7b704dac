//! Error types for matching, cloning and generation.

use thiserror::Error;

/// Result type alias for IaC operations.
pub type IacResult<T> = Result<T, IacError>;

/// Errors that stop an IaC operation from producing a result.
#[derive(Error, Debug)]
pub enum IacError {
    #[error("Invalid backend: {0}")]
    InvalidBackend(String),

    #[error("Invalid copy count {0}: at least one copy is required")]
    InvalidCopies(usize),

    #[error("Clone failed: {0}")]
    Clone(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Catalog unavailable after {attempts} attempts: {message}")]
    CatalogUnavailable { attempts: u32, message: String },

    #[error("Boot configuration error: {0}")]
    BootConfig(String),

    #[error("Layout error: {0}")]
    Layout(String),

    #[error("Topology error: {0}")]
    Model(#[from] topo_model::ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
