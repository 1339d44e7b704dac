//! Error types for the topology model.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while loading or saving a topology.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Topology file not found: {0}")]
    NotFound(PathBuf),

    #[error("Topology document is not a JSON object")]
    NotAnObject,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors produced when parsing address literals.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("'{0}' is not a valid IPv4 address")]
    InvalidAddress(String),

    #[error("'{0}' is not a valid IPv4 CIDR")]
    InvalidCidr(String),

    #[error("'{0}' is an IPv6 literal; only IPv4 is supported")]
    Ipv6Unsupported(String),
}
