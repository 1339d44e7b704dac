//! Topology document reading utilities.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{ModelError, ModelResult};
use crate::models::Topology;

/// Reader for topology documents.
pub struct TopologyReader;

impl TopologyReader {
    /// Read the raw JSON document. Schema validation runs on this value so
    /// that every structural problem can be reported, not just the first one
    /// a typed deserializer would hit.
    pub fn read_document(path: impl AsRef<Path>) -> ModelResult<Value> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ModelError::NotFound(path.to_path_buf()));
        }
        debug!("Reading topology document from {:?}", path);

        let content = fs::read_to_string(path)?;
        Self::parse_document(&content)
    }

    /// Parse a raw JSON document from a string.
    pub fn parse_document(content: &str) -> ModelResult<Value> {
        let value: Value = serde_json::from_str(content)?;
        if !value.is_object() {
            return Err(ModelError::NotAnObject);
        }
        Ok(value)
    }

    /// Convert a (schema-valid) document into a typed topology.
    pub fn from_value(document: &Value) -> ModelResult<Topology> {
        Ok(Topology::deserialize(document)?)
    }

    /// Read and convert in one step, skipping schema diagnostics.
    pub fn read(path: impl AsRef<Path>) -> ModelResult<Topology> {
        let document = Self::read_document(path)?;
        Self::from_value(&document)
    }
}
