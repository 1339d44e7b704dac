//! Topology document writing utilities.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::ModelResult;
use crate::models::Topology;

/// Writer for topology documents.
pub struct TopologyWriter;

impl TopologyWriter {
    /// Render a topology as pretty JSON with a trailing newline. Field order
    /// follows the model's declaration order, so output is stable.
    pub fn to_string(topology: &Topology) -> ModelResult<String> {
        let mut content = serde_json::to_string_pretty(topology)?;
        content.push('\n');
        Ok(content)
    }

    /// Write a topology document to disk.
    pub fn write(path: impl AsRef<Path>, topology: &Topology) -> ModelResult<()> {
        let path = path.as_ref();
        debug!("Writing topology document to {:?}", path);

        fs::write(path, Self::to_string(topology)?)?;
        Ok(())
    }
}
