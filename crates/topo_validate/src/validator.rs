//! Full validation pipeline: schema first, then network logic.

use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use topo_model::{Topology, TopologyReader};

use crate::error::ValidateResult;
use crate::logic::NetworkLogicValidator;
use crate::result::ValidationResult;
use crate::schema::SchemaValidator;

/// Outcome of validating one topology document.
#[derive(Debug, Clone, Serialize)]
pub struct TopologyReport {
    /// The typed topology, present only when the document is structurally valid.
    #[serde(skip)]
    pub topology: Option<Topology>,
    pub schema: ValidationResult,
    pub logic: ValidationResult,
}

impl TopologyReport {
    pub fn is_valid(&self) -> bool {
        self.schema.valid && self.logic.valid && self.topology.is_some()
    }

    /// Schema and logic diagnostics in reporting order.
    pub fn combined(&self) -> ValidationResult {
        let mut result = self.schema.clone();
        result.merge(self.logic.clone());
        result
    }
}

/// Validator for topology documents.
pub struct TopologyValidator;

impl TopologyValidator {
    /// Load and validate a topology file.
    pub fn validate_file(path: impl AsRef<Path>) -> ValidateResult<TopologyReport> {
        let path = path.as_ref();
        let document = TopologyReader::read_document(path)?;
        info!("Validating topology {}", path.display());
        Ok(Self::validate_document(&document))
    }

    /// Validate a parsed document. Logic checks run only on documents that
    /// pass the schema, since they need the typed model.
    pub fn validate_document(document: &Value) -> TopologyReport {
        let mut schema = SchemaValidator::validate(document);
        if !schema.valid {
            warn!("Topology failed schema validation with {} errors", schema.errors.len());
            return TopologyReport {
                topology: None,
                schema,
                logic: ValidationResult::new(),
            };
        }

        let topology = match TopologyReader::from_value(document) {
            Ok(topology) => topology,
            Err(e) => {
                schema.add_error(format!("root: {}", e));
                return TopologyReport {
                    topology: None,
                    schema,
                    logic: ValidationResult::new(),
                };
            }
        };

        let logic = NetworkLogicValidator::validate(&topology);
        if logic.valid {
            info!(
                "Topology is valid ({} networks, {} instances, {} routers)",
                topology.networks.len(),
                topology.instances.len(),
                topology.routers.len()
            );
        } else {
            warn!("Topology failed logic validation with {} errors", logic.errors.len());
        }

        TopologyReport {
            topology: Some(topology),
            schema,
            logic,
        }
    }
}

/// Structural checks on a raw topology document.
pub fn validate_schema(document: &Value) -> ValidationResult {
    SchemaValidator::validate(document)
}

/// Semantic checks on a typed topology.
pub fn validate_logic(topology: &Topology) -> ValidationResult {
    NetworkLogicValidator::validate(topology)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_failure_skips_logic() {
        let report = TopologyValidator::validate_document(&json!({"networks": []}));
        assert!(!report.is_valid());
        assert!(report.topology.is_none());
        assert!(report.logic.errors.is_empty());
        assert_eq!(report.combined().errors.len(), 2);
    }

    #[test]
    fn test_valid_document() {
        let report = TopologyValidator::validate_document(&json!({
            "networks": [{"name": "n", "cidr": "10.0.0.0/24", "gateway_ip": "10.0.0.1"}],
            "instances": [],
            "routers": []
        }));
        assert!(report.is_valid());
        assert_eq!(report.topology.unwrap().networks.len(), 1);
    }
}
