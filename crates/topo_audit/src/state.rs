//! Backend-reported resources.
//!
//! Deployed state comes in two shapes: a resource list keyed by category
//! (`networks`, `instances`, `routers`), or a Terraform state file whose
//! managed resources are mapped onto those categories by type.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use topo_model::{net, ResourceCategory, Topology};

use crate::error::{AuditError, AuditResult};

/// Terraform resource names topoforge uses for its own scaffolding rather
/// than for topology entities.
const SCAFFOLDING_RESOURCES: &[&str] = &["public", "bastion"];

/// A reported subnet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedNetwork {
    /// May be empty or backend-generated.
    #[serde(default)]
    pub name: String,
    pub cidr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// A reported compute instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedInstance {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_class: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
}

/// A reported router (or AWS route table).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedRouter {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Resources reported by a backend, bucketed by category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedState {
    #[serde(default)]
    pub networks: Vec<ReportedNetwork>,
    #[serde(default)]
    pub instances: Vec<ReportedInstance>,
    #[serde(default)]
    pub routers: Vec<ReportedRouter>,
}

impl DeployedState {
    pub fn is_empty(&self) -> bool {
        self.networks.is_empty() && self.instances.is_empty() && self.routers.is_empty()
    }

    pub fn count(&self, category: ResourceCategory) -> usize {
        match category {
            ResourceCategory::Network => self.networks.len(),
            ResourceCategory::Instance => self.instances.len(),
            ResourceCategory::Router => self.routers.len(),
        }
    }

    /// Load either shape from a JSON file.
    pub fn load(path: &Path) -> AuditResult<Self> {
        if !path.is_file() {
            return Err(AuditError::StateNotFound(path.to_path_buf()));
        }
        let document: Value = serde_json::from_str(&fs::read_to_string(path)?)?;
        let state = if document.get("resources").is_some() {
            Self::from_tfstate(&document)?
        } else {
            Self::from_document(&document)?
        };
        debug!(
            "Loaded {:?}: {} networks, {} instances, {} routers",
            path,
            state.networks.len(),
            state.instances.len(),
            state.routers.len()
        );
        Ok(state)
    }

    /// Category-keyed resource list.
    pub fn from_document(document: &Value) -> AuditResult<Self> {
        if !document.is_object() {
            return Err(AuditError::InvalidState(
                "resource list must be a JSON object keyed by category".to_string(),
            ));
        }
        Ok(Self::deserialize(document)?)
    }

    /// Managed resources of a Terraform state document.
    pub fn from_tfstate(document: &Value) -> AuditResult<Self> {
        let resources = document
            .get("resources")
            .and_then(Value::as_array)
            .ok_or_else(|| AuditError::InvalidState("state has no resources array".to_string()))?;

        let mut state = Self::default();
        for resource in resources {
            if resource.get("mode").and_then(Value::as_str) != Some("managed") {
                continue;
            }
            let name = resource.get("name").and_then(Value::as_str).unwrap_or_default();
            if SCAFFOLDING_RESOURCES.contains(&name) {
                continue;
            }
            let kind = resource.get("type").and_then(Value::as_str).unwrap_or_default();

            let instances = resource
                .get("instances")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for entry in instances {
                let key = entry.get("index_key").and_then(Value::as_str);
                let Some(attributes) = entry.get("attributes") else { continue };
                state.add_tf_resource(kind, key, attributes);
            }
        }
        Ok(state)
    }

    fn add_tf_resource(&mut self, kind: &str, key: Option<&str>, attributes: &Value) {
        let text = |field: &str| attributes.get(field).and_then(Value::as_str).map(str::to_string);
        let tag_name = || {
            attributes
                .get("tags")
                .and_then(|t| t.get("Name"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| key.map(str::to_string))
                .unwrap_or_default()
        };

        match kind {
            "openstack_networking_subnet_v2" => self.networks.push(ReportedNetwork {
                name: text("name").unwrap_or_default(),
                cidr: text("cidr").unwrap_or_default(),
                gateway_ip: text("gateway_ip").filter(|g| !g.is_empty()),
                id: text("id"),
            }),
            "aws_subnet" => self.networks.push(ReportedNetwork {
                name: tag_name(),
                cidr: text("cidr_block").unwrap_or_default(),
                gateway_ip: None,
                id: text("id"),
            }),
            "openstack_compute_instance_v2" => self.instances.push(ReportedInstance {
                name: text("name").unwrap_or_default(),
                id: text("id"),
                image_id: text("image_id"),
                size_class: text("flavor_name"),
                addresses: attributes
                    .get("network")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(|n| n.get("fixed_ip_v4").and_then(Value::as_str))
                    .filter(|ip| !ip.is_empty())
                    .map(str::to_string)
                    .collect(),
            }),
            "aws_instance" => self.instances.push(ReportedInstance {
                name: tag_name(),
                id: text("id"),
                image_id: text("ami"),
                size_class: text("instance_type"),
                addresses: text("private_ip").into_iter().collect(),
            }),
            "openstack_networking_router_v2" => self.routers.push(ReportedRouter {
                name: text("name").unwrap_or_default(),
                id: text("id"),
            }),
            "aws_route_table" => self.routers.push(ReportedRouter {
                name: tag_name(),
                id: text("id"),
            }),
            _ => {}
        }
    }

    pub fn merge(&mut self, other: DeployedState) {
        self.networks.extend(other.networks);
        self.instances.extend(other.instances);
        self.routers.extend(other.routers);
    }

    /// Entries of a state shared by several environments that belong to
    /// `topology`: networks by CIDR, routers by name.
    pub fn scoped_to(&self, topology: &Topology) -> DeployedState {
        let cidrs: Vec<_> = topology
            .networks
            .iter()
            .filter_map(|n| net::parse_cidr(&n.cidr).ok())
            .collect();
        DeployedState {
            networks: self
                .networks
                .iter()
                .filter(|n| net::parse_cidr(&n.cidr).map_or(false, |c| cidrs.contains(&c)))
                .cloned()
                .collect(),
            instances: self
                .instances
                .iter()
                .filter(|i| topology.instances.iter().any(|d| i.name.contains(&d.name)))
                .cloned()
                .collect(),
            routers: self
                .routers
                .iter()
                .filter(|r| topology.routers.iter().any(|d| r.name.contains(&d.name)))
                .cloned()
                .collect(),
        }
    }
}
