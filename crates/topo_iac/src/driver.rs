//! Backend capability interface.
//!
//! Each backend renders the same pieces (provider block, network module
//! invocation, one instance module invocation per instance, outputs and
//! the two module sources) in its own resource model. Shared generation
//! logic lives in [`crate::generator`] and never branches on the backend.

use topo_model::{Instance, MatchedInstance, Topology};

use crate::backend::{Backend, ProviderSettings, SENSITIVE_SETTINGS};
use crate::backends::{AwsDriver, OpenStackDriver};
use crate::catalog::Catalog;
use crate::clone::AddressPlan;
use crate::error::IacResult;
use crate::hcl;
use crate::matcher::{MatchReport, ResourceMatcher};

/// Directory that owns the shared network of a shared-address-space batch.
pub const SHARED_NETWORK_DIR: &str = "00-shared-network";

/// Source files of one Terraform sub-module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleFiles {
    pub main: &'static str,
    pub variables: &'static str,
    pub outputs: &'static str,
}

/// Where instance modules read network and subnet ids from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkSource {
    /// The `network` module of the same environment.
    Module,
    /// Outputs of another environment's local Terraform state.
    RemoteState { state_path: String },
}

impl NetworkSource {
    /// Expression prefix for the network outputs.
    pub fn expression(&self) -> &'static str {
        match self {
            NetworkSource::Module => "module.network",
            NetworkSource::RemoteState { .. } => "data.terraform_remote_state.network.outputs",
        }
    }

    /// Data block required before the source can be referenced.
    pub fn render_data_block(&self) -> Option<String> {
        match self {
            NetworkSource::Module => None,
            NetworkSource::RemoteState { state_path } => Some(format!(
                r#"data "terraform_remote_state" "network" {{
  backend = "local"

  config = {{
    path = {path}
  }}
}}
"#,
                path = hcl::quote(state_path)
            )),
        }
    }

    /// Remote state of the shared network directory, seen from a sibling.
    pub fn shared_network() -> Self {
        NetworkSource::RemoteState {
            state_path: format!("../{}/terraform.tfstate", SHARED_NETWORK_DIR),
        }
    }
}

/// Everything the network module invocation is rendered from.
#[derive(Debug, Clone, Copy)]
pub struct NetworkLayout<'a> {
    /// Environment name, used as a resource name prefix.
    pub name: &'a str,
    /// Networks and routers to create, in declaration order.
    pub topology: &'a Topology,
    pub plan: Option<&'a AddressPlan>,
    /// Image and size for a bastion host in the public subnet.
    pub bastion: Option<&'a MatchedInstance>,
}

/// Per-instance rendering input.
#[derive(Debug, Clone, Copy)]
pub struct InstanceRequest<'a> {
    pub instance: &'a Instance,
    pub matched: &'a MatchedInstance,
    /// Boot configuration path relative to the environment directory.
    pub boot_config: Option<&'a str>,
    pub source: &'a NetworkSource,
}

/// A deployment backend.
pub trait BackendDriver: Send + Sync {
    fn backend(&self) -> Backend;

    /// Whether all clones of a batch share one address space.
    fn requires_shared_address_space(&self) -> bool {
        self.backend().requires_shared_address_space()
    }

    /// Map every instance onto this backend's catalog.
    fn match_resources(&self, topology: &Topology, catalog: &Catalog) -> MatchReport {
        if catalog.backend != self.backend() {
            return MatchReport {
                ok: false,
                messages: vec![format!(
                    "Catalog is for {}, not {}",
                    catalog.backend,
                    self.backend()
                )],
                ..Default::default()
            };
        }
        ResourceMatcher::new(catalog).match_topology(topology)
    }

    /// `terraform` and `provider` blocks heading `main.tf`.
    fn render_provider(&self, settings: &ProviderSettings) -> String;

    /// `variables.tf`: the region plus one variable per provider setting.
    /// Secrets are declared sensitive and only get a default when supplied.
    fn render_variables(&self, settings: &ProviderSettings) -> String {
        let mut out = format!(
            r#"variable "region" {{
  description = "{backend} region"
  type        = string
  default     = {region}
}}
"#,
            backend = self.backend(),
            region = hcl::quote(&settings.region)
        );

        let mut keys: Vec<&str> = self
            .backend()
            .settings_env()
            .iter()
            .map(|(_, key)| *key)
            .filter(|key| *key != "region")
            .collect();
        for key in settings.variables.keys() {
            if !keys.contains(&key.as_str()) {
                keys.push(key.as_str());
            }
        }

        for key in keys {
            let sensitive = SENSITIVE_SETTINGS.contains(&key);
            let default = match (settings.get(key), sensitive) {
                (Some(value), _) => format!("\n  default     = {}", hcl::quote(value)),
                (None, true) => String::new(),
                (None, false) => "\n  default     = null".to_string(),
            };
            let sensitive = if sensitive { "\n  sensitive   = true" } else { "" };
            out.push_str(&format!(
                r#"
variable "{name}" {{
  type        = string{default}{sensitive}
}}
"#,
                name = hcl::identifier(key),
            ));
        }
        out
    }

    /// Problems the backend cannot express, reported as warnings.
    fn unsupported(&self, _topology: &Topology) -> Vec<String> {
        Vec::new()
    }

    /// `module "network"` invocation.
    fn render_network(&self, layout: &NetworkLayout<'_>) -> IacResult<String>;

    /// `module "instance_<name>"` invocation.
    fn render_instance(&self, request: &InstanceRequest<'_>) -> String;

    /// Outputs exported by the network module, re-exported at the root so
    /// sibling environments can read them through remote state.
    fn network_outputs(&self) -> &'static [&'static str];

    fn network_module(&self) -> ModuleFiles;

    fn instance_module(&self) -> ModuleFiles;
}

/// Driver for a backend.
pub fn driver_for(backend: Backend) -> Box<dyn BackendDriver> {
    match backend {
        Backend::Aws => Box::new(AwsDriver),
        Backend::OpenStack => Box::new(OpenStackDriver),
    }
}

/// `terraform { required_providers { ... } }` for a backend.
pub(crate) fn terraform_block(backend: Backend) -> String {
    format!(
        r#"terraform {{
  required_version = ">= 1.3.0"

  required_providers {{
    {name} = {{
      source  = "{source}"
      version = "{version}"
    }}
  }}
}}
"#,
        name = backend.provider_name(),
        source = backend.provider_source(),
        version = backend.provider_version()
    )
}

/// Interface list entries for an instance, keyed by topology network name.
pub(crate) fn interface_entries(instance: &Instance, source: &NetworkSource, with_network_id: bool) -> String {
    let prefix = source.expression();
    let entries: Vec<String> = instance
        .networks
        .iter()
        .map(|a| {
            let key = hcl::quote(&a.network_name);
            if with_network_id {
                format!(
                    "{{ network_id = {p}.network_ids[{k}], subnet_id = {p}.subnet_ids[{k}], ip = {ip} }}",
                    p = prefix,
                    k = key,
                    ip = hcl::quote(&a.ip)
                )
            } else {
                format!(
                    "{{ subnet_id = {p}.subnet_ids[{k}], ip = {ip} }}",
                    p = prefix,
                    k = key,
                    ip = hcl::quote(&a.ip)
                )
            }
        })
        .collect();
    if entries.is_empty() {
        "[]".to_string()
    } else {
        format!("[\n    {},\n  ]", entries.join(",\n    "))
    }
}

/// `user_data` argument value.
pub(crate) fn user_data(boot_config: Option<&str>) -> String {
    match boot_config {
        Some(path) => format!("file(\"${{path.root}}/{}\")", path),
        None => "null".to_string(),
    }
}
