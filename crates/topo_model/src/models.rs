//! Data models for infrastructure topologies.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// A complete declarative environment: instances, networks and routers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub instances: Vec<Instance>,
    #[serde(default)]
    pub networks: Vec<Network>,
    #[serde(default)]
    pub routers: Vec<Router>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_network(mut self, network: Network) -> Self {
        self.networks.push(network);
        self
    }

    pub fn with_instance(mut self, instance: Instance) -> Self {
        self.instances.push(instance);
        self
    }

    pub fn with_router(mut self, router: Router) -> Self {
        self.routers.push(router);
        self
    }

    /// Look up a network by exact name.
    pub fn network(&self, name: &str) -> Option<&Network> {
        self.networks.iter().find(|n| n.name == name)
    }

    /// Look up an instance by exact name.
    pub fn instance(&self, name: &str) -> Option<&Instance> {
        self.instances.iter().find(|i| i.name == name)
    }

    /// Look up a router by exact name.
    pub fn router(&self, name: &str) -> Option<&Router> {
        self.routers.iter().find(|r| r.name == name)
    }

    /// Declared network names in declaration order.
    pub fn network_names(&self) -> Vec<&str> {
        self.networks.iter().map(|n| n.name.as_str()).collect()
    }

    /// Every entity name across all categories.
    pub fn all_names(&self) -> BTreeSet<String> {
        self.instances
            .iter()
            .map(|i| i.name.clone())
            .chain(self.networks.iter().map(|n| n.name.clone()))
            .chain(self.routers.iter().map(|r| r.name.clone()))
            .collect()
    }

    /// Names declared more than once within the same category, tagged with
    /// the category they collide in.
    pub fn duplicate_names(&self) -> Vec<(ResourceCategory, String)> {
        let mut duplicates = Vec::new();
        collect_duplicates(
            ResourceCategory::Network,
            self.networks.iter().map(|n| n.name.as_str()),
            &mut duplicates,
        );
        collect_duplicates(
            ResourceCategory::Instance,
            self.instances.iter().map(|i| i.name.as_str()),
            &mut duplicates,
        );
        collect_duplicates(
            ResourceCategory::Router,
            self.routers.iter().map(|r| r.name.as_str()),
            &mut duplicates,
        );
        duplicates
    }

    /// Whether any instance declares a boot configuration.
    pub fn has_boot_configs(&self) -> bool {
        self.instances.iter().any(|i| i.cloud_init.is_some())
    }
}

fn collect_duplicates<'a>(
    category: ResourceCategory,
    names: impl Iterator<Item = &'a str>,
    out: &mut Vec<(ResourceCategory, String)>,
) {
    let mut seen = BTreeSet::new();
    let mut reported = BTreeSet::new();
    for name in names {
        if !seen.insert(name) && reported.insert(name) {
            out.push((category, name.to_string()));
        }
    }
}

/// Resource categories shared by validation, generation and consistency checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceCategory {
    Network,
    Instance,
    Router,
}

impl ResourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceCategory::Network => "network",
            ResourceCategory::Instance => "instance",
            ResourceCategory::Router => "router",
        }
    }

    pub fn all() -> [ResourceCategory; 3] {
        [
            ResourceCategory::Network,
            ResourceCategory::Instance,
            ResourceCategory::Router,
        ]
    }
}

impl std::fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A subnet. `gateway_ip = None` marks a transit network linking routers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    pub cidr: String,
    #[serde(default)]
    pub gateway_ip: Option<String>,
    #[serde(default = "default_true")]
    pub enable_dhcp: bool,
    /// DHCP allocation ranges.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pool: Vec<AddressPool>,
}

impl Network {
    pub fn new(name: impl Into<String>, cidr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cidr: cidr.into(),
            gateway_ip: None,
            enable_dhcp: true,
            pool: Vec::new(),
        }
    }

    pub fn with_gateway(mut self, gateway_ip: impl Into<String>) -> Self {
        self.gateway_ip = Some(gateway_ip.into());
        self
    }

    pub fn with_dhcp(mut self, enable_dhcp: bool) -> Self {
        self.enable_dhcp = enable_dhcp;
        self
    }

    pub fn with_pool(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.pool.push(AddressPool {
            start: start.into(),
            end: end.into(),
        });
        self
    }

    pub fn is_transit(&self) -> bool {
        self.gateway_ip.is_none()
    }
}

/// An inclusive address range handed out by DHCP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPool {
    pub start: String,
    pub end: String,
}

/// A network attachment of an instance or router interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "name", alias = "network_name")]
    pub network_name: String,
    pub ip: String,
}

impl Attachment {
    pub fn new(network_name: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            network_name: network_name.into(),
            ip: ip.into(),
        }
    }
}

/// Floating (public) address request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FloatingIp {
    /// `true` allocates a fresh address from the external pool.
    Enabled(bool),
    /// A specific address to associate.
    Address(String),
}

impl FloatingIp {
    pub fn is_requested(&self) -> bool {
        match self {
            FloatingIp::Enabled(enabled) => *enabled,
            FloatingIp::Address(_) => true,
        }
    }

    pub fn address(&self) -> Option<&str> {
        match self {
            FloatingIp::Address(addr) => Some(addr),
            FloatingIp::Enabled(_) => None,
        }
    }
}

/// A virtual machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub image: String,
    pub cpu: u32,
    /// Memory in GiB.
    pub ram: f64,
    /// Root disk in GB.
    pub disk: u32,
    pub networks: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypair: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub security_groups: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floating_ip: Option<FloatingIp>,
    /// Reference to a boot-configuration document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_init: Option<String>,
}

impl Instance {
    pub fn new(name: impl Into<String>, image: impl Into<String>, cpu: u32, ram: f64, disk: u32) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            cpu,
            ram,
            disk,
            networks: Vec::new(),
            keypair: None,
            security_groups: BTreeSet::new(),
            floating_ip: None,
            cloud_init: None,
        }
    }

    pub fn attach(mut self, network_name: impl Into<String>, ip: impl Into<String>) -> Self {
        self.networks.push(Attachment::new(network_name, ip));
        self
    }

    pub fn with_keypair(mut self, keypair: impl Into<String>) -> Self {
        self.keypair = Some(keypair.into());
        self
    }

    pub fn with_security_group(mut self, group: impl Into<String>) -> Self {
        self.security_groups.insert(group.into());
        self
    }

    pub fn with_floating_ip(mut self, floating_ip: FloatingIp) -> Self {
        self.floating_ip = Some(floating_ip);
        self
    }

    pub fn with_cloud_init(mut self, reference: impl Into<String>) -> Self {
        self.cloud_init = Some(reference.into());
        self
    }

    /// Memory requirement in MiB.
    pub fn ram_mib(&self) -> u64 {
        (self.ram * 1024.0).ceil() as u64
    }

    /// The first attachment, which carries the primary fixed IP.
    pub fn primary_attachment(&self) -> Option<&Attachment> {
        self.networks.first()
    }

    pub fn wants_floating_ip(&self) -> bool {
        self.floating_ip.as_ref().map_or(false, FloatingIp::is_requested)
    }
}

/// A router with interfaces and static routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Router {
    pub name: String,
    pub external: bool,
    pub networks: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<StaticRoute>,
}

impl Router {
    pub fn new(name: impl Into<String>, external: bool) -> Self {
        Self {
            name: name.into(),
            external,
            networks: Vec::new(),
            routes: Vec::new(),
        }
    }

    pub fn attach(mut self, network_name: impl Into<String>, ip: impl Into<String>) -> Self {
        self.networks.push(Attachment::new(network_name, ip));
        self
    }

    pub fn route(mut self, destination: impl Into<String>, nexthop: impl Into<String>) -> Self {
        self.routes.push(StaticRoute {
            destination: destination.into(),
            nexthop: nexthop.into(),
        });
        self
    }

    /// Interface IP on the given network, if attached.
    pub fn interface_ip(&self, network_name: &str) -> Option<&str> {
        self.networks
            .iter()
            .find(|a| a.network_name == network_name)
            .map(|a| a.ip.as_str())
    }
}

/// A static route installed on a router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRoute {
    #[serde(alias = "destination_cidr")]
    pub destination: String,
    pub nexthop: String,
}

/// Backend image and size class chosen for an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedInstance {
    pub instance_name: String,
    pub image_id: String,
    pub size_class: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_accepts_both_keys() {
        let a: Attachment = serde_json::from_str(r#"{"name": "web-net", "ip": "10.0.0.5"}"#).unwrap();
        let b: Attachment =
            serde_json::from_str(r#"{"network_name": "web-net", "ip": "10.0.0.5"}"#).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_floating_ip_forms() {
        let inst: Instance = serde_json::from_str(
            r#"{"name": "vm1", "image": "ubuntu", "cpu": 1, "ram": 1, "disk": 10,
                "networks": [], "floating_ip": "203.0.113.5"}"#,
        )
        .unwrap();
        assert_eq!(inst.floating_ip, Some(FloatingIp::Address("203.0.113.5".to_string())));
        assert!(inst.wants_floating_ip());

        let inst: Instance = serde_json::from_str(
            r#"{"name": "vm1", "image": "ubuntu", "cpu": 1, "ram": 1, "disk": 10,
                "networks": [], "floating_ip": false}"#,
        )
        .unwrap();
        assert!(!inst.wants_floating_ip());
    }

    #[test]
    fn test_transit_network() {
        let net: Network =
            serde_json::from_str(r#"{"name": "link", "cidr": "10.255.0.0/30", "gateway_ip": null}"#)
                .unwrap();
        assert!(net.is_transit());
        assert!(net.enable_dhcp);
    }

    #[test]
    fn test_duplicate_names_reported_once() {
        let topology = Topology::new()
            .with_network(Network::new("a", "10.0.0.0/24"))
            .with_network(Network::new("a", "10.0.1.0/24"))
            .with_network(Network::new("a", "10.0.2.0/24"))
            .with_instance(Instance::new("a", "ubuntu", 1, 1.0, 10));

        let duplicates = topology.duplicate_names();
        assert_eq!(duplicates, vec![(ResourceCategory::Network, "a".to_string())]);
    }

    #[test]
    fn test_ram_mib() {
        assert_eq!(Instance::new("vm", "img", 1, 0.5, 10).ram_mib(), 512);
        assert_eq!(Instance::new("vm", "img", 1, 2.0, 10).ram_mib(), 2048);
    }
}
