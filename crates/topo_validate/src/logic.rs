//! Semantic validation of network topologies.
//!
//! Every check runs even when an earlier one failed, so a single pass
//! reports all problems. A network whose CIDR does not parse is reported
//! once and then left out of every check that needs its address range.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use tracing::debug;

use topo_model::{net, Attachment, FloatingIp, Topology};

use crate::fuzzy;
use crate::result::ValidationResult;

/// Upper bound on router-to-router hops explored when resolving a static
/// route's next hop. Each router is also visited at most once, so cyclic
/// router graphs terminate.
pub const MAX_ROUTE_HOPS: usize = 8;

/// Validator for CIDR arithmetic, references, gateways and routes.
pub struct NetworkLogicValidator;

impl NetworkLogicValidator {
    pub fn validate(topology: &Topology) -> ValidationResult {
        let mut pass = LogicPass::new(topology);
        pass.check_unique_names();
        pass.check_networks();
        pass.check_overlaps();
        pass.check_instances();
        pass.check_router_interfaces();
        pass.check_gateways_assigned();
        pass.check_routes();

        let result = pass.result;
        debug!(
            "Logic validation finished: {} errors, {} warnings",
            result.errors.len(),
            result.warnings.len()
        );
        result
    }
}

struct LogicPass<'a> {
    topology: &'a Topology,
    /// Declared network names in declaration order.
    declared: Vec<&'a str>,
    /// Parsed ranges of well-formed networks. First declaration wins.
    subnets: BTreeMap<&'a str, Ipv4Net>,
    /// Valid, in-range gateway addresses.
    gateways: BTreeMap<&'a str, Ipv4Addr>,
    /// Owner of each address claimed on each network.
    claimed: BTreeMap<(&'a str, Ipv4Addr), String>,
    result: ValidationResult,
}

impl<'a> LogicPass<'a> {
    fn new(topology: &'a Topology) -> Self {
        Self {
            topology,
            declared: topology.network_names(),
            subnets: BTreeMap::new(),
            gateways: BTreeMap::new(),
            claimed: BTreeMap::new(),
            result: ValidationResult::new(),
        }
    }

    fn check_unique_names(&mut self) {
        for (category, name) in self.topology.duplicate_names() {
            self.result
                .add_error(format!("Duplicate {} name '{}'", category, name));
        }
    }

    fn check_networks(&mut self) {
        let topology = self.topology;
        for network in &topology.networks {
            let subnet = match net::parse_cidr(&network.cidr) {
                Ok(subnet) => subnet,
                Err(e) => {
                    self.result
                        .add_error(format!("Network '{}': {}", network.name, e));
                    continue;
                }
            };
            if self.subnets.contains_key(network.name.as_str()) {
                continue;
            }
            self.subnets.insert(network.name.as_str(), subnet);

            if let Some(gateway) = &network.gateway_ip {
                match net::parse_ipv4(gateway) {
                    Ok(addr) if subnet.contains(&addr) => {
                        self.gateways.insert(network.name.as_str(), addr);
                    }
                    Ok(_) => self.result.add_error(format!(
                        "Network '{}': gateway '{}' is outside CIDR '{}'",
                        network.name, gateway, network.cidr
                    )),
                    Err(e) => self
                        .result
                        .add_error(format!("Network '{}': gateway {}", network.name, e)),
                }
            }

            for pool in &network.pool {
                let bounds = (net::parse_ipv4(&pool.start), net::parse_ipv4(&pool.end));
                match bounds {
                    (Ok(start), Ok(end)) => {
                        if !subnet.contains(&start) || !subnet.contains(&end) {
                            self.result.add_error(format!(
                                "Network '{}': pool {}-{} is outside CIDR '{}'",
                                network.name, pool.start, pool.end, network.cidr
                            ));
                        } else if start > end {
                            self.result.add_error(format!(
                                "Network '{}': pool start {} is after end {}",
                                network.name, pool.start, pool.end
                            ));
                        }
                    }
                    (Err(e), _) | (_, Err(e)) => self
                        .result
                        .add_error(format!("Network '{}': pool {}", network.name, e)),
                }
            }
        }
    }

    fn check_overlaps(&mut self) {
        let mut seen = BTreeSet::new();
        let ordered: Vec<(&str, Ipv4Net)> = self
            .declared
            .iter()
            .filter(|name| seen.insert(**name))
            .filter_map(|name| self.subnets.get(name).map(|subnet| (*name, *subnet)))
            .collect();

        for (i, (name_a, a)) in ordered.iter().enumerate() {
            for (name_b, b) in &ordered[i + 1..] {
                if net::overlaps(a, b) {
                    self.result.add_warning(format!(
                        "Networks '{}' ({}) and '{}' ({}) overlap",
                        name_a, a, name_b, b
                    ));
                }
            }
        }
    }

    fn check_instances(&mut self) {
        let topology = self.topology;
        let external = self.external_networks();

        for instance in &topology.instances {
            let owner = format!("Instance '{}'", instance.name);
            if instance.networks.is_empty() {
                self.result
                    .add_warning(format!("{} has no network attachments", owner));
            }
            for attachment in &instance.networks {
                self.check_attachment(&owner, attachment, false);
            }

            match &instance.floating_ip {
                Some(FloatingIp::Address(addr)) => {
                    if let Err(e) = net::parse_ipv4(addr) {
                        self.result
                            .add_error(format!("{}: floating IP {}", owner, e));
                    }
                }
                Some(FloatingIp::Enabled(_)) | None => {}
            }
            if instance.wants_floating_ip()
                && !instance
                    .networks
                    .iter()
                    .any(|a| external.contains(a.network_name.as_str()))
            {
                self.result.add_warning(format!(
                    "{} requests a floating IP but none of its networks is attached to an external router",
                    owner
                ));
            }
        }
    }

    fn check_router_interfaces(&mut self) {
        let topology = self.topology;
        for router in &topology.routers {
            let owner = format!("Router '{}'", router.name);
            for attachment in &router.networks {
                self.check_attachment(&owner, attachment, true);
            }
        }
    }

    /// Reference, range, gateway and duplicate checks for one attachment.
    fn check_attachment(&mut self, owner: &str, attachment: &'a Attachment, is_router: bool) {
        let network_name = attachment.network_name.as_str();
        if !self.declared.contains(&network_name) {
            let suggestion = fuzzy::suggest(network_name, self.declared.iter().copied());
            self.result.add_error(format!(
                "{}: Network '{}' does not exist{}",
                owner,
                network_name,
                fuzzy::hint(suggestion)
            ));
            return;
        }
        let Some(subnet) = self.subnets.get(network_name).copied() else {
            return;
        };

        let addr = match net::parse_ipv4(&attachment.ip) {
            Ok(addr) => addr,
            Err(e) => {
                self.result
                    .add_error(format!("{}: {} on network '{}'", owner, e, network_name));
                return;
            }
        };
        if !subnet.contains(&addr) {
            self.result.add_error(format!(
                "{}: IP '{}' is outside network '{}' CIDR '{}'",
                owner, attachment.ip, network_name, subnet
            ));
            return;
        }
        if net::is_reserved_host(&subnet, addr) {
            self.result.add_warning(format!(
                "{}: IP '{}' is the network or broadcast address of '{}'",
                owner, attachment.ip, network_name
            ));
        }
        if !is_router && self.gateways.get(network_name) == Some(&addr) {
            self.result.add_error(format!(
                "{}: IP '{}' is the gateway of network '{}'",
                owner, attachment.ip, network_name
            ));
        }

        match self.claimed.get(&(network_name, addr)) {
            Some(first) => self.result.add_error(format!(
                "Duplicate IP '{}' on network '{}': {} and {}",
                addr, network_name, first, owner
            )),
            None => {
                self.claimed.insert((network_name, addr), owner.to_string());
            }
        }
    }

    fn check_gateways_assigned(&mut self) {
        for (network_name, gateway) in &self.gateways {
            let interfaces: Vec<(&str, &str)> = self
                .topology
                .routers
                .iter()
                .filter_map(|r| r.interface_ip(network_name).map(|ip| (r.name.as_str(), ip)))
                .collect();
            if interfaces.is_empty() {
                continue;
            }
            let assigned = interfaces
                .iter()
                .any(|(_, ip)| net::parse_ipv4(ip).map_or(false, |addr| addr == *gateway));
            if !assigned {
                let found = interfaces
                    .iter()
                    .map(|(router, ip)| format!("{}={}", router, ip))
                    .collect::<Vec<_>>()
                    .join(", ");
                self.result.add_error(format!(
                    "Network '{}': gateway '{}' does not match any attached router interface ({})",
                    network_name, gateway, found
                ));
            }
        }
    }

    fn check_routes(&mut self) {
        let topology = self.topology;
        for (index, router) in topology.routers.iter().enumerate() {
            for route in &router.routes {
                let owner = format!("Router '{}'", router.name);
                if let Err(e) = net::parse_cidr(&route.destination) {
                    self.result
                        .add_error(format!("{}: route destination {}", owner, e));
                }
                let nexthop = match net::parse_ipv4(&route.nexthop) {
                    Ok(addr) => addr,
                    Err(e) => {
                        self.result
                            .add_error(format!("{}: route next hop {}", owner, e));
                        continue;
                    }
                };
                if !self.nexthop_reachable(index, nexthop) {
                    self.result.add_error(format!(
                        "{}: route to '{}' has unreachable next hop '{}'",
                        owner, route.destination, route.nexthop
                    ));
                }
            }
        }
    }

    /// Breadth-first search from `start` across routers that share transit
    /// networks, looking for one attached to a subnet containing `nexthop`.
    fn nexthop_reachable(&self, start: usize, nexthop: Ipv4Addr) -> bool {
        let routers = &self.topology.routers;
        let mut visited = BTreeSet::from([start]);
        let mut queue = VecDeque::from([(start, 0usize)]);

        while let Some((index, hops)) = queue.pop_front() {
            let attached: Vec<&str> = routers[index]
                .networks
                .iter()
                .map(|a| a.network_name.as_str())
                .filter(|name| self.subnets.contains_key(name))
                .collect();

            let direct = attached.iter().any(|name| {
                self.subnets
                    .get(name)
                    .map_or(false, |subnet| subnet.contains(&nexthop))
            });
            if direct {
                return true;
            }
            if hops >= MAX_ROUTE_HOPS {
                continue;
            }

            for name in attached.iter().filter(|name| self.is_transit(name)) {
                for (peer, router) in routers.iter().enumerate() {
                    if router.interface_ip(name).is_some() && visited.insert(peer) {
                        queue.push_back((peer, hops + 1));
                    }
                }
            }
        }
        false
    }

    fn is_transit(&self, network_name: &str) -> bool {
        self.topology
            .network(network_name)
            .map_or(false, |n| n.is_transit())
    }

    fn external_networks(&self) -> BTreeSet<&'a str> {
        self.topology
            .routers
            .iter()
            .filter(|r| r.external)
            .flat_map(|r| r.networks.iter().map(|a| a.network_name.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topo_model::{Instance, Network, Router};

    fn web_topology(ip: &str) -> Topology {
        Topology::new()
            .with_network(Network::new("web-net", "192.168.10.0/24").with_gateway("192.168.10.1"))
            .with_instance(Instance::new("web-1", "ubuntu-22.04", 1, 1.0, 10).attach("web-net", ip))
    }

    #[test]
    fn test_valid_topology_passes() {
        let result = NetworkLogicValidator::validate(&web_topology("192.168.10.10"));
        assert!(result.valid, "unexpected errors: {:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_out_of_subnet_ip_is_single_error() {
        let result = NetworkLogicValidator::validate(&web_topology("192.168.20.10"));
        assert_eq!(
            result.errors,
            vec!["Instance 'web-1': IP '192.168.20.10' is outside network 'web-net' CIDR '192.168.10.0/24'"
                .to_string()]
        );
    }

    #[test]
    fn test_malformed_cidr_excluded_downstream() {
        let topology = Topology::new()
            .with_network(Network::new("bad", "192.168.10.0/33").with_gateway("10.9.9.9"))
            .with_instance(Instance::new("vm", "img", 1, 1.0, 10).attach("bad", "172.16.0.1"));
        let result = NetworkLogicValidator::validate(&topology);
        assert_eq!(
            result.errors,
            vec!["Network 'bad': '192.168.10.0/33' is not a valid IPv4 CIDR".to_string()]
        );
    }

    #[test]
    fn test_gateway_outside_subnet() {
        let topology = Topology::new()
            .with_network(Network::new("n", "10.0.0.0/24").with_gateway("10.0.1.1"));
        let result = NetworkLogicValidator::validate(&topology);
        assert_eq!(
            result.errors,
            vec!["Network 'n': gateway '10.0.1.1' is outside CIDR '10.0.0.0/24'".to_string()]
        );
    }

    #[test]
    fn test_transit_network_skips_gateway_checks() {
        let topology = Topology::new()
            .with_network(Network::new("link", "10.255.0.0/30"))
            .with_router(Router::new("r1", false).attach("link", "10.255.0.1"))
            .with_router(Router::new("r2", false).attach("link", "10.255.0.2"));
        assert!(NetworkLogicValidator::validate(&topology).valid);
    }

    #[test]
    fn test_router_instance_ip_conflict() {
        let topology = web_topology("192.168.10.10")
            .with_router(Router::new("edge", true).attach("web-net", "192.168.10.10"));
        let result = NetworkLogicValidator::validate(&topology);
        assert!(result
            .errors
            .contains(&"Duplicate IP '192.168.10.10' on network 'web-net': Instance 'web-1' and Router 'edge'".to_string()));
    }

    #[test]
    fn test_router_must_hold_gateway() {
        let topology = web_topology("192.168.10.10")
            .with_router(Router::new("edge", true).attach("web-net", "192.168.10.254"));
        let result = NetworkLogicValidator::validate(&topology);
        assert_eq!(
            result.errors,
            vec!["Network 'web-net': gateway '192.168.10.1' does not match any attached router interface (edge=192.168.10.254)".to_string()]
        );
    }

    #[test]
    fn test_instance_on_gateway_address() {
        let result = NetworkLogicValidator::validate(&web_topology("192.168.10.1"));
        assert_eq!(
            result.errors,
            vec!["Instance 'web-1': IP '192.168.10.1' is the gateway of network 'web-net'".to_string()]
        );
    }

    #[test]
    fn test_pool_bounds() {
        let topology = Topology::new().with_network(
            Network::new("n", "10.0.0.0/24")
                .with_gateway("10.0.0.1")
                .with_pool("10.0.0.200", "10.0.0.100")
                .with_pool("10.0.0.10", "10.0.1.10"),
        );
        let result = NetworkLogicValidator::validate(&topology);
        assert_eq!(
            result.errors,
            vec![
                "Network 'n': pool start 10.0.0.200 is after end 10.0.0.100".to_string(),
                "Network 'n': pool 10.0.0.10-10.0.1.10 is outside CIDR '10.0.0.0/24'".to_string(),
            ]
        );
    }

    #[test]
    fn test_overlap_and_reserved_host_warnings() {
        let topology = Topology::new()
            .with_network(Network::new("a", "10.0.0.0/16").with_gateway("10.0.0.1"))
            .with_network(Network::new("b", "10.0.5.0/24").with_gateway("10.0.5.1"))
            .with_instance(Instance::new("vm", "img", 1, 1.0, 10).attach("b", "10.0.5.255"));
        let result = NetworkLogicValidator::validate(&topology);
        assert!(result.valid);
        assert_eq!(
            result.warnings,
            vec![
                "Networks 'a' (10.0.0.0/16) and 'b' (10.0.5.0/24) overlap".to_string(),
                "Instance 'vm': IP '10.0.5.255' is the network or broadcast address of 'b'".to_string(),
            ]
        );
    }

    #[test]
    fn test_floating_ip_without_external_router() {
        let topology = Topology::new()
            .with_network(Network::new("n", "10.0.0.0/24").with_gateway("10.0.0.1"))
            .with_instance(
                Instance::new("vm", "img", 1, 1.0, 10)
                    .attach("n", "10.0.0.5")
                    .with_floating_ip(FloatingIp::Enabled(true)),
            );
        let result = NetworkLogicValidator::validate(&topology);
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);

        let routed = topology.with_router(Router::new("edge", true).attach("n", "10.0.0.1"));
        assert!(NetworkLogicValidator::validate(&routed).warnings.is_empty());
    }

    #[test]
    fn test_duplicate_names() {
        let topology = Topology::new()
            .with_network(Network::new("n", "10.0.0.0/24"))
            .with_network(Network::new("n", "10.0.1.0/24"));
        let result = NetworkLogicValidator::validate(&topology);
        assert_eq!(result.errors[0], "Duplicate network name 'n'");
    }

    fn routed_chain() -> Topology {
        Topology::new()
            .with_network(Network::new("lan-a", "192.168.1.0/24").with_gateway("192.168.1.1"))
            .with_network(Network::new("link", "10.255.0.0/30"))
            .with_network(Network::new("lan-b", "192.168.2.0/24").with_gateway("192.168.2.1"))
            .with_router(
                Router::new("r1", true)
                    .attach("lan-a", "192.168.1.1")
                    .attach("link", "10.255.0.1")
                    .route("192.168.2.0/24", "10.255.0.2"),
            )
            .with_router(
                Router::new("r2", false)
                    .attach("lan-b", "192.168.2.1")
                    .attach("link", "10.255.0.2")
                    .route("192.168.1.0/24", "10.255.0.1"),
            )
    }

    #[test]
    fn test_routes_through_transit_are_reachable() {
        let result = NetworkLogicValidator::validate(&routed_chain());
        assert!(result.valid, "unexpected errors: {:?}", result.errors);
    }

    #[test]
    fn test_unreachable_next_hop() {
        let topology = routed_chain().with_router(
            Router::new("r3", false)
                .attach("lan-b", "192.168.2.3")
                .route("0.0.0.0/0", "172.16.0.1"),
        );
        let result = NetworkLogicValidator::validate(&topology);
        assert_eq!(
            result.errors,
            vec!["Router 'r3': route to '0.0.0.0/0' has unreachable next hop '172.16.0.1'".to_string()]
        );
    }

    #[test]
    fn test_next_hop_via_peer_router() {
        // r1 reaches lan-b only through r2 on the transit link.
        let mut topology = routed_chain();
        topology.routers[0].routes.push(topo_model::StaticRoute {
            destination: "172.20.0.0/16".to_string(),
            nexthop: "192.168.2.50".to_string(),
        });
        let result = NetworkLogicValidator::validate(&topology);
        assert!(result.valid, "unexpected errors: {:?}", result.errors);
    }

    #[test]
    fn test_hop_limit_bounds_search() {
        // A chain of routers joined by transit links, longer than the hop limit.
        let count = MAX_ROUTE_HOPS + 2;
        let mut topology = Topology::new();
        for i in 0..count {
            topology = topology.with_network(Network::new(format!("t{}", i), format!("10.{}.0.0/30", i)));
        }
        topology = topology.with_network(Network::new("far", "172.16.0.0/24"));
        for i in 0..count {
            let mut router = Router::new(format!("r{}", i), false).attach(format!("t{}", i), format!("10.{}.0.1", i));
            if i + 1 < count {
                router = router.attach(format!("t{}", i + 1), format!("10.{}.0.2", i + 1));
            } else {
                router = router.attach("far", "172.16.0.1");
            }
            topology = topology.with_router(router);
        }
        topology.routers[0].routes.push(topo_model::StaticRoute {
            destination: "0.0.0.0/0".to_string(),
            nexthop: "172.16.0.9".to_string(),
        });

        let result = NetworkLogicValidator::validate(&topology);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("unreachable next hop '172.16.0.9'")));
    }
}
