//! Integration tests for consistency checks against generated environments.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use proptest::prelude::*;
use serde_json::{json, Value};
use tempfile::tempdir;

use topo_audit::{audit_batch, check, CategoryStatus, ConsistencyChecker, DeployedState, OverallStatus};
use topo_iac::{driver_for, ArtifactGenerator, Backend, Catalog, CloneEngine, CounterTokens};
use topo_model::{Instance, Network, ResourceCategory, Router, Topology};

fn topology() -> Topology {
    Topology::new()
        .with_network(Network::new("core-net", "10.0.0.0/24").with_gateway("10.0.0.1"))
        .with_instance(Instance::new("app", "ubuntu-22.04", 1, 1.0, 10).attach("core-net", "10.0.0.10"))
        .with_router(Router::new("edge", true).attach("core-net", "10.0.0.1"))
}

fn resource(kind: &str, name: &str, instances: Vec<Value>) -> Value {
    json!({"mode": "managed", "type": kind, "name": name, "instances": instances})
}

fn write_tfstate(dir: &Path, resources: Vec<Value>) {
    let state = json!({"version": 4, "resources": resources});
    fs::write(dir.join("terraform.tfstate"), serde_json::to_string_pretty(&state).unwrap()).unwrap();
}

#[test]
fn test_scenario_e_unnamed_network_matches_by_cidr() {
    let topology = Topology::new().with_network(Network::new("core-net", "10.0.0.0/24"));
    let state = DeployedState::from_document(&json!({
        "networks": [{"name": "", "cidr": "10.0.0.0/24"}],
        "instances": [],
        "routers": []
    }))
    .unwrap();

    let report = check(&topology, &state);
    let networks = report.category(ResourceCategory::Network).unwrap();
    assert_eq!(networks.status, CategoryStatus::Pass);
    assert_eq!(networks.pairs[0].declared, "core-net");
    assert_eq!(networks.pairs[0].reported, "(unnamed 10.0.0.0/24)");
}

#[test]
fn test_check_generated_openstack_environment() {
    let dir = tempdir().unwrap();
    let topology = topology();
    let report = driver_for(Backend::OpenStack).match_resources(&topology, &Catalog::builtin(Backend::OpenStack));
    ArtifactGenerator::new(Backend::OpenStack)
        .generate(&topology, &report.matches, dir.path())
        .unwrap();

    write_tfstate(
        dir.path(),
        vec![
            resource(
                "openstack_networking_subnet_v2",
                "this",
                vec![json!({"index_key": "core-net", "attributes": {"name": "core-net", "cidr": "10.0.0.0/24", "gateway_ip": "10.0.0.1"}})],
            ),
            resource(
                "openstack_compute_instance_v2",
                "this",
                vec![json!({"attributes": {"name": "app", "image_id": "ubuntu-jammy-server-cloudimg", "flavor_name": "m1.tiny",
                                           "network": [{"fixed_ip_v4": "10.0.0.10"}]}})],
            ),
            resource(
                "openstack_networking_router_v2",
                "this",
                vec![json!({"index_key": "edge", "attributes": {"name": "edge"}})],
            ),
        ],
    );

    let consistent = ConsistencyChecker::new()
        .check_environment(dir.path(), None)
        .unwrap();
    assert_eq!(consistent.status, OverallStatus::Consistent, "{}", consistent.summary);

    // The catalog picks m1.small for 1 GiB; the deployment reports m1.tiny.
    let drift = ConsistencyChecker::new()
        .with_matches(&report.matches)
        .check_environment(dir.path(), None)
        .unwrap();
    assert_eq!(drift.status, OverallStatus::Inconsistent);
    let instances = drift.category(ResourceCategory::Instance).unwrap();
    assert_eq!(instances.mismatches.len(), 1);
    assert_eq!(instances.mismatches[0].expected, "m1.small");
}

#[test]
fn test_aws_copy_reads_shared_state() {
    let project = tempdir().unwrap();
    let topology = topology();
    let report = driver_for(Backend::Aws).match_resources(&topology, &Catalog::builtin(Backend::Aws));
    let set = CloneEngine::new(CounterTokens::default())
        .clone_for(&topology, 2, Backend::Aws)
        .unwrap();
    ArtifactGenerator::new(Backend::Aws)
        .generate_batch(&set, &report.matches, project.path())
        .unwrap();

    let subnets: Vec<Value> = set
        .copies
        .iter()
        .map(|c| {
            let network = &c.topology.networks[0];
            json!({"index_key": network.name, "attributes": {"cidr_block": network.cidr, "tags": {"Name": network.name}}})
        })
        .collect();
    let tables: Vec<Value> = set
        .copies
        .iter()
        .map(|c| json!({"index_key": c.topology.routers[0].name, "attributes": {"tags": {"Name": c.topology.routers[0].name}}}))
        .collect();
    write_tfstate(
        &project.path().join("00-shared-network"),
        vec![
            resource("aws_subnet", "this", subnets),
            resource("aws_subnet", "public", vec![json!({"attributes": {"cidr_block": "10.0.3.0/24"}})]),
            resource("aws_route_table", "this", tables),
        ],
    );

    let copy = &set.copies[1];
    let copy_dir = project.path().join("aws_c02");
    write_tfstate(
        &copy_dir,
        vec![resource(
            "aws_instance",
            "this",
            vec![json!({"attributes": {"tags": {"Name": copy.topology.instances[0].name},
                                       "private_ip": copy.topology.instances[0].networks[0].ip}})],
        )],
    );

    let result = ConsistencyChecker::new()
        .check_environment(&copy_dir, None)
        .unwrap();
    assert!(result.is_consistent(), "{}", result.summary);
    assert_eq!(result.category(ResourceCategory::Network).unwrap().actual.len(), 1);
}

#[test]
fn test_batch_audit_over_generated_copies() {
    let project = tempdir().unwrap();
    let set = CloneEngine::new(CounterTokens::default())
        .clone_for(&topology(), 2, Backend::OpenStack)
        .unwrap();
    let matches: BTreeMap<_, _> = driver_for(Backend::OpenStack)
        .match_resources(&topology(), &Catalog::builtin(Backend::OpenStack))
        .matches;
    ArtifactGenerator::new(Backend::OpenStack)
        .generate_batch(&set, &matches, project.path())
        .unwrap();

    for (copy, instance_count) in set.copies.iter().zip([1usize, 0]) {
        let instances: Vec<Value> = (0..instance_count)
            .map(|_| json!({"attributes": {"name": copy.topology.instances[0].name}}))
            .collect();
        write_tfstate(
            &project.path().join(copy.dir_name(Backend::OpenStack)),
            vec![resource("openstack_compute_instance_v2", "this", instances)],
        );
    }

    let audit = audit_batch(project.path()).unwrap();
    assert_eq!(audit.copies.len(), 2);
    assert_eq!(audit.problems.len(), 1);
    assert!(audit.problems[0].contains("0 instance(s)"));
}

proptest! {
    #[test]
    fn network_matches_by_cidr_whatever_its_name(name in "[a-z0-9-]{0,12}", third in 0u8..=255) {
        let cidr = format!("192.168.{}.0/24", third);
        let topology = Topology::new().with_network(Network::new("declared", cidr.clone()));
        let state = DeployedState::from_document(&json!({"networks": [{"name": name, "cidr": cidr}]})).unwrap();

        let report = check(&topology, &state);
        prop_assert_eq!(report.category(ResourceCategory::Network).unwrap().status, CategoryStatus::Pass);
    }
}
