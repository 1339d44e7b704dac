//! Integration tests for matching, cloning and generation.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use proptest::prelude::*;
use tempfile::tempdir;
use walkdir::WalkDir;

use topo_iac::{
    driver_for, ArtifactGenerator, Backend, Catalog, CloneEngine, CloudConfigRenderer, CounterTokens,
    EnvironmentLayout, SeededTokens,
};
use topo_model::{FloatingIp, Instance, Network, Router, Topology};
use topo_validate::validate_logic;

fn single_vm() -> Topology {
    Topology::new()
        .with_network(Network::new("app-net", "192.168.10.0/24").with_gateway("192.168.10.1"))
        .with_instance(
            Instance::new("vm1", "ubuntu-22.04", 1, 1.0, 10)
                .attach("app-net", "192.168.10.10")
                .with_floating_ip(FloatingIp::Enabled(true)),
        )
        .with_router(Router::new("edge", true).attach("app-net", "192.168.10.1"))
}

fn two_tier() -> Topology {
    Topology::new()
        .with_network(Network::new("web-net", "192.168.10.0/24").with_gateway("192.168.10.1"))
        .with_network(Network::new("db-net", "192.168.20.0/24").with_gateway("192.168.20.1"))
        .with_instance(
            Instance::new("web-1", "ubuntu-22.04", 1, 1.5, 10)
                .attach("web-net", "192.168.10.10")
                .with_cloud_init("web"),
        )
        .with_instance(Instance::new("db-1", "ubuntu-20.04", 2, 4.0, 40).attach("db-net", "192.168.20.10"))
        .with_router(
            Router::new("edge", true)
                .attach("web-net", "192.168.10.1")
                .attach("db-net", "192.168.20.1"),
        )
}

/// Relative path and content of every file under `root`.
fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(root).unwrap().to_path_buf();
            (relative, fs::read(e.path()).unwrap())
        })
        .collect()
}

#[test]
fn test_scenario_d_three_clones() {
    let set = CloneEngine::new(SeededTokens::new(2024))
        .clone_topology(&single_vm(), 3)
        .unwrap();
    assert_eq!(set.len(), 3);

    let tokens: BTreeSet<&str> = set.copies.iter().filter_map(|c| c.token.as_deref()).collect();
    assert_eq!(tokens.len(), 3);

    for copy in &set.copies {
        let token = copy.token.as_deref().unwrap();
        assert_eq!(copy.topology.instances[0].name, format!("vm1_{}", token));
        let result = validate_logic(&copy.topology);
        assert!(result.valid, "{:?}", result.errors);
    }
    assert!(set.check_batch().is_empty());
}

#[test]
fn test_shared_clones_pass_logic_validation() {
    let set = CloneEngine::new(CounterTokens::default())
        .clone_for(&two_tier(), 4, Backend::Aws)
        .unwrap();
    for copy in &set.copies {
        let result = validate_logic(&copy.topology);
        assert!(result.valid, "{:?}", result.errors);
    }
    assert!(set.check_batch().is_empty());
}

#[test]
fn test_match_builtin_catalog() {
    let report = driver_for(Backend::OpenStack).match_resources(&two_tier(), &Catalog::builtin(Backend::OpenStack));
    assert!(report.ok, "{:?}", report.messages);
    assert_eq!(report.matches["web-1"].size_class, "m1.small");
    assert_eq!(report.matches["db-1"].size_class, "m1.medium");
    assert_eq!(report.matches["db-1"].image_id, "ubuntu-focal-server-cloudimg");
}

#[test]
fn test_generation_is_deterministic() {
    let userdata = tempdir().unwrap();
    fs::write(
        userdata.path().join("web.json"),
        r#"{"packages": ["nginx"], "runcmd": ["systemctl enable --now nginx"]}"#,
    )
    .unwrap();

    let topology = two_tier();
    let report = driver_for(Backend::OpenStack).match_resources(&topology, &Catalog::builtin(Backend::OpenStack));

    let run = |dir: &Path| {
        let set = CloneEngine::new(SeededTokens::new(7))
            .clone_for(&topology, 2, Backend::OpenStack)
            .unwrap();
        ArtifactGenerator::new(Backend::OpenStack)
            .with_boot_renderer(CloudConfigRenderer::new(userdata.path()))
            .generate_batch(&set, &report.matches, dir)
            .unwrap()
    };

    let first = tempdir().unwrap();
    let second = tempdir().unwrap();
    assert!(run(first.path()).is_success());
    assert!(run(second.path()).is_success());

    let a = snapshot(first.path());
    let b = snapshot(second.path());
    assert!(!a.is_empty());
    assert_eq!(a.keys().collect::<Vec<_>>(), b.keys().collect::<Vec<_>>());
    assert!(a == b, "generated trees differ");
}

#[test]
fn test_generated_environment_is_discoverable() {
    let dir = tempdir().unwrap();
    let topology = single_vm();
    let report = driver_for(Backend::Aws).match_resources(&topology, &Catalog::builtin(Backend::Aws));
    let result = ArtifactGenerator::new(Backend::Aws)
        .generate(&topology, &report.matches, dir.path())
        .unwrap();
    assert!(result.is_success());

    let layout = EnvironmentLayout::detect(dir.path()).unwrap();
    assert_eq!(layout.backend, Some(Backend::Aws));
    assert_eq!(layout.load_topology().unwrap(), topology);
    assert_eq!(layout.module_dirs.len(), 2);
}

proptest! {
    #[test]
    fn single_copy_is_identity(seed in any::<u64>()) {
        let set = CloneEngine::new(SeededTokens::new(seed))
            .clone_topology(&two_tier(), 1)
            .unwrap();
        prop_assert_eq!(&set.copies[0].topology, &two_tier());
    }

    #[test]
    fn clone_names_are_disjoint(seed in any::<u64>(), copies in 2usize..12) {
        let set = CloneEngine::new(SeededTokens::new(seed))
            .clone_topology(&two_tier(), copies)
            .unwrap();
        prop_assert_eq!(set.len(), copies);

        let mut seen = BTreeSet::new();
        for copy in &set.copies {
            for name in copy.topology.all_names() {
                prop_assert!(seen.insert(name.clone()), "name {} repeated", name);
            }
        }
    }
}
