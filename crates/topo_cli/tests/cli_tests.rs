//! End-to-end tests of the topoforge binary.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::{json, Value};
use tempfile::tempdir;

fn topology() -> Value {
    json!({
        "networks": [
            {"name": "web-net", "cidr": "192.168.10.0/24", "gateway_ip": "192.168.10.1", "enable_dhcp": true}
        ],
        "instances": [{
            "name": "web-1",
            "image": "ubuntu-22.04",
            "cpu": 1,
            "ram": 1,
            "disk": 10,
            "networks": [{"name": "web-net", "ip": "192.168.10.10"}]
        }],
        "routers": []
    })
}

fn write_topology(dir: &Path, document: &Value) -> String {
    let path = dir.join("topology.json");
    fs::write(&path, serde_json::to_string_pretty(document).unwrap()).unwrap();
    path.to_string_lossy().into_owned()
}

fn topoforge(args: &[&str]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_topoforge"));
    for var in [
        "RUST_LOG",
        "TOPOFORGE_OUTPUT_DIR",
        "TOPOFORGE_CATALOG",
        "TOPOFORGE_USERDATA_DIR",
        "TOPOFORGE_SEED",
        "TOPOFORGE_SUPER_BLOCK",
    ] {
        command.env_remove(var);
    }
    command.args(args).output().unwrap()
}

fn environments(project: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(project)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().join("main.tf").is_file())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_validate_exit_codes() {
    let dir = tempdir().unwrap();
    let path = write_topology(dir.path(), &topology());
    let output = topoforge(&["validate", "--topology", &path]);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Network logic validation passed"));

    let mut broken = topology();
    broken["instances"][0]["networks"][0]["ip"] = json!("192.168.20.10");
    let path = write_topology(dir.path(), &broken);
    let output = topoforge(&["validate", "--topology", &path, "--json"]);
    assert_eq!(output.status.code(), Some(3));

    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["logic"]["valid"], json!(false));
}

#[test]
fn test_missing_topology_is_an_argument_error() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.json");
    let output = topoforge(&["validate", "--topology", &missing.to_string_lossy()]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_generate_openstack_copies() {
    let dir = tempdir().unwrap();
    let path = write_topology(dir.path(), &topology());
    let project = dir.path().join("projects");

    let output = topoforge(&[
        "generate",
        "openstack",
        "2",
        "--topology",
        &path,
        "--output",
        &project.to_string_lossy(),
        "--seed",
        "11",
    ]);
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));

    let names = environments(&project);
    assert_eq!(names.len(), 2);
    assert!(names.iter().all(|n| n.starts_with("openstack_")));
}

#[test]
fn test_generate_aws_writes_shared_network() {
    let dir = tempdir().unwrap();
    let path = write_topology(dir.path(), &topology());
    let project = dir.path().join("projects");

    let output = topoforge(&[
        "generate",
        "aws",
        "2",
        "--topology",
        &path,
        "--output",
        &project.to_string_lossy(),
        "--seed",
        "5",
    ]);
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(environments(&project).contains(&"00-shared-network".to_string()));
    assert_eq!(environments(&project).len(), 3);
}

#[test]
fn test_generate_unknown_image_is_a_matching_failure() {
    let dir = tempdir().unwrap();
    let mut document = topology();
    document["instances"][0]["image"] = json!("ubuntu-22.4");
    let path = write_topology(dir.path(), &document);

    let output = topoforge(&[
        "generate",
        "openstack",
        "1",
        "--topology",
        &path,
        "--output",
        &dir.path().join("out").to_string_lossy(),
    ]);
    assert_eq!(output.status.code(), Some(4));
    assert!(String::from_utf8_lossy(&output.stdout).contains("ubuntu-22.04"));
    assert!(!dir.path().join("out").exists());
}

#[test]
fn test_check_reports_drift() {
    let dir = tempdir().unwrap();
    let path = write_topology(dir.path(), &topology());
    let project = dir.path().join("projects");
    let output = topoforge(&[
        "generate",
        "openstack",
        "1",
        "--topology",
        &path,
        "--output",
        &project.to_string_lossy(),
    ]);
    assert_eq!(output.status.code(), Some(0));

    let env_dir = project.join("openstack");
    let state = dir.path().join("state.json");
    fs::write(
        &state,
        json!({
            "networks": [{"name": "", "cidr": "192.168.10.0/24"}],
            "instances": [{"name": "web-1", "addresses": ["192.168.10.10"]}]
        })
        .to_string(),
    )
    .unwrap();
    let output = topoforge(&[
        "check",
        &env_dir.to_string_lossy(),
        "--state",
        &state.to_string_lossy(),
        "--json",
    ]);
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stdout));
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], json!("CONSISTENT"));

    fs::write(
        &state,
        json!({"networks": [{"name": "web-net", "cidr": "192.168.99.0/24"}]}).to_string(),
    )
    .unwrap();
    let output = topoforge(&["check", &env_dir.to_string_lossy(), "--state", &state.to_string_lossy()]);
    assert_eq!(output.status.code(), Some(6));
}
