//! Terraform artifact generation.
//!
//! An environment directory holds a root module (`main.tf`, `variables.tf`,
//! `outputs.tf`), a copy of the topology it was generated from, the
//! `network` and `instance` sub-modules, and any rendered boot configs.
//! Output depends only on the inputs, so two runs over the same topology
//! and matches produce byte-identical trees.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use topo_model::{MatchedInstance, Topology, TopologyWriter};

use crate::backend::{Backend, ProviderSettings};
use crate::bootconfig::BootConfigRenderer;
use crate::clone::{AddressPlan, CloneEngine, CloneSet, CounterTokens};
use crate::driver::{
    driver_for, BackendDriver, InstanceRequest, ModuleFiles, NetworkLayout, NetworkSource, SHARED_NETWORK_DIR,
};
use crate::error::IacResult;
use crate::hcl;

/// Copy of the topology kept next to the generated modules.
pub const TOPOLOGY_FILE: &str = "topology.json";

const GITIGNORE: &str = r#"# Terraform working files
**/.terraform/*
.terraform.lock.hcl

# State stays local to the environment
*.tfstate
*.tfstate.*

crash.log
crash.*.log
*.tfvars
*.tfvars.json
"#;

/// Outcome of generating one environment directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationResult {
    pub output_dir: PathBuf,
    /// Sub-module directories written.
    pub module_paths: Vec<PathBuf>,
    /// Files written, relative to `output_dir`, sorted.
    pub files: Vec<PathBuf>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl GenerationResult {
    fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Outcome of generating a clone batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResult {
    /// The shared network environment, for shared-address-space backends.
    pub shared: Option<GenerationResult>,
    pub environments: Vec<GenerationResult>,
}

impl BatchResult {
    pub fn results(&self) -> impl Iterator<Item = &GenerationResult> {
        self.shared.iter().chain(self.environments.iter())
    }

    pub fn is_success(&self) -> bool {
        self.results().all(GenerationResult::is_success)
    }

    pub fn errors(&self) -> Vec<&str> {
        self.results()
            .flat_map(|r| r.errors.iter().map(String::as_str))
            .collect()
    }

    pub fn warnings(&self) -> Vec<&str> {
        self.results()
            .flat_map(|r| r.warnings.iter().map(String::as_str))
            .collect()
    }
}

/// One environment to write.
struct Environment<'a> {
    name: &'a str,
    topology: &'a Topology,
    matches: &'a BTreeMap<String, MatchedInstance>,
    /// `Some` when this environment creates its own network module.
    network: Option<NetworkPart<'a>>,
    source: NetworkSource,
}

struct NetworkPart<'a> {
    plan: Option<&'a AddressPlan>,
    bastion: Option<&'a MatchedInstance>,
}

/// Writes Terraform environments for one backend.
pub struct ArtifactGenerator {
    driver: Box<dyn BackendDriver>,
    settings: ProviderSettings,
    boot: Option<Box<dyn BootConfigRenderer>>,
}

impl ArtifactGenerator {
    pub fn new(backend: Backend) -> Self {
        Self {
            driver: driver_for(backend),
            settings: ProviderSettings::new(backend),
            boot: None,
        }
    }

    pub fn with_settings(mut self, settings: ProviderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_boot_renderer(mut self, renderer: impl BootConfigRenderer + 'static) -> Self {
        self.boot = Some(Box::new(renderer));
        self
    }

    pub fn backend(&self) -> Backend {
        self.driver.backend()
    }

    pub fn driver(&self) -> &dyn BackendDriver {
        self.driver.as_ref()
    }

    /// Generate one self-contained environment into `output_dir`.
    pub fn generate(
        &self,
        topology: &Topology,
        matches: &BTreeMap<String, MatchedInstance>,
        output_dir: &Path,
    ) -> IacResult<GenerationResult> {
        let set = if self.driver.requires_shared_address_space() {
            Some(CloneEngine::new(CounterTokens::default()).clone_for(topology, 1, self.backend())?)
        } else {
            None
        };
        let plan = set.as_ref().and_then(|s| s.plan.as_ref());

        self.write_environment(
            &Environment {
                name: self.backend().as_str(),
                topology,
                matches,
                network: Some(NetworkPart {
                    plan,
                    bastion: None,
                }),
                source: NetworkSource::Module,
            },
            output_dir,
        )
    }

    /// Generate every copy of a clone batch under `project_dir`.
    ///
    /// `matches` is keyed by the original (unsuffixed) instance names.
    pub fn generate_batch(
        &self,
        set: &CloneSet,
        matches: &BTreeMap<String, MatchedInstance>,
        project_dir: &Path,
    ) -> IacResult<BatchResult> {
        let mut batch = BatchResult::default();
        let shared_plan = set
            .plan
            .as_ref()
            .filter(|_| self.driver.requires_shared_address_space());

        if let Some(plan) = shared_plan {
            let mut network = Topology::new();
            for copy in &set.copies {
                network.networks.extend(copy.topology.networks.iter().cloned());
                network.routers.extend(copy.topology.routers.iter().cloned());
            }
            let no_matches = BTreeMap::new();
            let shared = self.write_environment(
                &Environment {
                    name: SHARED_NETWORK_DIR,
                    topology: &network,
                    matches: &no_matches,
                    network: Some(NetworkPart {
                        plan: Some(plan),
                        bastion: matches.values().next(),
                    }),
                    source: NetworkSource::Module,
                },
                &project_dir.join(SHARED_NETWORK_DIR),
            )?;
            batch.shared = Some(shared);
        }

        for copy in &set.copies {
            let renamed: BTreeMap<String, MatchedInstance> = matches
                .iter()
                .map(|(original, matched)| {
                    let name = copy.rename(original);
                    let matched = MatchedInstance {
                        instance_name: name.clone(),
                        ..matched.clone()
                    };
                    (name, matched)
                })
                .collect();

            let name = copy.dir_name(self.backend());
            let (network, source) = if shared_plan.is_some() {
                (None, NetworkSource::shared_network())
            } else {
                (
                    Some(NetworkPart {
                        plan: None,
                        bastion: None,
                    }),
                    NetworkSource::Module,
                )
            };

            let result = self.write_environment(
                &Environment {
                    name: &name,
                    topology: &copy.topology,
                    matches: &renamed,
                    network,
                    source,
                },
                &project_dir.join(&name),
            )?;
            batch.environments.push(result);
        }

        info!(
            "Generated {} {} environment(s) under {:?}",
            batch.environments.len(),
            self.backend(),
            project_dir
        );
        Ok(batch)
    }

    fn write_environment(&self, env: &Environment<'_>, dir: &Path) -> IacResult<GenerationResult> {
        info!("Generating {} environment {} at {:?}", self.backend(), env.name, dir);
        fs::create_dir_all(dir)?;
        let mut result = GenerationResult::new(dir);

        let mut main = format!(
            "# Generated by topoforge for the {} backend. Do not edit.\n\n{}",
            self.backend(),
            self.driver.render_provider(&self.settings)
        );

        if let Some(data) = env.source.render_data_block() {
            main.push('\n');
            main.push_str(&data);
        }

        if let Some(part) = &env.network {
            result.warnings.extend(self.driver.unsupported(env.topology));
            let layout = NetworkLayout {
                name: env.name,
                topology: env.topology,
                plan: part.plan,
                bastion: part.bastion,
            };
            main.push('\n');
            main.push_str(&self.driver.render_network(&layout)?);
        }

        let mut rendered = Vec::new();
        let mut identifiers: BTreeMap<String, &str> = BTreeMap::new();
        for instance in &env.topology.instances {
            let identifier = hcl::identifier(&instance.name);
            if let Some(first) = identifiers.get(&identifier) {
                result.errors.push(format!(
                    "Instance '{}': Terraform identifier '{}' is already used by '{}', module skipped",
                    instance.name, identifier, first
                ));
                continue;
            }
            identifiers.insert(identifier, instance.name.as_str());

            let Some(matched) = env.matches.get(&instance.name) else {
                result
                    .errors
                    .push(format!("Instance '{}': no resource match, module skipped", instance.name));
                continue;
            };

            let boot_config = match self.render_boot_config(instance, dir) {
                Ok(path) => path,
                Err(message) => {
                    result.errors.push(message);
                    continue;
                }
            };

            main.push('\n');
            main.push_str(&self.driver.render_instance(&InstanceRequest {
                instance,
                matched,
                boot_config: boot_config.as_deref(),
                source: &env.source,
            }));
            if let Some(path) = boot_config {
                result.files.push(PathBuf::from(path));
            }
            rendered.push(instance.name.as_str());
        }

        self.write_file(dir, "main.tf", &main, &mut result)?;
        self.write_file(dir, "variables.tf", &self.driver.render_variables(&self.settings), &mut result)?;
        self.write_file(
            dir,
            "outputs.tf",
            &self.render_outputs(env.network.is_some(), &rendered),
            &mut result,
        )?;
        self.write_file(dir, ".gitignore", GITIGNORE, &mut result)?;

        TopologyWriter::write(dir.join(TOPOLOGY_FILE), env.topology)?;
        result.files.push(PathBuf::from(TOPOLOGY_FILE));

        if env.network.is_some() {
            self.write_module(dir, "network", self.driver.network_module(), &mut result)?;
        }
        if !env.topology.instances.is_empty() {
            self.write_module(dir, "instance", self.driver.instance_module(), &mut result)?;
        }

        result.files.sort();
        for error in &result.errors {
            warn!("{}: {}", env.name, error);
        }
        Ok(result)
    }

    /// Relative boot config path for an instance, or an error message.
    fn render_boot_config(&self, instance: &topo_model::Instance, dir: &Path) -> Result<Option<String>, String> {
        let Some(reference) = instance.cloud_init.as_deref() else {
            return Ok(None);
        };
        let Some(renderer) = &self.boot else {
            return Err(format!(
                "Instance '{}': boot configuration '{}' requested but no renderer is configured",
                instance.name, reference
            ));
        };
        renderer
            .render(instance, dir)
            .map(|path| Some(path.to_string_lossy().replace('\\', "/")))
            .map_err(|e| e.to_string())
    }

    fn render_outputs(&self, owns_network: bool, instances: &[&str]) -> String {
        let mut out = String::new();
        if owns_network {
            for name in self.driver.network_outputs() {
                out.push_str(&format!(
                    "output \"{name}\" {{\n  value = module.network.{name}\n}}\n\n",
                    name = name
                ));
            }
        }

        if instances.is_empty() {
            out.push_str("output \"instances\" {\n  value = {}\n}\n");
            return out;
        }

        out.push_str("output \"instances\" {\n  value = {\n");
        for name in instances {
            out.push_str(&format!(
                r#"    {key} = {{
      id         = module.instance_{id}.id
      private_ip = module.instance_{id}.private_ip
      public_ip  = module.instance_{id}.public_ip
    }}
"#,
                key = hcl::quote(name),
                id = hcl::identifier(name)
            ));
        }
        out.push_str("  }\n}\n");
        out
    }

    fn write_module(&self, dir: &Path, name: &str, files: ModuleFiles, result: &mut GenerationResult) -> IacResult<()> {
        let module_dir = dir.join("modules").join(name);
        fs::create_dir_all(&module_dir)?;
        let prefix = format!("modules/{}", name);
        self.write_file(dir, &format!("{}/main.tf", prefix), files.main, result)?;
        self.write_file(dir, &format!("{}/variables.tf", prefix), files.variables, result)?;
        self.write_file(dir, &format!("{}/outputs.tf", prefix), files.outputs, result)?;
        result.module_paths.push(module_dir);
        Ok(())
    }

    fn write_file(&self, dir: &Path, relative: &str, content: &str, result: &mut GenerationResult) -> IacResult<()> {
        let path = dir.join(relative);
        fs::write(&path, content)?;
        debug!("Wrote {:?}", path);
        result.files.push(PathBuf::from(relative));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootconfig::CloudConfigRenderer;
    use tempfile::tempdir;
    use topo_model::{Instance, Network, Router};

    fn topology() -> Topology {
        Topology::new()
            .with_network(Network::new("web-net", "192.168.10.0/24").with_gateway("192.168.10.1"))
            .with_instance(Instance::new("web-1", "ubuntu-22.04", 1, 1.0, 10).attach("web-net", "192.168.10.10"))
            .with_router(Router::new("edge", true).attach("web-net", "192.168.10.1"))
    }

    fn matches(names: &[&str]) -> BTreeMap<String, MatchedInstance> {
        names
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    MatchedInstance {
                        instance_name: name.to_string(),
                        image_id: "img-1".to_string(),
                        size_class: "m1.small".to_string(),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_generate_openstack_environment() {
        let dir = tempdir().unwrap();
        let generator = ArtifactGenerator::new(Backend::OpenStack);
        let result = generator
            .generate(&topology(), &matches(&["web-1"]), dir.path())
            .unwrap();

        assert!(result.is_success(), "{:?}", result.errors);
        for file in [
            "main.tf",
            "variables.tf",
            "outputs.tf",
            ".gitignore",
            "topology.json",
            "modules/network/main.tf",
            "modules/instance/outputs.tf",
        ] {
            assert!(dir.path().join(file).is_file(), "missing {}", file);
        }
        assert_eq!(result.module_paths.len(), 2);

        let main = fs::read_to_string(dir.path().join("main.tf")).unwrap();
        assert!(main.contains("module \"network\""));
        assert!(main.contains("module \"instance_web_1\""));
        let reloaded = topo_model::TopologyReader::read(dir.path().join("topology.json")).unwrap();
        assert_eq!(reloaded, topology());
    }

    #[test]
    fn test_missing_match_is_accumulated() {
        let dir = tempdir().unwrap();
        let topology = topology().with_instance(Instance::new("web-2", "ubuntu-22.04", 1, 1.0, 10).attach("web-net", "192.168.10.11"));
        let result = ArtifactGenerator::new(Backend::OpenStack)
            .generate(&topology, &matches(&["web-1"]), dir.path())
            .unwrap();

        assert_eq!(result.errors, vec!["Instance 'web-2': no resource match, module skipped".to_string()]);
        let main = fs::read_to_string(dir.path().join("main.tf")).unwrap();
        assert!(main.contains("instance_web_1"));
        assert!(!main.contains("instance_web_2"));
    }

    #[test]
    fn test_colliding_identifiers_are_reported() {
        let dir = tempdir().unwrap();
        let topology = topology()
            .with_instance(Instance::new("web_1", "ubuntu-22.04", 1, 1.0, 10).attach("web-net", "192.168.10.11"));
        let result = ArtifactGenerator::new(Backend::OpenStack)
            .generate(&topology, &matches(&["web-1", "web_1"]), dir.path())
            .unwrap();

        assert!(!result.is_success());
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("'web_1'"));
        assert!(result.errors[0].contains("'web-1'"));

        let main = std::fs::read_to_string(dir.path().join("main.tf")).unwrap();
        assert_eq!(main.matches("module \"instance_web_1\"").count(), 1);
        let outputs = std::fs::read_to_string(dir.path().join("outputs.tf")).unwrap();
        assert_eq!(outputs.matches("module.instance_web_1.id").count(), 1);
    }

    #[test]
    fn test_boot_config_written() {
        let userdata = tempdir().unwrap();
        fs::write(userdata.path().join("web.json"), r#"{"packages": ["nginx"]}"#).unwrap();
        let dir = tempdir().unwrap();

        let mut topology = topology();
        topology.instances[0].cloud_init = Some("web.json".to_string());
        let result = ArtifactGenerator::new(Backend::OpenStack)
            .with_boot_renderer(CloudConfigRenderer::new(userdata.path()))
            .generate(&topology, &matches(&["web-1"]), dir.path())
            .unwrap();

        assert!(result.is_success());
        assert!(result.files.contains(&PathBuf::from("cloud_init/web.yaml")));
        let main = fs::read_to_string(dir.path().join("main.tf")).unwrap();
        assert!(main.contains("file(\"${path.root}/cloud_init/web.yaml\")"));
    }

    #[test]
    fn test_boot_config_without_renderer() {
        let dir = tempdir().unwrap();
        let mut topology = topology();
        topology.instances[0].cloud_init = Some("web.json".to_string());
        let result = ArtifactGenerator::new(Backend::OpenStack)
            .generate(&topology, &matches(&["web-1"]), dir.path())
            .unwrap();
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("no renderer is configured"));
    }

    #[test]
    fn test_aws_batch_uses_shared_network() {
        let project = tempdir().unwrap();
        let set = CloneEngine::new(CounterTokens::default())
            .clone_for(&topology(), 2, Backend::Aws)
            .unwrap();
        let batch = ArtifactGenerator::new(Backend::Aws)
            .generate_batch(&set, &matches(&["web-1"]), project.path())
            .unwrap();

        assert!(batch.is_success(), "{:?}", batch.errors());
        assert!(project.path().join("00-shared-network/modules/network/main.tf").is_file());
        assert!(!project.path().join("aws_c01/modules/network").exists());

        let shared = fs::read_to_string(project.path().join("00-shared-network/main.tf")).unwrap();
        assert!(shared.contains("\"web-net_c01\""));
        assert!(shared.contains("\"web-net_c02\""));
        assert!(shared.contains("vpc_cidr           = \"10.0.0.0/22\""));

        let copy = fs::read_to_string(project.path().join("aws_c02/main.tf")).unwrap();
        assert!(copy.contains("data \"terraform_remote_state\" \"network\""));
        assert!(copy.contains("module \"instance_web_1_c02\""));
        assert!(copy.contains("\"10.0.1.10\""));
    }

    #[test]
    fn test_openstack_batch_has_own_networks() {
        let project = tempdir().unwrap();
        let set = CloneEngine::new(CounterTokens::default())
            .clone_for(&topology(), 2, Backend::OpenStack)
            .unwrap();
        let batch = ArtifactGenerator::new(Backend::OpenStack)
            .generate_batch(&set, &matches(&["web-1"]), project.path())
            .unwrap();

        assert!(batch.shared.is_none());
        assert_eq!(batch.environments.len(), 2);
        assert!(project.path().join("openstack_c01/modules/network/main.tf").is_file());
        assert!(project.path().join("openstack_c02/modules/network/main.tf").is_file());
    }
}
