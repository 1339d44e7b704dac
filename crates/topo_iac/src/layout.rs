//! Discovery of generated environment directories.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;
use walkdir::WalkDir;

use topo_model::{Topology, TopologyReader};

use crate::backend::Backend;
use crate::driver::SHARED_NETWORK_DIR;
use crate::error::{IacError, IacResult};
use crate::generator::TOPOLOGY_FILE;

/// Terraform state file name inside an environment.
pub const STATE_FILE: &str = "terraform.tfstate";

fn provider_source_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"source\s*=\s*"([^"]+)""#).ok())
        .as_ref()
}

/// What an environment directory contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentLayout {
    pub dir: PathBuf,
    pub backend: Option<Backend>,
    pub topology_path: Option<PathBuf>,
    pub state_path: Option<PathBuf>,
    pub module_dirs: Vec<PathBuf>,
}

impl EnvironmentLayout {
    /// Inspect a directory. It must contain a `main.tf`.
    pub fn detect(dir: &Path) -> IacResult<Self> {
        let main = dir.join("main.tf");
        if !main.is_file() {
            return Err(IacError::Layout(format!("{} has no main.tf", dir.display())));
        }

        let backend = detect_backend(&fs::read_to_string(&main)?);
        let existing = |name: &str| Some(dir.join(name)).filter(|p| p.is_file());

        let modules = dir.join("modules");
        let mut module_dirs: Vec<PathBuf> = if modules.is_dir() {
            fs::read_dir(&modules)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_dir())
                .collect()
        } else {
            Vec::new()
        };
        module_dirs.sort();

        debug!("Detected environment {:?} (backend {:?})", dir, backend);
        Ok(Self {
            dir: dir.to_path_buf(),
            backend,
            topology_path: existing(TOPOLOGY_FILE),
            state_path: existing(STATE_FILE),
            module_dirs,
        })
    }

    pub fn name(&self) -> String {
        self.dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Whether this is the shared network of a batch.
    pub fn is_shared_network(&self) -> bool {
        self.name() == SHARED_NETWORK_DIR
    }

    /// Re-load the topology the environment was generated from.
    pub fn load_topology(&self) -> IacResult<Topology> {
        let path = self.topology_path.as_ref().ok_or_else(|| {
            IacError::Layout(format!("{} has no {}", self.dir.display(), TOPOLOGY_FILE))
        })?;
        Ok(TopologyReader::read(path)?)
    }
}

/// Backend whose provider source appears in a root module.
pub fn detect_backend(main_tf: &str) -> Option<Backend> {
    let sources: Vec<&str> = match provider_source_pattern() {
        Some(re) => re
            .captures_iter(main_tf)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect(),
        None => Vec::new(),
    };
    Backend::all()
        .into_iter()
        .find(|backend| sources.contains(&backend.provider_source()))
}

/// Every environment directly under `project_dir`, sorted by name.
pub fn discover_environments(project_dir: &Path) -> IacResult<Vec<EnvironmentLayout>> {
    if !project_dir.is_dir() {
        return Err(IacError::Layout(format!("{} is not a directory", project_dir.display())));
    }

    let mut environments = Vec::new();
    for entry in WalkDir::new(project_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
    {
        if entry.path().join("main.tf").is_file() {
            environments.push(EnvironmentLayout::detect(entry.path())?);
        }
    }
    Ok(environments)
}
