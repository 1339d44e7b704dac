//! Structural uniformity across the copies of a clone batch.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use topo_iac::{SHARED_NETWORK_DIR, STATE_FILE};
use topo_model::ResourceCategory;

use crate::error::AuditResult;
use crate::state::DeployedState;

/// Per-category resource counts of one deployed copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyCounts {
    pub dir: PathBuf,
    pub networks: usize,
    pub instances: usize,
    pub routers: usize,
}

impl CopyCounts {
    fn from_state(dir: PathBuf, state: &DeployedState) -> Self {
        Self {
            dir,
            networks: state.count(ResourceCategory::Network),
            instances: state.count(ResourceCategory::Instance),
            routers: state.count(ResourceCategory::Router),
        }
    }

    pub fn get(&self, category: ResourceCategory) -> usize {
        match category {
            ResourceCategory::Network => self.networks,
            ResourceCategory::Instance => self.instances,
            ResourceCategory::Router => self.routers,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchAudit {
    pub copies: Vec<CopyCounts>,
    pub problems: Vec<String>,
}

impl BatchAudit {
    pub fn is_uniform(&self) -> bool {
        !self.copies.is_empty() && self.problems.is_empty()
    }
}

/// Compare every copy's state under `project_dir` with the first one.
/// The shared network environment is not a copy and is skipped.
pub fn audit_batch(project_dir: &Path) -> AuditResult<BatchAudit> {
    let pattern = project_dir.join("**").join(STATE_FILE);
    let mut paths: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())?
        .filter_map(Result::ok)
        .filter(|path| {
            !path
                .components()
                .any(|c| c.as_os_str() == SHARED_NETWORK_DIR || c.as_os_str() == ".terraform")
        })
        .collect();
    paths.sort();

    let mut audit = BatchAudit::default();
    if paths.is_empty() {
        audit
            .problems
            .push(format!("No {} found under {}", STATE_FILE, project_dir.display()));
        return Ok(audit);
    }

    for path in &paths {
        let state = DeployedState::load(path)?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        audit.copies.push(CopyCounts::from_state(dir, &state));
    }

    let reference = &audit.copies[0];
    for copy in &audit.copies[1..] {
        for category in ResourceCategory::all() {
            let (expected, actual) = (reference.get(category), copy.get(category));
            if expected != actual {
                audit.problems.push(format!(
                    "{}: {} {}(s), {} has {}",
                    copy.dir.display(),
                    actual,
                    category,
                    reference.dir.display(),
                    expected
                ));
            }
        }
    }

    if audit.problems.is_empty() {
        info!("{} copies are structurally uniform", audit.copies.len());
    } else {
        warn!("{} batch uniformity problems", audit.problems.len());
    }
    Ok(audit)
}
