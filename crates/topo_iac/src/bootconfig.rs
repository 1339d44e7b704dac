//! Boot configuration (cloud-init) rendering.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use topo_model::Instance;

use crate::error::{IacError, IacResult};

/// Directory, relative to an environment, holding rendered boot configs.
pub const BOOT_CONFIG_DIR: &str = "cloud_init";

/// Keys accepted in a user-data document, in output order.
pub const ALLOWED_KEYS: &[&str] = &["packages", "users", "write_files", "runcmd", "ssh_authorized_keys"];

/// Renders an instance's boot configuration reference into a file under an
/// environment directory.
pub trait BootConfigRenderer: Send + Sync {
    /// Returns the rendered file's path relative to `output_dir`.
    fn render(&self, instance: &Instance, output_dir: &Path) -> IacResult<PathBuf>;
}

/// Whether an image name denotes a Windows guest.
pub fn is_windows_image(image: &str) -> bool {
    let image = image.to_lowercase();
    image.contains("win")
        || ["server-2016", "server-2019", "server-2022"]
            .iter()
            .any(|marker| image.contains(marker))
}

/// A relative path made only of plain components, so it stays under
/// whatever directory it is joined to.
fn is_confined(reference: &str) -> bool {
    let path = Path::new(reference);
    path.components().next().is_some() && path.components().all(|c| matches!(c, Component::Normal(_)))
}

/// Renders JSON user-data documents into `#cloud-config` YAML.
#[derive(Debug, Clone)]
pub struct CloudConfigRenderer {
    userdata_dir: PathBuf,
}

impl CloudConfigRenderer {
    pub fn new(userdata_dir: impl Into<PathBuf>) -> Self {
        Self {
            userdata_dir: userdata_dir.into(),
        }
    }

    /// Locate `<reference>` or `<reference>.json` in the user-data directory.
    /// References that could leave the directory never resolve.
    pub fn resolve(&self, reference: &str) -> Option<PathBuf> {
        if !is_confined(reference) {
            return None;
        }
        [
            self.userdata_dir.join(reference),
            self.userdata_dir.join(format!("{}.json", reference)),
        ]
        .into_iter()
        .find(|candidate| candidate.is_file())
    }

    /// Render a user-data document to cloud-config text.
    pub fn render_document(&self, document: &Value, windows: bool) -> IacResult<String> {
        let object = document
            .as_object()
            .ok_or_else(|| IacError::BootConfig("user data must be a JSON object".to_string()))?;

        let mut unknown: Vec<&str> = object
            .keys()
            .map(String::as_str)
            .filter(|key| !ALLOWED_KEYS.contains(key))
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            return Err(IacError::BootConfig(format!(
                "unsupported user data keys: {}",
                unknown.join(", ")
            )));
        }

        let mut config = serde_yaml::Mapping::new();
        for key in ALLOWED_KEYS {
            let Some(value) = object.get(*key) else { continue };
            if windows && (*key == "packages" || *key == "runcmd") {
                continue;
            }
            config.insert(serde_yaml::to_value(key)?, serde_yaml::to_value(value)?);
        }

        if windows {
            let mut commands: Vec<Value> = object
                .get("packages")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(Value::as_str)
                .map(|package| Value::String(format!("choco install -y {}", package)))
                .collect();
            commands.extend(
                object
                    .get("runcmd")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .cloned(),
            );
            if !commands.is_empty() {
                config.insert(serde_yaml::to_value("runcmd")?, serde_yaml::to_value(&commands)?);
            }
        }

        Ok(format!("#cloud-config\n{}", serde_yaml::to_string(&config)?))
    }
}

impl BootConfigRenderer for CloudConfigRenderer {
    fn render(&self, instance: &Instance, output_dir: &Path) -> IacResult<PathBuf> {
        let reference = instance.cloud_init.as_deref().ok_or_else(|| {
            IacError::BootConfig(format!("Instance '{}' has no boot configuration", instance.name))
        })?;
        if !is_confined(reference) {
            return Err(IacError::BootConfig(format!(
                "Instance '{}': boot configuration '{}' must be a relative path inside the user data directory",
                instance.name, reference
            )));
        }
        let source = self.resolve(reference).ok_or_else(|| {
            IacError::BootConfig(format!(
                "Instance '{}': boot configuration '{}' not found in {}",
                instance.name,
                reference,
                self.userdata_dir.display()
            ))
        })?;

        let document: Value = serde_json::from_str(&fs::read_to_string(&source)?).map_err(|e| {
            IacError::BootConfig(format!("Instance '{}': {}: {}", instance.name, source.display(), e))
        })?;
        let windows = is_windows_image(&instance.image);
        let content = self
            .render_document(&document, windows)
            .map_err(|e| IacError::BootConfig(format!("Instance '{}': {}", instance.name, e)))?;

        let base = reference.strip_suffix(".json").unwrap_or(reference);
        let file_name = if windows {
            format!("{}-windows.yaml", base)
        } else {
            format!("{}.yaml", base)
        };
        let relative = Path::new(BOOT_CONFIG_DIR).join(file_name);

        let target = output_dir.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, content)?;
        debug!("Rendered boot configuration for {} to {:?}", instance.name, target);
        Ok(relative)
    }
}
