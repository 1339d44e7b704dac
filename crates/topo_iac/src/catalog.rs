//! Backend catalogs of machine images and size classes.
//!
//! A catalog is a plain lookup table. Where it comes from (a file, a
//! built-in default, a live API) is hidden behind [`CatalogSource`], and
//! fetching is the only async, retryable step in the pipeline.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::error::{IacError, IacResult};

/// A machine image published by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogImage {
    pub name: String,
    pub id: String,
}

/// A compute size class (flavor or instance type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeClass {
    pub name: String,
    pub vcpu: u32,
    pub ram_mb: u64,
    pub disk_gb: u32,
}

impl SizeClass {
    pub fn new(name: impl Into<String>, vcpu: u32, ram_mb: u64, disk_gb: u32) -> Self {
        Self {
            name: name.into(),
            vcpu,
            ram_mb,
            disk_gb,
        }
    }
}

/// Images and size classes available on one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub backend: Backend,
    #[serde(default)]
    pub images: Vec<CatalogImage>,
    #[serde(default)]
    pub sizes: Vec<SizeClass>,
}

impl Catalog {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            images: Vec::new(),
            sizes: Vec::new(),
        }
    }

    pub fn with_image(mut self, name: impl Into<String>, id: impl Into<String>) -> Self {
        self.images.push(CatalogImage {
            name: name.into(),
            id: id.into(),
        });
        self
    }

    pub fn with_size(mut self, size: SizeClass) -> Self {
        self.sizes.push(size);
        self
    }

    /// Load a catalog file. The format follows the extension: `.yaml`/`.yml`,
    /// `.json` or `.toml`.
    pub fn from_file(path: &Path) -> IacResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        let catalog: Catalog = match extension.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            "toml" => toml::from_str(&content)?,
            other => {
                return Err(IacError::Catalog(format!(
                    "unsupported catalog format '{}' for {}",
                    other,
                    path.display()
                )))
            }
        };
        Ok(catalog)
    }

    /// Default catalog shipped with each backend.
    pub fn builtin(backend: Backend) -> Self {
        match backend {
            Backend::Aws => Catalog::new(Backend::Aws)
                .with_image("ubuntu-22.04", "ami-03f8acd418785369b")
                .with_image("ubuntu-20.04", "ami-0030e4319cbf4dbf2")
                .with_image("windows-server-2022", "ami-005148a6a3abb558a")
                .with_size(SizeClass::new("t2.micro", 1, 1024, 8))
                .with_size(SizeClass::new("t2.small", 1, 2048, 8))
                .with_size(SizeClass::new("t3.medium", 2, 4096, 8))
                .with_size(SizeClass::new("t3.large", 2, 8192, 8))
                .with_size(SizeClass::new("t3.xlarge", 4, 16384, 8))
                .with_size(SizeClass::new("t3.2xlarge", 8, 32768, 8)),
            Backend::OpenStack => Catalog::new(Backend::OpenStack)
                .with_image("ubuntu-22.04", "ubuntu-jammy-server-cloudimg")
                .with_image("ubuntu-20.04", "ubuntu-focal-server-cloudimg")
                .with_image("cirros-0.6", "cirros-0.6.2-x86_64-disk")
                .with_image("windows-server-2022", "windows-server-2022-eval")
                .with_size(SizeClass::new("m1.tiny", 1, 512, 1))
                .with_size(SizeClass::new("m1.small", 1, 2048, 20))
                .with_size(SizeClass::new("m1.medium", 2, 4096, 40))
                .with_size(SizeClass::new("m1.large", 4, 8192, 80))
                .with_size(SizeClass::new("m1.xlarge", 8, 16384, 160)),
        }
    }

    pub fn image_names(&self) -> impl Iterator<Item = &str> {
        self.images.iter().map(|i| i.name.as_str())
    }
}

/// Anything that can produce a backend catalog.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch(&self, backend: Backend) -> IacResult<Catalog>;
}

/// Serves the built-in default catalog.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinCatalogSource;

#[async_trait]
impl CatalogSource for BuiltinCatalogSource {
    async fn fetch(&self, backend: Backend) -> IacResult<Catalog> {
        Ok(Catalog::builtin(backend))
    }
}

/// Reads a catalog file on every fetch.
#[derive(Debug, Clone)]
pub struct FileCatalogSource {
    path: PathBuf,
}

impl FileCatalogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CatalogSource for FileCatalogSource {
    async fn fetch(&self, backend: Backend) -> IacResult<Catalog> {
        let path = self.path.clone();
        let catalog = tokio::task::spawn_blocking(move || Catalog::from_file(&path))
            .await
            .map_err(|e| IacError::Catalog(format!("catalog loader panicked: {}", e)))??;

        if catalog.backend != backend {
            return Err(IacError::Catalog(format!(
                "{} holds a {} catalog, expected {}",
                self.path.display(),
                catalog.backend,
                backend
            )));
        }
        Ok(catalog)
    }
}

/// Retry schedule for catalog fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), doubling each time.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Fetch a catalog, retrying failures with exponential backoff.
pub async fn fetch_catalog_with_retry(
    source: &dyn CatalogSource,
    backend: Backend,
    policy: &RetryPolicy,
) -> IacResult<Catalog> {
    let attempts = policy.attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        if attempt > 1 {
            let delay = policy.delay_for(attempt - 1);
            debug!("Retrying {} catalog fetch in {:?}", backend, delay);
            tokio::time::sleep(delay).await;
        }

        match source.fetch(backend).await {
            Ok(catalog) => {
                debug!(
                    "Fetched {} catalog: {} images, {} size classes",
                    backend,
                    catalog.images.len(),
                    catalog.sizes.len()
                );
                return Ok(catalog);
            }
            Err(e) => {
                warn!("Catalog fetch attempt {}/{} failed: {}", attempt, attempts, e);
                last_error = e.to_string();
            }
        }
    }

    Err(IacError::CatalogUnavailable {
        attempts,
        message: last_error,
    })
}
