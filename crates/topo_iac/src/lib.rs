//! # topo_iac
//!
//! From a validated topology to Terraform environments.
//!
//! - Backend catalogs of images and size classes, with a retrying async fetch
//! - Resource matching of instance requirements onto a catalog
//! - Clone batches with collision-free names and, for AWS, a shared VPC plan
//! - Boot configuration (cloud-init) rendering
//! - Deterministic Terraform generation through per-backend drivers
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use topo_iac::{ArtifactGenerator, Backend, Catalog, CloneEngine, SeededTokens, driver_for};
//! use topo_model::TopologyReader;
//!
//! let topology = TopologyReader::read("topology.json").unwrap();
//! let driver = driver_for(Backend::OpenStack);
//! let report = driver.match_resources(&topology, &Catalog::builtin(Backend::OpenStack));
//! assert!(report.ok, "{:?}", report.messages);
//!
//! let set = CloneEngine::new(SeededTokens::new(42))
//!     .clone_for(&topology, 3, Backend::OpenStack)
//!     .unwrap();
//! let batch = ArtifactGenerator::new(Backend::OpenStack)
//!     .generate_batch(&set, &report.matches, Path::new("./deploy"))
//!     .unwrap();
//! assert!(batch.is_success());
//! ```

pub mod backend;
pub mod backends;
pub mod bootconfig;
pub mod catalog;
pub mod clone;
pub mod driver;
pub mod error;
pub mod generator;
pub mod hcl;
pub mod layout;
pub mod matcher;

pub use backend::{Backend, ProviderSettings};
pub use bootconfig::{BootConfigRenderer, CloudConfigRenderer};
pub use catalog::{
    fetch_catalog_with_retry, BuiltinCatalogSource, Catalog, CatalogImage, CatalogSource, FileCatalogSource,
    RetryPolicy, SizeClass,
};
pub use clone::{clone_topology, AddressPlan, CloneCopy, CloneEngine, CloneSet, CounterTokens, SeededTokens, TokenSource};
pub use driver::{driver_for, BackendDriver, NetworkSource, SHARED_NETWORK_DIR};
pub use error::{IacError, IacResult};
pub use generator::{ArtifactGenerator, BatchResult, GenerationResult, TOPOLOGY_FILE};
pub use layout::{discover_environments, EnvironmentLayout, STATE_FILE};
pub use matcher::{MatchReport, ResourceMatcher};
