//! # topo_audit
//!
//! Post-deployment checks for topoforge environments.
//!
//! The [`ConsistencyChecker`] compares a declared topology with what the
//! backend reports after deployment and describes any drift per category.
//! Drift is never an error: the report always comes back, with the missing
//! and unexpected entities and attribute mismatches spelled out.
//! [`audit_batch`] checks that every copy of a clone batch deployed the same
//! number of resources.
//!
//! ## Example
//!
//! ```rust
//! use serde_json::json;
//! use topo_audit::{check, DeployedState, OverallStatus};
//! use topo_model::{Network, Topology};
//!
//! let topology = Topology::new().with_network(Network::new("core-net", "10.0.0.0/24"));
//! let state = DeployedState::from_document(&json!({
//!     "networks": [{"name": "", "cidr": "10.0.0.0/24"}]
//! }))
//! .unwrap();
//!
//! let report = check(&topology, &state);
//! assert_eq!(report.status, OverallStatus::Consistent);
//! ```

pub mod batch;
pub mod checker;
pub mod error;
pub mod state;

pub use batch::{audit_batch, BatchAudit, CopyCounts};
pub use checker::{
    check, CategoryReport, CategoryStatus, ConsistencyChecker, ConsistencyReport, MatchedPair, Mismatch,
    OverallStatus,
};
pub use error::{AuditError, AuditResult};
pub use state::{DeployedState, ReportedInstance, ReportedNetwork, ReportedRouter};
