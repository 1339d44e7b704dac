//! # topo_validate
//!
//! Validation for topoforge topologies.
//!
//! Two passes run in order. The [`SchemaValidator`] checks the raw JSON
//! document for required fields and types without looking across entities.
//! The [`NetworkLogicValidator`] then checks the typed model: CIDR
//! arithmetic, duplicate addresses, references between entities (with
//! "did you mean" hints), gateways and static route reachability.
//!
//! Neither pass fails fast. Every problem found lands in a
//! [`ValidationResult`] so the author can fix everything in one cycle.
//!
//! ## Example
//!
//! ```rust
//! use topo_model::{Instance, Network, Router, Topology};
//! use topo_validate::validate_logic;
//!
//! let topology = Topology::new()
//!     .with_network(Network::new("test-net", "10.0.0.0/24").with_gateway("10.0.0.1"))
//!     .with_router(Router::new("edge", true).attach("tet-net", "10.0.0.1"));
//!
//! let result = validate_logic(&topology);
//! assert!(!result.valid);
//! assert!(result.errors[0].contains("did you mean 'test-net'?"));
//! ```

pub mod error;
pub mod fuzzy;
pub mod logic;
pub mod result;
pub mod schema;
pub mod validator;

pub use error::{ValidateError, ValidateResult};
pub use logic::{NetworkLogicValidator, MAX_ROUTE_HOPS};
pub use result::ValidationResult;
pub use schema::SchemaValidator;
pub use validator::{validate_logic, validate_schema, TopologyReport, TopologyValidator};
