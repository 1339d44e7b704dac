//! # topo_model
//!
//! Provider-agnostic infrastructure topology model for topoforge.
//!
//! A topology is the declarative description of one environment: the
//! instances to boot, the networks they attach to, and the routers that
//! link those networks. Every later stage (validation, matching, cloning,
//! generation, consistency checks) consumes these values and produces new
//! ones; nothing mutates a topology in place.
//!
//! ## Example
//!
//! ```rust
//! use topo_model::{Instance, Network, Topology};
//!
//! let topology = Topology::new()
//!     .with_network(Network::new("web-net", "192.168.10.0/24").with_gateway("192.168.10.1"))
//!     .with_instance(Instance::new("web-1", "ubuntu-22.04", 1, 1.0, 10).attach("web-net", "192.168.10.10"));
//!
//! assert!(topo_model::net::ip_in_subnet("192.168.10.10", "192.168.10.0/24"));
//! assert_eq!(topology.network_names(), vec!["web-net"]);
//! ```

pub mod error;
pub mod models;
pub mod net;
pub mod reader;
pub mod writer;

pub use error::{AddressError, ModelError, ModelResult};
pub use models::*;
pub use reader::TopologyReader;
pub use writer::TopologyWriter;
