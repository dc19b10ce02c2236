#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Static Registry Plugin
//!
//! In-memory implementations of the `service_auth` collaborators that normally
//! talk to the discovery service and the mainframe security product.
//!
//! - [`StaticServiceRegistry`]: service instances from configuration, with runtime
//!   registration so tests can change the topology
//! - [`StaticPassTicketGenerator`]: single-use random pass-tickets, optionally
//!   restricted to known applications and users
//!
//! ## Configuration
//!
//! ```yaml
//! static_registry_plugin:
//!   instances:
//!     - instance_id: "orders-1"
//!       service_id: "orders"
//!       host: "orders.internal"
//!       port: 8080
//!       metadata:
//!         authentication.scheme: "httpBasicPassTicket"
//!         authentication.applid: "IZUDFLT"
//!   pass_tickets:
//!     applications: ["IZUDFLT"]
//!     denied_users: []
//! ```

pub mod config;
pub mod domain;

pub use config::{PassTicketConfig, StaticRegistryPluginConfig};
pub use domain::{StaticPassTicketGenerator, StaticServiceRegistry};
