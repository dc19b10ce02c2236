//! HTTP surface of the module: peer-to-peer invalidation endpoints.

pub mod routes;

pub use routes::router;
