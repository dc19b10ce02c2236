//! Domain layer for the static registry plugin.

pub mod client;
pub mod service;

pub use service::{StaticPassTicketGenerator, StaticServiceRegistry};
