//! Service Auth Module
//!
//! Southbound authentication core of the API gateway. For every proxied request it
//! picks the single active inbound credential, derives the authentication the
//! target backend declares in the service registry (a session token, a mainframe
//! pass-ticket, or nothing), and caches the resulting command.
//!
//! It also owns the lifecycle of the gateway's own session tokens, including
//! cluster-wide invalidation.
//!
//! Provides the `ServiceAuthClient` trait implementation consumed by the
//! reverse-proxy filter chain.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod api;
pub mod config;
pub mod domain;
pub mod infra;
pub mod module;

pub use config::ServiceAuthConfig;
pub use module::{Collaborators, ServiceAuthModule};
