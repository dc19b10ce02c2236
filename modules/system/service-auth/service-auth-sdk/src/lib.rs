#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Service Auth SDK
//!
//! This crate provides the public API for the `service_auth` module:
//!
//! - [`ServiceAuthClient`] - Public API trait used by the reverse-proxy filter chain
//! - [`AuthenticationCommand`] - Transformation applied to an outbound request
//! - [`RoutingContext`] - Request-scoped state carrying a deferred command to the load balancer
//! - [`Credential`] / [`ParsedCredential`] - Inbound authentication evidence and its normalized form
//! - Collaborator traits ([`ServiceRegistryClient`], [`PassTicketGenerator`], ...) implemented
//!   by plugins or infrastructure adapters
//! - [`ServiceAuthError`] - Error types
//!
//! ## Usage
//!
//! ```ignore
//! use service_auth_sdk::{RoutingContext, ServiceAuthClient};
//!
//! let Some(credential) = auth.resolve_credential(&inbound).await else {
//!     return forward_unauthenticated(request).await;
//! };
//!
//! let mut routing = RoutingContext::default();
//! let command = auth.get_command("orders", &credential, &mut routing).await?;
//!
//! // ... load balancer picks `instance` ...
//! if !routing.apply_for_instance(&instance, &mut outbound).await? {
//!     command.apply(&mut outbound, Some(&instance)).await?;
//! }
//! ```

pub mod api;
pub mod collaborators;
pub mod command;
pub mod error;
pub mod models;
pub mod routing;

// Re-export main types at crate root
pub use api::ServiceAuthClient;
pub use collaborators::{
    DirectoryError, LegacyAuthError, LegacyAuthProvider, LegacySession, OidcIntrospectionClient,
    PassTicketError, PassTicketGenerator, PeerError, PeerInvalidationClient, RegistryError,
    ServiceRegistryClient, UserDirectory,
};
pub use command::{
    AuthenticationCommand, InstanceCommandResolver, PassTicketCommand, SessionTokenCommand,
    UniversalCommand,
};
pub use error::ServiceAuthError;
pub use models::{
    AuthScheme, BackendRequirement, CertificateDetails, Credential, CredentialKey, CredentialKind,
    GatewayCookies, InvalidationReport, Origin, ParsedCredential, RegistryEvent, ServiceInstance,
};
pub use routing::{LoadBalancerCommand, RoutingContext};
