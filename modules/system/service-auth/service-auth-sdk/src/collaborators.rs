//! Collaborator traits consumed by the `service_auth` module.
//!
//! These are the seams to systems the gateway does not own: the service registry,
//! the mainframe pass-ticket generator, the legacy authentication provider, the OIDC
//! issuer, the user directory, and other gateway nodes. Plugins and infrastructure
//! adapters implement them; the module only depends on the traits.

use async_trait::async_trait;
use auth_context::PeerCertificate;
use secrecy::SecretString;
use thiserror::Error;

use crate::models::ServiceInstance;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
#[error("could not generate pass-ticket for user {user_id} and application {application_id}: {reason}")]
pub struct PassTicketError {
    pub user_id: String,
    pub application_id: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum LegacyAuthError {
    #[error("legacy authentication provider unavailable")]
    Unavailable,
    #[error("legacy authentication rejected: {0}")]
    Rejected(String),
    #[error("legacy authentication failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("peer unreachable: {0}")]
    Unreachable(String),
    #[error("peer call timed out")]
    Timeout,
    #[error("peer answered with status {0}")]
    Status(u16),
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("user directory lookup failed: {0}")]
    Failed(String),
}

/// Source of live service instances and their metadata.
#[async_trait]
pub trait ServiceRegistryClient: Send + Sync {
    /// All live instances of `service_id`. Unknown services yield an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the registry cannot be reached.
    async fn get_instances(&self, service_id: &str) -> Result<Vec<ServiceInstance>, RegistryError>;
}

/// Mainframe pass-ticket generation.
#[async_trait]
pub trait PassTicketGenerator: Send + Sync {
    /// Generate a single-use pass-ticket for `user_id` on `application_id`.
    ///
    /// # Errors
    ///
    /// Returns [`PassTicketError`] when the security product refuses or fails.
    async fn generate(
        &self,
        user_id: &str,
        application_id: &str,
    ) -> Result<SecretString, PassTicketError>;
}

/// Session obtained from the legacy authentication provider.
#[derive(Debug, Clone)]
pub struct LegacySession {
    /// Opaque backend session identifier to embed in gateway tokens.
    pub token: SecretString,
    /// Security domain reported by the provider.
    pub domain: Option<String>,
}

/// Optional legacy authentication provider.
#[async_trait]
pub trait LegacyAuthProvider: Send + Sync {
    /// Whether the provider is currently reachable.
    async fn is_available(&self) -> bool;

    /// Obtain a legacy session for `user_id` authenticated by a pass-ticket.
    ///
    /// # Errors
    ///
    /// [`LegacyAuthError::Unavailable`] when the provider cannot be reached,
    /// [`LegacyAuthError::Rejected`] when it refuses the credentials.
    async fn authenticate(
        &self,
        user_id: &str,
        pass_ticket: &SecretString,
    ) -> Result<LegacySession, LegacyAuthError>;

    /// Check a token issued by the provider.
    ///
    /// # Errors
    ///
    /// Returns [`LegacyAuthError`] when the provider cannot answer.
    async fn validate(&self, token: &str) -> Result<bool, LegacyAuthError>;

    /// Terminate a legacy session.
    ///
    /// # Errors
    ///
    /// Returns [`LegacyAuthError`] when the provider cannot answer.
    async fn invalidate(&self, token: &str) -> Result<(), LegacyAuthError>;
}

/// Token introspection at the OIDC issuer.
#[async_trait]
pub trait OidcIntrospectionClient: Send + Sync {
    async fn is_valid(&self, token: &str) -> bool;
}

/// Mapping from external identities to mainframe user ids.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Mainframe user id registered for `certificate`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the directory cannot answer.
    async fn map_certificate(
        &self,
        certificate: &PeerCertificate,
    ) -> Result<Option<String>, DirectoryError>;

    /// Mainframe user id for a distributed identity `subject` from `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the directory cannot answer.
    async fn map_distributed_id(
        &self,
        subject: &str,
        registry: &str,
    ) -> Result<Option<String>, DirectoryError>;
}

/// Outbound call to another gateway node's invalidation endpoint.
#[async_trait]
pub trait PeerInvalidationClient: Send + Sync {
    /// Ask `peer` to invalidate `token` locally.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError`] when the peer is unreachable or answers with a non-success status.
    async fn invalidate(&self, peer: &ServiceInstance, token: &str) -> Result<(), PeerError>;
}
