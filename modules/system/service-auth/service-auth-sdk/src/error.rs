//! Error types for the `service_auth` module.

use thiserror::Error;

/// Errors surfaced by the service authentication API.
///
/// A missing credential is not an error: resolution returns `None` instead.
/// Unreachable cluster peers are reported through
/// [`InvalidationReport`](crate::models::InvalidationReport), never through this type.
#[derive(Debug, Error)]
pub enum ServiceAuthError {
    /// Credential failed signature, encoding, or scope checks.
    #[error("credential invalid: {0}")]
    CredentialInvalid(String),

    /// Session token is not valid (bad signature, malformed, or invalidated).
    #[error("token is not valid: {0}")]
    TokenInvalid(String),

    /// Session token signature is fine but it has expired.
    #[error("token has expired")]
    TokenExpired,

    /// No live instance or no usable requirement for the target service.
    #[error("backend unresolvable: {0}")]
    BackendUnresolvable(String),

    /// Pass-ticket or legacy provider call failed. Not retried.
    #[error("downstream generation failed: {0}")]
    DownstreamGenerationFailed(String),

    /// Service registry lookup failed.
    #[error("registry error: {0}")]
    Registry(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}
