//! Public API trait for the service authentication core.
//!
//! This is the surface the reverse-proxy filter chain consumes. The module
//! implements it with a local client that delegates to the domain services.

use std::sync::Arc;

use async_trait::async_trait;
use auth_context::InboundRequest;

use crate::command::AuthenticationCommand;
use crate::error::ServiceAuthError;
use crate::models::{Credential, InvalidationReport, ParsedCredential};
use crate::routing::RoutingContext;

/// Public API trait for southbound service authentication.
///
/// ```ignore
/// let auth: Arc<dyn ServiceAuthClient> = module.client();
///
/// if let Some(credential) = auth.resolve_credential(&inbound).await {
///     let mut routing = RoutingContext::default();
///     let command = auth.get_command("orders", &credential, &mut routing).await?;
///     // ...
/// }
/// ```
#[async_trait]
pub trait ServiceAuthClient: Send + Sync {
    /// Pick the single active credential of `request`, or `None` when it carries none.
    async fn resolve_credential(&self, request: &InboundRequest) -> Option<Credential>;

    /// Authentication command for `credential` against `service_id`.
    ///
    /// When the service's instances disagree on their requirement, a deferred command
    /// is returned and a marker is recorded in `routing`.
    ///
    /// # Errors
    ///
    /// - `Registry` if the instance lookup fails
    /// - `CredentialInvalid` if the credential cannot be parsed for a scheme that needs an identity
    /// - `DownstreamGenerationFailed` if pass-ticket or token generation fails
    async fn get_command(
        &self,
        service_id: &str,
        credential: &Credential,
        routing: &mut RoutingContext,
    ) -> Result<Arc<AuthenticationCommand>, ServiceAuthError>;

    /// Mint a gateway session token.
    ///
    /// # Errors
    ///
    /// - `Internal` if signing fails
    async fn create_session_token(
        &self,
        user_id: &str,
        domain: &str,
        legacy_token: Option<&str>,
    ) -> Result<String, ServiceAuthError>;

    /// Validate a gateway session token.
    ///
    /// # Errors
    ///
    /// - `TokenInvalid` on bad signature, malformed input, or invalidated tokens
    /// - `TokenExpired` when the token has expired
    async fn validate_token(&self, token: &str) -> Result<ParsedCredential, ServiceAuthError>;

    /// Invalidate a token locally and, when `distribute` is set, on every cluster peer.
    ///
    /// Always succeeds locally; peer failures are only reported.
    async fn invalidate_token(&self, token: &str, distribute: bool) -> InvalidationReport;
}
