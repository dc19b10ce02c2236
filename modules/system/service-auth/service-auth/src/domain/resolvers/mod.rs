//! Credential resolvers, one per credential kind.
//!
//! A resolver knows where its evidence lives in a request, how to check it, and how
//! to turn it into a [`ParsedCredential`]. Failures never escape as errors from
//! [`CredentialResolver::parse`]: an unusable credential is simply absent.

mod jwt;
mod oidc;
mod pat;
mod x509;

pub use jwt::JwtResolver;
pub use oidc::OidcResolver;
pub use pat::PatResolver;
pub use x509::{IdentityMapper, X509Resolver};

use async_trait::async_trait;
use auth_context::InboundRequest;
use service_auth_sdk::{Credential, CredentialKind, ParsedCredential};

use super::error::{CredentialError, DomainError};
use super::token_service::TokenService;

#[async_trait]
pub trait CredentialResolver: Send + Sync {
    fn kind(&self) -> CredentialKind;

    /// Evidence of this resolver's kind carried by `request`, if any.
    fn extract(&self, request: &InboundRequest) -> Option<Credential>;

    /// Check the credential without producing an identity.
    async fn validate(&self, credential: &Credential) -> Result<(), CredentialError>;

    /// Validate and parse. Must fail whenever [`CredentialResolver::validate`] fails.
    async fn identify(&self, credential: &Credential) -> Result<ParsedCredential, CredentialError>;

    /// Session token usable toward backends expecting one.
    ///
    /// `Ok(None)` when the credential does not parse.
    async fn derive_session_token(
        &self,
        credential: &Credential,
    ) -> Result<Option<String>, DomainError>;

    async fn is_valid(&self, credential: &Credential) -> bool {
        match self.validate(credential).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(credential_kind = %self.kind(), reason = %e, "credential rejected");
                false
            }
        }
    }

    async fn parse(&self, credential: &Credential) -> Option<ParsedCredential> {
        match self.identify(credential).await {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::debug!(credential_kind = %self.kind(), reason = %e, "credential not parsed");
                None
            }
        }
    }
}

/// Session token for an identity proven by a non-session credential.
async fn mint_for<R>(
    resolver: &R,
    tokens: &TokenService,
    credential: &Credential,
) -> Result<Option<String>, DomainError>
where
    R: CredentialResolver + ?Sized,
{
    let Some(parsed) = resolver.parse(credential).await else {
        return Ok(None);
    };
    tokens
        .create_jwt_without_credentials(parsed.user_id())
        .await
        .map(Some)
}
