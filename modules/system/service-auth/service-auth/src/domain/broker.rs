//! Credential broker: one active credential per request.

use std::sync::Arc;

use auth_context::InboundRequest;
use service_auth_sdk::{Credential, CredentialKind, ParsedCredential};

use super::error::DomainError;
use super::resolvers::CredentialResolver;

/// Resolvers in fixed precedence order. Disabled resolvers are never registered.
pub struct CredentialBroker {
    resolvers: Vec<Arc<dyn CredentialResolver>>,
}

impl CredentialBroker {
    /// Session-token resolver first, then optional access-token, OIDC, and certificate resolvers.
    ///
    /// The relative order is fixed whichever of the optional resolvers are enabled.
    #[must_use]
    pub fn new(
        jwt: Arc<dyn CredentialResolver>,
        pat: Option<Arc<dyn CredentialResolver>>,
        oidc: Option<Arc<dyn CredentialResolver>>,
        x509: Option<Arc<dyn CredentialResolver>>,
    ) -> Self {
        let resolvers = std::iter::once(jwt)
            .chain(pat)
            .chain(oidc)
            .chain(x509)
            .collect();
        Self { resolvers }
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<CredentialKind> {
        self.resolvers.iter().map(|r| r.kind()).collect()
    }

    fn resolver_for(&self, kind: CredentialKind) -> Option<&Arc<dyn CredentialResolver>> {
        self.resolvers.iter().find(|r| r.kind() == kind)
    }

    /// First credential any participating resolver extracts, in precedence order.
    #[must_use]
    pub fn resolve(&self, request: &InboundRequest) -> Option<Credential> {
        let credential = self.resolvers.iter().find_map(|r| r.extract(request));
        if let Some(credential) = &credential {
            tracing::debug!(credential_kind = %credential.kind(), "credential resolved");
        }
        credential
    }

    /// First credential that is present and valid, in precedence order.
    ///
    /// An invalid credential of a stronger kind does not hide a valid one of a weaker kind.
    pub async fn resolve_valid(&self, request: &InboundRequest) -> Option<Credential> {
        for resolver in &self.resolvers {
            if let Some(credential) = resolver.extract(request)
                && resolver.is_valid(&credential).await
            {
                return Some(credential);
            }
        }
        None
    }

    /// `false` for credentials whose resolver is not participating.
    pub async fn is_valid(&self, credential: &Credential) -> bool {
        match self.resolver_for(credential.kind()) {
            Some(resolver) => resolver.is_valid(credential).await,
            None => false,
        }
    }

    pub async fn parse(&self, credential: &Credential) -> Option<ParsedCredential> {
        self.resolver_for(credential.kind())?.parse(credential).await
    }

    /// # Errors
    ///
    /// Propagates token generation failures.
    pub async fn derive_session_token(
        &self,
        credential: &Credential,
    ) -> Result<Option<String>, DomainError> {
        match self.resolver_for(credential.kind()) {
            Some(resolver) => resolver.derive_session_token(credential).await,
            None => Ok(None),
        }
    }
}
