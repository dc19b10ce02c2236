use std::sync::Arc;

use async_trait::async_trait;
use auth_context::InboundRequest;
use service_auth_sdk::{
    Credential, CredentialKind, OidcIntrospectionClient, Origin, ParsedCredential, UserDirectory,
};

use super::{CredentialResolver, mint_for};
use crate::domain::error::{CredentialError, DomainError};
use crate::domain::token_service::TokenService;

/// Bearer tokens issued by an external OIDC provider.
///
/// The issuer's introspection endpoint vouches for the token before any claim is
/// read. The subject is mapped through the user directory when one is configured.
pub struct OidcResolver {
    tokens: Arc<TokenService>,
    introspection: Arc<dyn OidcIntrospectionClient>,
    directory: Option<Arc<dyn UserDirectory>>,
}

impl OidcResolver {
    #[must_use]
    pub fn new(
        tokens: Arc<TokenService>,
        introspection: Arc<dyn OidcIntrospectionClient>,
        directory: Option<Arc<dyn UserDirectory>>,
    ) -> Self {
        Self {
            tokens,
            introspection,
            directory,
        }
    }

    fn token(credential: &Credential) -> Result<&str, CredentialError> {
        match credential {
            Credential::Oidc(token) => Ok(token),
            _ => Err(CredentialError::WrongKind),
        }
    }
}

#[async_trait]
impl CredentialResolver for OidcResolver {
    fn kind(&self) -> CredentialKind {
        CredentialKind::Oidc
    }

    fn extract(&self, request: &InboundRequest) -> Option<Credential> {
        let bearer = request.bearer_token()?;
        match self.tokens.token_origin(bearer) {
            Ok(Origin::Zowe | Origin::ZowePat | Origin::Zosmf) => None,
            _ => Credential::oidc(bearer),
        }
    }

    async fn validate(&self, credential: &Credential) -> Result<(), CredentialError> {
        let token = Self::token(credential)?;
        if self.introspection.is_valid(token).await {
            Ok(())
        } else {
            Err(CredentialError::Introspection)
        }
    }

    async fn identify(&self, credential: &Credential) -> Result<ParsedCredential, CredentialError> {
        self.validate(credential).await?;
        let token = Self::token(credential)?;
        let external = self.tokens.external_identity(token)?;
        let subject = external.identity.user_id();

        let user_id = match &self.directory {
            None => subject.to_owned(),
            Some(directory) => directory
                .map_distributed_id(subject, external.issuer.as_deref().unwrap_or_default())
                .await
                .map_err(|e| {
                    tracing::debug!(error = %e, "distributed identity lookup failed");
                    CredentialError::UnmappedIdentity
                })?
                .ok_or(CredentialError::UnmappedIdentity)?,
        };

        ParsedCredential::new(
            user_id,
            Origin::Other,
            external.identity.created_at(),
            external.identity.expires_at(),
        )
        .ok_or(CredentialError::UnmappedIdentity)
    }

    async fn derive_session_token(
        &self,
        credential: &Credential,
    ) -> Result<Option<String>, DomainError> {
        mint_for(self, &self.tokens, credential).await
    }
}
