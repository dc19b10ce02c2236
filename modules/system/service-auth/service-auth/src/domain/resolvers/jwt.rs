use std::sync::Arc;

use async_trait::async_trait;
use auth_context::InboundRequest;
use service_auth_sdk::{Credential, CredentialKind, Origin, ParsedCredential};

use super::{CredentialResolver, mint_for};
use crate::domain::error::{CredentialError, DomainError};
use crate::domain::token_service::TokenService;

/// Gateway session tokens, and tokens issued by the legacy provider.
///
/// The session cookie is always claimed. A bearer token is claimed only when its
/// issuer is this gateway or the legacy provider, so access tokens and OIDC tokens
/// fall through to their own resolvers.
pub struct JwtResolver {
    tokens: Arc<TokenService>,
    session_cookie: String,
}

impl JwtResolver {
    #[must_use]
    pub fn new(tokens: Arc<TokenService>, session_cookie: impl Into<String>) -> Self {
        Self {
            tokens,
            session_cookie: session_cookie.into(),
        }
    }

    fn token<'a>(credential: &'a Credential) -> Result<&'a str, CredentialError> {
        match credential {
            Credential::Jwt(token) => Ok(token),
            _ => Err(CredentialError::WrongKind),
        }
    }
}

#[async_trait]
impl CredentialResolver for JwtResolver {
    fn kind(&self) -> CredentialKind {
        CredentialKind::Jwt
    }

    fn extract(&self, request: &InboundRequest) -> Option<Credential> {
        if let Some(credential) = request.cookie(&self.session_cookie).and_then(Credential::jwt) {
            return Some(credential);
        }
        let bearer = request.bearer_token()?;
        match self.tokens.token_origin(bearer) {
            Ok(Origin::Zowe | Origin::Zosmf) => Credential::jwt(bearer),
            _ => None,
        }
    }

    async fn validate(&self, credential: &Credential) -> Result<(), CredentialError> {
        self.identify(credential).await.map(|_| ())
    }

    async fn identify(&self, credential: &Credential) -> Result<ParsedCredential, CredentialError> {
        let token = Self::token(credential)?;
        Ok(self.tokens.validate(token).await?)
    }

    async fn derive_session_token(
        &self,
        credential: &Credential,
    ) -> Result<Option<String>, DomainError> {
        let Some(parsed) = self.parse(credential).await else {
            return Ok(None);
        };
        match (parsed.origin(), credential) {
            (Origin::Zowe, Credential::Jwt(token)) => Ok(Some(token.clone())),
            _ => mint_for(self, &self.tokens, credential).await,
        }
    }
}
