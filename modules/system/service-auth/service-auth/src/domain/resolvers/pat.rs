use std::sync::Arc;

use async_trait::async_trait;
use auth_context::InboundRequest;
use service_auth_sdk::{Credential, CredentialKind, Origin, ParsedCredential};

use super::{CredentialResolver, mint_for};
use crate::config::CookieConfig;
use crate::domain::error::{CredentialError, DomainError};
use crate::domain::token_service::TokenService;

/// Personal access tokens, from the dedicated header, the dedicated cookie, or a
/// bearer token issued as an access token.
pub struct PatResolver {
    tokens: Arc<TokenService>,
    header: String,
    cookie: String,
    service_id_header: String,
}

impl PatResolver {
    #[must_use]
    pub fn new(tokens: Arc<TokenService>, cookies: &CookieConfig) -> Self {
        Self {
            tokens,
            header: cookies.pat_header.clone(),
            cookie: cookies.pat_cookie.clone(),
            service_id_header: cookies.service_id_header.clone(),
        }
    }

    fn raw<'a>(&self, request: &'a InboundRequest) -> Option<&'a str> {
        request
            .header(&self.header)
            .or_else(|| request.cookie(&self.cookie))
            .or_else(|| {
                request.bearer_token().filter(|bearer| {
                    matches!(self.tokens.token_origin(bearer), Ok(Origin::ZowePat))
                })
            })
    }
}

#[async_trait]
impl CredentialResolver for PatResolver {
    fn kind(&self) -> CredentialKind {
        CredentialKind::PersonalAccessToken
    }

    fn extract(&self, request: &InboundRequest) -> Option<Credential> {
        let token = self.raw(request)?;
        Credential::personal_access_token(token, request.header(&self.service_id_header))
    }

    async fn validate(&self, credential: &Credential) -> Result<(), CredentialError> {
        self.identify(credential).await.map(|_| ())
    }

    async fn identify(&self, credential: &Credential) -> Result<ParsedCredential, CredentialError> {
        let Credential::PersonalAccessToken { token, service_id } = credential else {
            return Err(CredentialError::WrongKind);
        };
        let service_id = service_id.as_deref().ok_or_else(|| {
            CredentialError::Malformed("request does not name a target service".to_owned())
        })?;
        self.tokens.validate_access_token(token, service_id)
    }

    async fn derive_session_token(
        &self,
        credential: &Credential,
    ) -> Result<Option<String>, DomainError> {
        mint_for(self, &self.tokens, credential).await
    }
}
