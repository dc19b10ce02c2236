//! Domain facade used by the local client and the invalidation endpoint.

use std::sync::Arc;

use auth_context::InboundRequest;
use service_auth_sdk::{
    AuthenticationCommand, Credential, InvalidationReport, ParsedCredential, RoutingContext,
};

use super::broker::CredentialBroker;
use super::command_service::CommandService;
use super::error::DomainError;
use super::token_service::TokenService;

pub struct Service {
    broker: Arc<CredentialBroker>,
    commands: Arc<CommandService>,
    tokens: Arc<TokenService>,
}

impl Service {
    #[must_use]
    pub fn new(
        broker: Arc<CredentialBroker>,
        commands: Arc<CommandService>,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self {
            broker,
            commands,
            tokens,
        }
    }

    #[must_use]
    pub fn broker(&self) -> &Arc<CredentialBroker> {
        &self.broker
    }

    #[must_use]
    pub fn commands(&self) -> &Arc<CommandService> {
        &self.commands
    }

    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    #[must_use]
    pub fn resolve_credential(&self, request: &InboundRequest) -> Option<Credential> {
        self.broker.resolve(request)
    }

    /// # Errors
    ///
    /// See [`CommandService::get_service_command`].
    pub async fn get_command(
        &self,
        service_id: &str,
        credential: &Credential,
        routing: &mut RoutingContext,
    ) -> Result<Arc<AuthenticationCommand>, DomainError> {
        self.commands
            .get_service_command(service_id, credential, routing)
            .await
    }

    /// # Errors
    ///
    /// Returns [`DomainError::Signing`] if encoding fails.
    pub fn create_session_token(
        &self,
        user_id: &str,
        domain: &str,
        legacy_token: Option<&str>,
    ) -> Result<String, DomainError> {
        self.tokens.create_session_token(user_id, domain, legacy_token)
    }

    /// # Errors
    ///
    /// Returns [`DomainError::Token`] when the token is invalid or expired.
    pub async fn validate_token(&self, token: &str) -> Result<ParsedCredential, DomainError> {
        Ok(self.tokens.validate(token).await?)
    }

    pub async fn invalidate_token(&self, token: &str, distribute: bool) -> InvalidationReport {
        self.tokens.invalidate(token, distribute).await
    }

    /// # Errors
    ///
    /// Returns [`DomainError::Registry`] when peers cannot be enumerated.
    pub async fn distribute_invalidated(&self, to_instance_id: &str) -> Result<bool, DomainError> {
        self.tokens.distribute_invalidated(to_instance_id).await
    }
}
