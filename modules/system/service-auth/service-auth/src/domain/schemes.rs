//! Scheme strategies: build the command a backend requirement asks for.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use service_auth_sdk::{
    AuthScheme, AuthenticationCommand, BackendRequirement, Credential, GatewayCookies,
    PassTicketCommand, PassTicketGenerator, SessionTokenCommand,
};

use super::broker::CredentialBroker;
use super::error::DomainError;
use super::token_service::TokenService;
use crate::config::PassTicketConfig;

/// Creates commands for each supported [`AuthScheme`].
pub struct SchemeFactory {
    broker: Arc<CredentialBroker>,
    tokens: Arc<TokenService>,
    pass_tickets: Arc<dyn PassTicketGenerator>,
    pass_ticket_ttl: TimeDelta,
    custom_headers: Option<(String, String)>,
    cookies: GatewayCookies,
}

impl SchemeFactory {
    /// # Errors
    ///
    /// Returns [`DomainError::Internal`] when the pass-ticket TTL does not fit a time delta.
    pub fn new(
        broker: Arc<CredentialBroker>,
        tokens: Arc<TokenService>,
        pass_tickets: Arc<dyn PassTicketGenerator>,
        config: &PassTicketConfig,
        cookies: GatewayCookies,
    ) -> Result<Self, DomainError> {
        let pass_ticket_ttl = i64::try_from(config.ttl_millis)
            .ok()
            .and_then(TimeDelta::try_milliseconds)
            .ok_or_else(|| DomainError::Internal("pass-ticket ttl out of range".to_owned()))?;
        Ok(Self {
            broker,
            tokens,
            pass_tickets,
            pass_ticket_ttl,
            custom_headers: config.custom_headers(),
            cookies,
        })
    }

    #[must_use]
    pub fn broker(&self) -> &CredentialBroker {
        &self.broker
    }

    /// Generate a fresh command for `requirement`. Nothing is cached here.
    ///
    /// # Errors
    ///
    /// - [`DomainError::CredentialInvalid`] when the scheme needs an identity and the credential does not parse
    /// - [`DomainError::MissingApplicationId`] for pass-tickets without an application id
    /// - [`DomainError::PassTicket`] or [`DomainError::Legacy`] when downstream generation fails
    pub async fn create(
        &self,
        requirement: &BackendRequirement,
        credential: &Credential,
    ) -> Result<AuthenticationCommand, DomainError> {
        match requirement.scheme {
            AuthScheme::Bypass => Ok(AuthenticationCommand::Bypass),
            AuthScheme::SessionToken => self.session_token(credential).await,
            AuthScheme::PassTicket => {
                let application_id = requirement
                    .application_id
                    .as_deref()
                    .ok_or(DomainError::MissingApplicationId)?;
                self.pass_ticket(application_id, credential).await
            }
            AuthScheme::None => Ok(AuthenticationCommand::Empty),
        }
    }

    async fn session_token(
        &self,
        credential: &Credential,
    ) -> Result<AuthenticationCommand, DomainError> {
        let token = self
            .broker
            .derive_session_token(credential)
            .await?
            .ok_or(DomainError::CredentialInvalid {
                kind: credential.kind(),
            })?;
        let expires_at = self.tokens.validate(&token).await?.expires_at();

        Ok(AuthenticationCommand::SessionToken(SessionTokenCommand::new(
            SecretString::from(token),
            expires_at,
            self.cookies.clone(),
        )))
    }

    async fn pass_ticket(
        &self,
        application_id: &str,
        credential: &Credential,
    ) -> Result<AuthenticationCommand, DomainError> {
        let identity = self
            .broker
            .parse(credential)
            .await
            .ok_or(DomainError::CredentialInvalid {
                kind: credential.kind(),
            })?;
        let user_id = identity.user_id();

        tracing::debug!(application_id, "generating pass-ticket");
        let pass_ticket = self.pass_tickets.generate(user_id, application_id).await?;
        let encoded = STANDARD.encode(format!("{user_id}:{}", pass_ticket.expose_secret()));
        let authorization = SecretString::from(format!("Basic {encoded}"));

        let mut command = PassTicketCommand::new(
            user_id.to_owned(),
            pass_ticket,
            authorization,
            Utc::now() + self.pass_ticket_ttl,
            self.cookies.clone(),
        );
        if let Some((user_header, ticket_header)) = &self.custom_headers {
            command = command.with_custom_headers(user_header.clone(), ticket_header.clone());
        }
        Ok(AuthenticationCommand::PassTicket(command))
    }
}
