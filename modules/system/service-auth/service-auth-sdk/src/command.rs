//! Authentication commands: transformations applied to an outbound request.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use auth_context::OutboundRequest;
use chrono::{DateTime, Utc};
use http::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};

use crate::error::ServiceAuthError;
use crate::models::{Credential, GatewayCookies, ServiceInstance};

/// Resolves the real command once the load balancer has picked an instance.
///
/// Implemented by the command service and captured by [`UniversalCommand`].
#[async_trait]
pub trait InstanceCommandResolver: Send + Sync {
    /// Command for `credential` against the requirement `instance` declares.
    ///
    /// # Errors
    ///
    /// Propagates generation failures from the scheme strategies.
    async fn command_for_instance(
        &self,
        instance: &ServiceInstance,
        credential: &Credential,
    ) -> Result<Arc<AuthenticationCommand>, ServiceAuthError>;
}

/// A unit of work that adapts an outbound request to a backend requirement.
#[derive(Debug)]
pub enum AuthenticationCommand {
    /// No-op.
    Empty,
    /// No-op declared explicitly by the backend.
    Bypass,
    SessionToken(SessionTokenCommand),
    PassTicket(PassTicketCommand),
    /// Deferred until a concrete instance is known. Never cached.
    Universal(UniversalCommand),
}

impl AuthenticationCommand {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::Empty | Self::Bypass | Self::Universal(_) => false,
            Self::SessionToken(cmd) => cmd.expires_at.is_some_and(|exp| now > exp),
            Self::PassTicket(cmd) => now > cmd.expires_at,
        }
    }

    #[must_use]
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Universal(_))
    }

    /// Whether the credential the command was built from must still be valid
    /// each time the command is served.
    #[must_use]
    pub fn requires_valid_source(&self) -> bool {
        matches!(self, Self::SessionToken(_) | Self::PassTicket(_))
    }

    /// Apply the command to `request`.
    ///
    /// `instance` is only needed by [`AuthenticationCommand::Universal`].
    ///
    /// # Errors
    ///
    /// [`ServiceAuthError::BackendUnresolvable`] when a deferred command is applied without
    /// an instance; generation failures from deferred resolution are propagated.
    pub async fn apply(
        &self,
        request: &mut OutboundRequest,
        instance: Option<&ServiceInstance>,
    ) -> Result<(), ServiceAuthError> {
        match self {
            Self::Universal(cmd) => {
                let instance = instance.ok_or_else(|| {
                    ServiceAuthError::BackendUnresolvable(format!(
                        "deferred command for service {} applied without an instance",
                        cmd.service_id
                    ))
                })?;
                cmd.apply(request, instance).await
            }
            other => other.apply_resolved(request),
        }
    }

    fn apply_resolved(&self, request: &mut OutboundRequest) -> Result<(), ServiceAuthError> {
        match self {
            Self::Empty | Self::Bypass => Ok(()),
            Self::SessionToken(cmd) => cmd.apply(request),
            Self::PassTicket(cmd) => cmd.apply(request),
            Self::Universal(cmd) => Err(ServiceAuthError::Internal(format!(
                "instance resolution for service {} produced another deferred command",
                cmd.service_id
            ))),
        }
    }
}

/// Replaces the gateway session cookie with a pre-generated session token.
#[derive(Debug)]
pub struct SessionTokenCommand {
    token: SecretString,
    expires_at: Option<DateTime<Utc>>,
    cookies: GatewayCookies,
}

impl SessionTokenCommand {
    #[must_use]
    pub fn new(
        token: SecretString,
        expires_at: Option<DateTime<Utc>>,
        cookies: GatewayCookies,
    ) -> Self {
        Self {
            token,
            expires_at,
            cookies,
        }
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    #[must_use]
    pub fn token(&self) -> &SecretString {
        &self.token
    }

    fn apply(&self, request: &mut OutboundRequest) -> Result<(), ServiceAuthError> {
        let written = request.remove_cookies(&[self.cookies.pat.as_str()])
            && request.set_cookie(&self.cookies.session, self.token.expose_secret());
        if !written {
            return Err(ServiceAuthError::Internal(
                "session token cookie could not be written".to_owned(),
            ));
        }
        tracing::debug!(cookie = %self.cookies.session, "session token attached to outbound request");
        Ok(())
    }
}

/// HTTP Basic authentication with a pre-generated pass-ticket.
#[derive(Debug)]
pub struct PassTicketCommand {
    user_id: String,
    pass_ticket: SecretString,
    authorization: SecretString,
    expires_at: DateTime<Utc>,
    cookies: GatewayCookies,
    /// `(user header, pass-ticket header)`; only set when both are configured.
    custom_headers: Option<(String, String)>,
}

impl PassTicketCommand {
    /// `authorization` is the complete `Authorization` header value.
    #[must_use]
    pub fn new(
        user_id: String,
        pass_ticket: SecretString,
        authorization: SecretString,
        expires_at: DateTime<Utc>,
        cookies: GatewayCookies,
    ) -> Self {
        Self {
            user_id,
            pass_ticket,
            authorization,
            expires_at,
            cookies,
            custom_headers: None,
        }
    }

    #[must_use]
    pub fn with_custom_headers(mut self, user_header: String, pass_ticket_header: String) -> Self {
        self.custom_headers = Some((user_header, pass_ticket_header));
        self
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[must_use]
    pub fn pass_ticket(&self) -> &SecretString {
        &self.pass_ticket
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    fn apply(&self, request: &mut OutboundRequest) -> Result<(), ServiceAuthError> {
        if !request.set_header(AUTHORIZATION.as_str(), self.authorization.expose_secret()) {
            return Err(ServiceAuthError::Internal(
                "pass-ticket authorization value is not a valid header".to_owned(),
            ));
        }
        if let Some((user_header, ticket_header)) = &self.custom_headers {
            tracing::debug!(
                user_header = %user_header,
                ticket_header = %ticket_header,
                "adding custom pass-ticket headers"
            );
            let written = request.set_header(user_header, &self.user_id)
                && request.set_header(ticket_header, self.pass_ticket.expose_secret());
            if !written {
                return Err(ServiceAuthError::Internal(
                    "custom pass-ticket headers could not be written".to_owned(),
                ));
            }
        }
        if !request.remove_cookies(&[self.cookies.session.as_str(), self.cookies.pat.as_str()]) {
            return Err(ServiceAuthError::Internal(
                "gateway cookies could not be stripped".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Second phase of load-balancer deferral: re-derives the real command per instance.
pub struct UniversalCommand {
    service_id: String,
    credential: Credential,
    resolver: Arc<dyn InstanceCommandResolver>,
}

impl UniversalCommand {
    #[must_use]
    pub fn new(
        service_id: impl Into<String>,
        credential: Credential,
        resolver: Arc<dyn InstanceCommandResolver>,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            credential,
            resolver,
        }
    }

    #[must_use]
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Resolve the command for `instance` and apply it.
    ///
    /// # Errors
    ///
    /// Propagates resolution and application failures.
    pub async fn apply(
        &self,
        request: &mut OutboundRequest,
        instance: &ServiceInstance,
    ) -> Result<(), ServiceAuthError> {
        let command = self
            .resolver
            .command_for_instance(instance, &self.credential)
            .await?;
        command.apply_resolved(request)
    }
}

impl fmt::Debug for UniversalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniversalCommand")
            .field("service_id", &self.service_id)
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use chrono::Duration;
    use http::HeaderMap;
    use http::header::COOKIE;
    use std::collections::HashMap;

    fn cookies() -> GatewayCookies {
        GatewayCookies {
            session: "gatewayAuthenticationToken".to_owned(),
            pat: "personalAccessToken".to_owned(),
        }
    }

    fn request_with_cookies(value: &'static str) -> OutboundRequest {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, http::HeaderValue::from_static(value));
        OutboundRequest::new(headers)
    }

    fn instance() -> ServiceInstance {
        ServiceInstance {
            instance_id: "svc-1".to_owned(),
            service_id: "svc".to_owned(),
            host: "localhost".to_owned(),
            port: 8080,
            secure_port: None,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn expiry_rules() {
        let now = Utc::now();
        assert!(!AuthenticationCommand::Empty.is_expired_at(now));
        assert!(!AuthenticationCommand::Bypass.is_expired_at(now));

        let no_expiry = AuthenticationCommand::SessionToken(SessionTokenCommand::new(
            SecretString::from("t"),
            None,
            cookies(),
        ));
        assert!(!no_expiry.is_expired_at(now));

        let ticket = AuthenticationCommand::PassTicket(PassTicketCommand::new(
            "alice".to_owned(),
            SecretString::from("PT"),
            SecretString::from("Basic x"),
            now,
            cookies(),
        ));
        assert!(!ticket.is_expired_at(now));
        assert!(ticket.is_expired_at(now + Duration::milliseconds(1)));
    }

    #[test]
    fn only_credential_bearing_commands_require_a_valid_source() {
        assert!(!AuthenticationCommand::Empty.requires_valid_source());
        assert!(!AuthenticationCommand::Bypass.requires_valid_source());
        let session = AuthenticationCommand::SessionToken(SessionTokenCommand::new(
            SecretString::from("t"),
            None,
            cookies(),
        ));
        assert!(session.requires_valid_source());
        let ticket = AuthenticationCommand::PassTicket(PassTicketCommand::new(
            "alice".to_owned(),
            SecretString::from("PT"),
            SecretString::from("Basic x"),
            Utc::now(),
            cookies(),
        ));
        assert!(ticket.requires_valid_source());
    }

    #[tokio::test]
    async fn unwritable_session_cookie_is_an_error() {
        let mut request = request_with_cookies("gatewayAuthenticationToken=old; x=1");
        let cmd = AuthenticationCommand::SessionToken(SessionTokenCommand::new(
            SecretString::from("line\nbreak"),
            None,
            cookies(),
        ));

        let err = cmd.apply(&mut request, None).await.unwrap_err();

        assert!(matches!(err, ServiceAuthError::Internal(_)));
        assert_eq!(request.cookie("gatewayAuthenticationToken"), Some("old"));
        assert_eq!(request.cookie("x"), Some("1"));
    }

    #[tokio::test]
    async fn session_token_replaces_cookie_and_drops_pat() {
        let mut request =
            request_with_cookies("gatewayAuthenticationToken=old; personalAccessToken=p; x=1");
        let cmd = AuthenticationCommand::SessionToken(SessionTokenCommand::new(
            SecretString::from("new-token"),
            None,
            cookies(),
        ));

        cmd.apply(&mut request, None).await.unwrap();

        assert_eq!(request.cookie("gatewayAuthenticationToken"), Some("new-token"));
        assert_eq!(request.cookie("personalAccessToken"), None);
        assert_eq!(request.cookie("x"), Some("1"));
    }

    #[tokio::test]
    async fn pass_ticket_sets_basic_and_strips_gateway_cookies() {
        let mut request =
            request_with_cookies("gatewayAuthenticationToken=s; personalAccessToken=p; x=1");
        let cmd = AuthenticationCommand::PassTicket(
            PassTicketCommand::new(
                "alice".to_owned(),
                SecretString::from("PT123"),
                SecretString::from("Basic YWxpY2U6UFQxMjM="),
                Utc::now(),
                cookies(),
            )
            .with_custom_headers("X-User".to_owned(), "X-PassTicket".to_owned()),
        );

        cmd.apply(&mut request, None).await.unwrap();

        assert_eq!(request.header("authorization"), Some("Basic YWxpY2U6UFQxMjM="));
        assert_eq!(request.header("x-user"), Some("alice"));
        assert_eq!(request.header("x-passticket"), Some("PT123"));
        assert_eq!(request.header("cookie"), Some("x=1"));
    }

    #[tokio::test]
    async fn pass_ticket_without_custom_headers_adds_only_authorization() {
        let mut request = OutboundRequest::default();
        let cmd = AuthenticationCommand::PassTicket(PassTicketCommand::new(
            "alice".to_owned(),
            SecretString::from("PT"),
            SecretString::from("Basic abc"),
            Utc::now(),
            cookies(),
        ));

        cmd.apply(&mut request, None).await.unwrap();
        assert_eq!(request.headers().len(), 1);
    }

    struct FixedResolver;

    #[async_trait]
    impl InstanceCommandResolver for FixedResolver {
        async fn command_for_instance(
            &self,
            instance: &ServiceInstance,
            _credential: &Credential,
        ) -> Result<Arc<AuthenticationCommand>, ServiceAuthError> {
            Ok(Arc::new(AuthenticationCommand::SessionToken(
                SessionTokenCommand::new(
                    SecretString::from(format!("for-{}", instance.instance_id)),
                    None,
                    cookies(),
                ),
            )))
        }
    }

    #[tokio::test]
    async fn universal_requires_instance() {
        let cmd = AuthenticationCommand::Universal(UniversalCommand::new(
            "svc",
            Credential::jwt("t").unwrap(),
            Arc::new(FixedResolver),
        ));
        assert!(!cmd.is_expired());
        assert!(cmd.is_deferred());

        let mut request = OutboundRequest::default();
        let err = cmd.apply(&mut request, None).await.unwrap_err();
        assert!(matches!(err, ServiceAuthError::BackendUnresolvable(_)));

        cmd.apply(&mut request, Some(&instance())).await.unwrap();
        assert_eq!(request.cookie("gatewayAuthenticationToken"), Some("for-svc-1"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let cmd = PassTicketCommand::new(
            "alice".to_owned(),
            SecretString::from("PT-SECRET"),
            SecretString::from("Basic SECRET"),
            Utc::now(),
            cookies(),
        );
        let rendered = format!("{cmd:?}");
        assert!(!rendered.contains("PT-SECRET"));
        assert!(!rendered.contains("Basic SECRET"));
    }
}
