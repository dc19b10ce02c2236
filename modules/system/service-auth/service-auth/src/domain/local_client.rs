//! Local (in-process) client for the service authentication core.

use std::sync::Arc;

use async_trait::async_trait;
use auth_context::InboundRequest;
use service_auth_sdk::{
    AuthenticationCommand, Credential, InvalidationReport, ParsedCredential, RoutingContext,
    ServiceAuthClient, ServiceAuthError,
};

use super::{DomainError, Service};

/// Local client wrapping the service.
///
/// Handed to the reverse-proxy filter chain by the module during `init()`.
pub struct ServiceAuthLocalClient {
    svc: Arc<Service>,
}

impl ServiceAuthLocalClient {
    #[must_use]
    pub fn new(svc: Arc<Service>) -> Self {
        Self { svc }
    }
}

fn log_and_convert(op: &str, e: DomainError) -> ServiceAuthError {
    tracing::error!(operation = op, error = ?e, "service_auth call failed");
    e.into()
}

#[async_trait]
impl ServiceAuthClient for ServiceAuthLocalClient {
    async fn resolve_credential(&self, request: &InboundRequest) -> Option<Credential> {
        self.svc.resolve_credential(request)
    }

    async fn get_command(
        &self,
        service_id: &str,
        credential: &Credential,
        routing: &mut RoutingContext,
    ) -> Result<Arc<AuthenticationCommand>, ServiceAuthError> {
        self.svc
            .get_command(service_id, credential, routing)
            .await
            .map_err(|e| log_and_convert("get_command", e))
    }

    async fn create_session_token(
        &self,
        user_id: &str,
        domain: &str,
        legacy_token: Option<&str>,
    ) -> Result<String, ServiceAuthError> {
        self.svc
            .create_session_token(user_id, domain, legacy_token)
            .map_err(|e| log_and_convert("create_session_token", e))
    }

    async fn validate_token(&self, token: &str) -> Result<ParsedCredential, ServiceAuthError> {
        // Rejected tokens are not logged as errors.
        self.svc.validate_token(token).await.map_err(Into::into)
    }

    async fn invalidate_token(&self, token: &str, distribute: bool) -> InvalidationReport {
        let report = self.svc.invalidate_token(token, distribute).await;
        if !report.unreachable.is_empty() {
            tracing::warn!(
                unreachable = report.unreachable.len(),
                notified = report.notified.len(),
                "token invalidated locally, some peers were not reached"
            );
        }
        report
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::ServiceAuthConfig;
    use crate::module::{Collaborators, ServiceAuthModule};
    use secrecy::SecretString;
    use service_auth_sdk::{
        AuthScheme, PassTicketError, PassTicketGenerator, PeerError, PeerInvalidationClient,
        RegistryError, ServiceInstance, ServiceRegistryClient,
    };
    use std::collections::HashMap;
    use tracing_test::traced_test;

    struct OneInstance;

    #[async_trait]
    impl ServiceRegistryClient for OneInstance {
        async fn get_instances(&self, service_id: &str) -> Result<Vec<ServiceInstance>, RegistryError> {
            Ok(vec![ServiceInstance {
                instance_id: format!("{service_id}-1"),
                service_id: service_id.to_owned(),
                host: "localhost".to_owned(),
                port: 8080,
                secure_port: None,
                metadata: HashMap::from([
                    ("authentication.scheme".to_owned(), AuthScheme::PASS_TICKET.to_owned()),
                    ("authentication.applid".to_owned(), "IZUDFLT".to_owned()),
                ]),
            }])
        }
    }

    struct Refusing;

    #[async_trait]
    impl PassTicketGenerator for Refusing {
        async fn generate(
            &self,
            user_id: &str,
            application_id: &str,
        ) -> Result<SecretString, PassTicketError> {
            Err(PassTicketError {
                user_id: user_id.to_owned(),
                application_id: application_id.to_owned(),
                reason: "user revoked".to_owned(),
            })
        }
    }

    struct Unreachable;

    #[async_trait]
    impl PeerInvalidationClient for Unreachable {
        async fn invalidate(&self, _: &ServiceInstance, _: &str) -> Result<(), PeerError> {
            Err(PeerError::Unreachable("connection refused".to_owned()))
        }
    }

    fn module() -> ServiceAuthModule {
        let mut config = ServiceAuthConfig::default();
        config.token.secret = SecretString::from("unit-test-secret");
        config.cluster.instance_id = "gw-1".to_owned();
        let collaborators = Collaborators::new(Arc::new(OneInstance), Arc::new(Refusing))
            .with_peers(Arc::new(Unreachable));
        ServiceAuthModule::init(config, collaborators).unwrap()
    }

    #[tokio::test]
    #[traced_test]
    async fn generation_failure_is_logged_and_converted() {
        let module = module();
        let client = module.client();
        let token = client.create_session_token("alice", "SAFDOM", None).await.unwrap();
        let credential = Credential::jwt(&token).unwrap();

        let err = client
            .get_command("orders", &credential, &mut RoutingContext::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceAuthError::DownstreamGenerationFailed(_)));
        assert!(logs_contain("service_auth call failed"));
        assert!(logs_contain("get_command"));
    }

    #[tokio::test]
    #[traced_test]
    async fn rejected_tokens_are_not_logged_as_errors() {
        let module = module();

        let err = module.client().validate_token("not-a-token").await.unwrap_err();

        assert!(matches!(err, ServiceAuthError::TokenInvalid(_)));
        assert!(!logs_contain("service_auth call failed"));
    }

    #[tokio::test]
    #[traced_test]
    async fn unreachable_peers_are_reported() {
        let module = module();
        let client = module.client();
        let token = client.create_session_token("alice", "SAFDOM", None).await.unwrap();

        let report = client.invalidate_token(&token, true).await;

        assert_eq!(report.unreachable, vec!["gateway-1".to_owned()]);
        assert!(logs_contain("some peers were not reached"));
        assert!(client.validate_token(&token).await.is_err());
    }
}
