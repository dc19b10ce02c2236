#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for credential resolution with the real resolvers
//!
//! These tests verify that:
//! 1. Session tokens win over every other credential
//! 2. Personal access tokens are only accepted when enabled and scoped for the target
//! 3. OIDC tokens are vouched for by introspection and mapped through the directory

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use auth_context::{InboundRequest, PeerCertificate};
use chrono::Utc;
use common::{Harness, config, harness, harness_with, instance};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::json;
use service_auth::{Collaborators, ServiceAuthModule};
use service_auth_sdk::{
    AuthScheme, CredentialKind, DirectoryError, OidcIntrospectionClient, Origin, RoutingContext,
    ServiceAuthError, UserDirectory,
};
use static_registry_plugin::StaticServiceRegistry;

const PAT_HEADER: &str = "X-Personal-Access-Token";
const SERVICE_HEADER: &str = "X-Service-Id";

fn pat_harness() -> Harness {
    let mut cfg = config();
    cfg.resolvers.pat_enabled = true;
    harness(
        cfg,
        vec![
            instance("orders-1", "orders", Some(AuthScheme::PASS_TICKET), Some("ORDERS")),
            instance("billing-1", "billing", Some(AuthScheme::PASS_TICKET), Some("BILLING")),
        ],
    )
}

fn access_token(h: &Harness, user: &str, scopes: &[&str]) -> String {
    let scopes: Vec<String> = scopes.iter().map(|s| (*s).to_owned()).collect();
    h.module
        .service()
        .tokens()
        .create_personal_access_token(user, 30, &scopes)
        .unwrap()
}

fn foreign_token(issuer: &str, subject: &str) -> String {
    let now = Utc::now().timestamp();
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS512),
        &json!({"sub": subject, "iss": issuer, "iat": now, "exp": now + 600}),
        &EncodingKey::from_secret(b"idp-signing-key"),
    )
    .unwrap()
}

#[tokio::test]
async fn session_cookie_wins_over_access_token() {
    let h = pat_harness();
    let session = h
        .module
        .service()
        .create_session_token("alice", "SAFDOM", None)
        .unwrap();
    let pat = access_token(&h, "bob", &["orders"]);
    let request = InboundRequest::builder()
        .cookie("gatewayAuthenticationToken", &session)
        .header(PAT_HEADER, &pat)
        .build();

    let credential = h.module.client().resolve_credential(&request).await.unwrap();
    assert_eq!(credential.kind(), CredentialKind::Jwt);
    assert_eq!(credential.token(), Some(session.as_str()));
}

#[tokio::test]
async fn access_tokens_are_ignored_when_disabled() {
    let h = harness(config(), Vec::new());
    let pat = access_token(&h, "alice", &["orders"]);
    let request = InboundRequest::builder()
        .header(PAT_HEADER, &pat)
        .header(SERVICE_HEADER, "orders")
        .build();

    assert!(h.module.client().resolve_credential(&request).await.is_none());
    assert!(
        !h.module
            .service()
            .broker()
            .kinds()
            .contains(&CredentialKind::PersonalAccessToken)
    );
}

#[tokio::test]
async fn scoped_access_token_parses_for_its_service() {
    let h = pat_harness();
    let pat = access_token(&h, "alice", &["Orders"]);
    let broker = h.module.service().broker();

    let for_orders = InboundRequest::builder()
        .header(PAT_HEADER, &pat)
        .header(SERVICE_HEADER, "orders")
        .build();
    let credential = broker.resolve(&for_orders).unwrap();
    assert_eq!(credential.kind(), CredentialKind::PersonalAccessToken);
    let parsed = broker.parse(&credential).await.unwrap();
    assert_eq!(parsed.user_id(), "alice");
    assert_eq!(parsed.origin(), Origin::ZowePat);

    let for_billing = InboundRequest::builder()
        .header(PAT_HEADER, &pat)
        .header(SERVICE_HEADER, "billing")
        .build();
    let credential = broker.resolve(&for_billing).unwrap();
    assert!(!broker.is_valid(&credential).await);
    assert!(broker.parse(&credential).await.is_none());
}

#[tokio::test]
async fn access_token_is_accepted_as_bearer_or_cookie() {
    let h = pat_harness();
    let pat = access_token(&h, "alice", &["orders"]);
    let broker = h.module.service().broker();

    let bearer = InboundRequest::builder()
        .bearer(&pat)
        .header(SERVICE_HEADER, "orders")
        .build();
    let credential = broker.resolve(&bearer).unwrap();
    assert_eq!(credential.kind(), CredentialKind::PersonalAccessToken);
    assert!(broker.is_valid(&credential).await);

    let cookie = InboundRequest::builder()
        .cookie("personalAccessToken", &pat)
        .header(SERVICE_HEADER, "orders")
        .build();
    let credential = broker.resolve(&cookie).unwrap();
    assert_eq!(credential.kind(), CredentialKind::PersonalAccessToken);
}

#[tokio::test]
async fn revoked_access_token_is_rejected() {
    let h = pat_harness();
    let pat = access_token(&h, "alice", &["orders"]);
    let broker = h.module.service().broker();
    let request = InboundRequest::builder()
        .header(PAT_HEADER, &pat)
        .header(SERVICE_HEADER, "orders")
        .build();
    let credential = broker.resolve(&request).unwrap();
    assert!(broker.is_valid(&credential).await);

    h.module.service().tokens().revoke_access_token(&pat);

    assert!(!broker.is_valid(&credential).await);
}

#[tokio::test]
async fn access_token_commands_are_kept_apart_per_service() {
    let h = pat_harness();
    let pat = access_token(&h, "alice", &["orders", "billing"]);
    let client = h.module.client();
    let mut routing = RoutingContext::default();

    for service in ["orders", "billing", "orders"] {
        let request = InboundRequest::builder()
            .header(PAT_HEADER, &pat)
            .header(SERVICE_HEADER, service)
            .build();
        let credential = client.resolve_credential(&request).await.unwrap();
        client
            .get_command(service, &credential, &mut routing)
            .await
            .unwrap();
    }

    assert_eq!(
        h.tickets.calls(),
        vec![
            ("alice".to_owned(), "ORDERS".to_owned()),
            ("alice".to_owned(), "BILLING".to_owned()),
        ]
    );
}

#[tokio::test]
async fn out_of_scope_access_token_cannot_reach_a_backend() {
    let h = pat_harness();
    let pat = access_token(&h, "alice", &["orders"]);
    let client = h.module.client();
    let request = InboundRequest::builder()
        .header(PAT_HEADER, &pat)
        .header(SERVICE_HEADER, "billing")
        .build();
    let credential = client.resolve_credential(&request).await.unwrap();

    let mut routing = RoutingContext::default();
    let err = client
        .get_command("billing", &credential, &mut routing)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceAuthError::CredentialInvalid(_)));
    assert_eq!(h.tickets.count(), 0);
}

#[tokio::test]
async fn access_token_cannot_be_routed_to_a_service_outside_its_scope() {
    let h = pat_harness();
    let pat = access_token(&h, "alice", &["orders"]);
    let client = h.module.client();
    let request = InboundRequest::builder()
        .header(PAT_HEADER, &pat)
        .header(SERVICE_HEADER, "orders")
        .build();
    let credential = client.resolve_credential(&request).await.unwrap();

    let mut routing = RoutingContext::default();
    let err = client
        .get_command("billing", &credential, &mut routing)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceAuthError::CredentialInvalid(_)));
    assert_eq!(h.tickets.count(), 0);

    client
        .get_command("ORDERS", &credential, &mut routing)
        .await
        .unwrap();
    assert_eq!(
        h.tickets.calls(),
        vec![("alice".to_owned(), "ORDERS".to_owned())]
    );
}

#[tokio::test]
async fn access_token_without_a_target_is_checked_against_the_routed_service() {
    let h = pat_harness();
    let pat = access_token(&h, "alice", &["orders"]);
    let client = h.module.client();
    let request = InboundRequest::builder().header(PAT_HEADER, &pat).build();
    let credential = client.resolve_credential(&request).await.unwrap();

    let mut routing = RoutingContext::default();
    let err = client
        .get_command("billing", &credential, &mut routing)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceAuthError::CredentialInvalid(_)));

    client
        .get_command("orders", &credential, &mut routing)
        .await
        .unwrap();
    assert_eq!(h.tickets.count(), 1);
}

struct Introspection(bool);

#[async_trait]
impl OidcIntrospectionClient for Introspection {
    async fn is_valid(&self, _token: &str) -> bool {
        self.0
    }
}

struct Directory;

#[async_trait]
impl UserDirectory for Directory {
    async fn map_certificate(
        &self,
        _certificate: &PeerCertificate,
    ) -> Result<Option<String>, DirectoryError> {
        Ok(None)
    }

    async fn map_distributed_id(
        &self,
        subject: &str,
        registry: &str,
    ) -> Result<Option<String>, DirectoryError> {
        Ok((subject == "alice@example.com" && registry == "https://idp.example.com")
            .then(|| "ALICE01".to_owned()))
    }
}

fn oidc_harness(valid: bool, directory: bool) -> Harness {
    let mut cfg = config();
    cfg.resolvers.oidc_enabled = true;
    harness_with(
        cfg,
        vec![instance("orders-1", "orders", Some(AuthScheme::PASS_TICKET), Some("ORDERS"))],
        |c| {
            let c = c.with_introspection(Arc::new(Introspection(valid)));
            if directory { c.with_directory(Arc::new(Directory)) } else { c }
        },
    )
}

#[tokio::test]
async fn introspected_oidc_token_is_mapped_to_a_mainframe_user() {
    let h = oidc_harness(true, true);
    let token = foreign_token("https://idp.example.com", "alice@example.com");
    let request = InboundRequest::builder().bearer(&token).build();
    let client = h.module.client();

    let credential = client.resolve_credential(&request).await.unwrap();
    assert_eq!(credential.kind(), CredentialKind::Oidc);

    let mut routing = RoutingContext::default();
    client
        .get_command("orders", &credential, &mut routing)
        .await
        .unwrap();
    assert_eq!(
        h.tickets.calls(),
        vec![("ALICE01".to_owned(), "ORDERS".to_owned())]
    );
}

#[tokio::test]
async fn oidc_subject_is_used_without_a_directory() {
    let h = oidc_harness(true, false);
    let token = foreign_token("https://idp.example.com", "alice");
    let broker = h.module.service().broker();
    let credential = broker
        .resolve(&InboundRequest::builder().bearer(&token).build())
        .unwrap();

    let parsed = broker.parse(&credential).await.unwrap();
    assert_eq!(parsed.user_id(), "alice");
}

#[tokio::test]
async fn unmapped_oidc_subject_is_not_parsed() {
    let h = oidc_harness(true, true);
    let token = foreign_token("https://idp.example.com", "mallory@example.com");
    let broker = h.module.service().broker();
    let credential = broker
        .resolve(&InboundRequest::builder().bearer(&token).build())
        .unwrap();

    assert!(broker.parse(&credential).await.is_none());
}

#[tokio::test]
async fn oidc_token_rejected_by_introspection_is_invalid() {
    let h = oidc_harness(false, false);
    let token = foreign_token("https://idp.example.com", "alice");
    let broker = h.module.service().broker();
    let request = InboundRequest::builder().bearer(&token).build();
    let credential = broker.resolve(&request).unwrap();

    assert!(!broker.is_valid(&credential).await);
    assert!(broker.resolve_valid(&request).await.is_none());
}

#[tokio::test]
async fn gateway_bearer_token_is_never_taken_for_oidc() {
    let h = oidc_harness(true, false);
    let session = h
        .module
        .service()
        .create_session_token("alice", "SAFDOM", None)
        .unwrap();
    let request = InboundRequest::builder().bearer(&session).build();

    let credential = h.module.service().broker().resolve(&request).unwrap();
    assert_eq!(credential.kind(), CredentialKind::Jwt);
}

#[test]
fn oidc_requires_an_introspection_client() {
    let mut cfg = config();
    cfg.resolvers.oidc_enabled = true;
    let registry = Arc::new(StaticServiceRegistry::new(Vec::new()));
    let collaborators = Collaborators::new(registry, Arc::new(common::CountingTickets::default()))
        .with_peers(Arc::new(common::NoPeers));

    let err = ServiceAuthModule::init(cfg, collaborators).err().unwrap();
    assert!(err.to_string().contains("introspection"));
}
