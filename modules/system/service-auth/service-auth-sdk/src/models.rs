//! Domain models for the `service_auth` module.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use auth_context::PeerCertificate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discriminant of a [`Credential`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    Jwt,
    X509,
    PersonalAccessToken,
    Oidc,
}

impl CredentialKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jwt => "jwt",
            Self::X509 => "x509",
            Self::PersonalAccessToken => "pat",
            Self::Oidc => "oidc",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound authentication evidence, not yet validated.
///
/// Token-carrying variants are never empty when built through the constructors.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Jwt(String),
    X509(PeerCertificate),
    PersonalAccessToken {
        token: String,
        /// Service the request targets; PAT scopes are checked against it.
        service_id: Option<String>,
    },
    Oidc(String),
}

fn non_empty(token: &str) -> Option<String> {
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_owned())
}

impl Credential {
    #[must_use]
    pub fn jwt(token: &str) -> Option<Self> {
        non_empty(token).map(Self::Jwt)
    }

    #[must_use]
    pub fn oidc(token: &str) -> Option<Self> {
        non_empty(token).map(Self::Oidc)
    }

    #[must_use]
    pub fn personal_access_token(token: &str, service_id: Option<&str>) -> Option<Self> {
        non_empty(token).map(|token| Self::PersonalAccessToken {
            token,
            service_id: service_id.and_then(non_empty),
        })
    }

    /// Certificates with no DER bytes are rejected.
    #[must_use]
    pub fn x509(certificate: PeerCertificate) -> Option<Self> {
        (!certificate.der().is_empty()).then_some(Self::X509(certificate))
    }

    #[must_use]
    pub fn kind(&self) -> CredentialKind {
        match self {
            Self::Jwt(_) => CredentialKind::Jwt,
            Self::X509(_) => CredentialKind::X509,
            Self::PersonalAccessToken { .. } => CredentialKind::PersonalAccessToken,
            Self::Oidc(_) => CredentialKind::Oidc,
        }
    }

    /// Raw token for token-based credentials, `None` for certificates.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Jwt(token) | Self::Oidc(token) | Self::PersonalAccessToken { token, .. } => {
                Some(token)
            }
            Self::X509(_) => None,
        }
    }

    #[must_use]
    pub fn certificate(&self) -> Option<&PeerCertificate> {
        match self {
            Self::X509(cert) => Some(cert),
            _ => None,
        }
    }

    /// The credential as presented to `service_id`.
    ///
    /// A personal access token naming another target service (compared
    /// case-insensitively) yields `None`. One naming no target is bound to `service_id`.
    /// Other credentials are returned as they are.
    #[must_use]
    pub fn for_service(&self, service_id: &str) -> Option<Cow<'_, Self>> {
        match self {
            Self::PersonalAccessToken {
                token,
                service_id: None,
            } => Some(Cow::Owned(Self::PersonalAccessToken {
                token: token.clone(),
                service_id: Some(service_id.to_owned()),
            })),
            Self::PersonalAccessToken {
                service_id: Some(target),
                ..
            } if !target.eq_ignore_ascii_case(service_id) => None,
            other => Some(Cow::Borrowed(other)),
        }
    }

    /// Identity of the raw evidence, used as part of the command cache key.
    #[must_use]
    pub fn cache_key(&self) -> CredentialKey {
        match self {
            Self::X509(cert) => CredentialKey::Certificate(cert.fingerprint()),
            Self::PersonalAccessToken { token, service_id } => CredentialKey::AccessToken {
                token: token.clone(),
                service_id: service_id.clone(),
            },
            other => CredentialKey::Token(other.kind(), other.token().unwrap_or_default().to_owned()),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X509(cert) => f.debug_tuple("X509").field(cert).finish(),
            Self::PersonalAccessToken { service_id, .. } => f
                .debug_struct("PersonalAccessToken")
                .field("token", &"[REDACTED]")
                .field("service_id", service_id)
                .finish(),
            Self::Jwt(_) => f.write_str("Jwt([REDACTED])"),
            Self::Oidc(_) => f.write_str("Oidc([REDACTED])"),
        }
    }
}

/// Hashable identity of raw credential evidence.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum CredentialKey {
    Token(CredentialKind, String),
    /// Access tokens are scoped, so the target service is part of the identity.
    AccessToken {
        token: String,
        service_id: Option<String>,
    },
    /// SHA-256 fingerprint of the DER certificate.
    Certificate(String),
}

impl fmt::Debug for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(kind, _) => write!(f, "Token({kind}, [REDACTED])"),
            Self::AccessToken { service_id, .. } => {
                write!(f, "AccessToken([REDACTED], {service_id:?})")
            }
            Self::Certificate(fp) => write!(f, "Certificate({fp})"),
        }
    }
}

/// Issuing system of a parsed credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Origin {
    /// Session token minted by this gateway.
    Zowe,
    /// Personal access token minted by this gateway.
    ZowePat,
    /// Token minted by the legacy authentication provider.
    Zosmf,
    Other,
    X509,
}

/// Certificate-specific fields of a [`ParsedCredential`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateDetails {
    /// Hex-encoded SHA-256 of the subject public key info.
    pub public_key_fingerprint: String,
    pub distinguished_name: String,
    /// Standard base64 of the DER certificate.
    pub encoded: String,
}

/// Normalized identity obtained by parsing a valid [`Credential`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCredential {
    user_id: String,
    created_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    origin: Origin,
    certificate: Option<CertificateDetails>,
}

impl ParsedCredential {
    /// Returns `None` when `user_id` is blank or when `expires_at` is not after `created_at`.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        origin: Origin,
        created_at: Option<DateTime<Utc>>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Option<Self> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return None;
        }
        if let (Some(created), Some(expires)) = (created_at, expires_at)
            && expires <= created
        {
            return None;
        }
        Some(Self {
            user_id,
            created_at,
            expires_at,
            origin,
            certificate: None,
        })
    }

    #[must_use]
    pub fn with_certificate(mut self, details: CertificateDetails) -> Self {
        self.certificate = Some(details);
        self
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    #[must_use]
    pub fn origin(&self) -> Origin {
        self.origin
    }

    #[must_use]
    pub fn certificate(&self) -> Option<&CertificateDetails> {
        self.certificate.as_ref()
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

/// Outbound authentication scheme a backend instance declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// Forward the request untouched.
    Bypass,
    /// Backend expects a gateway session token cookie.
    SessionToken,
    /// Backend expects HTTP Basic with a mainframe pass-ticket.
    PassTicket,
    /// Nothing declared, or a scheme this gateway does not handle.
    None,
}

impl AuthScheme {
    pub const BYPASS: &'static str = "bypass";
    pub const SESSION_TOKEN: &'static str = "zoweJwt";
    pub const PASS_TICKET: &'static str = "httpBasicPassTicket";

    /// Map a registry metadata value to a scheme. Unknown values map to [`AuthScheme::None`].
    #[must_use]
    pub fn from_metadata(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(Self::BYPASS) => Self::Bypass,
            Some(Self::SESSION_TOKEN) => Self::SessionToken,
            Some(Self::PASS_TICKET) => Self::PassTicket,
            _ => Self::None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bypass => Self::BYPASS,
            Self::SessionToken => Self::SESSION_TOKEN,
            Self::PassTicket => Self::PASS_TICKET,
            Self::None => "none",
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a backend expects on inbound requests. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendRequirement {
    pub scheme: AuthScheme,
    pub application_id: Option<String>,
}

impl BackendRequirement {
    #[must_use]
    pub fn new(scheme: AuthScheme, application_id: Option<&str>) -> Self {
        Self {
            scheme,
            application_id: application_id
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned),
        }
    }
}

/// A live instance of a registered service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceInstance {
    pub instance_id: String,
    pub service_id: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub secure_port: Option<u16>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ServiceInstance {
    /// `https` on the secure port when one is declared, `http` on the plain port otherwise.
    #[must_use]
    pub fn base_url(&self) -> String {
        match self.secure_port {
            Some(port) => format!("https://{}:{port}", self.host),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }

    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Registry change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// Metadata or instance set of one service changed.
    ServiceChanged(String),
    /// Full registry refresh.
    Refreshed,
}

/// Names of the gateway's own cookies, stripped before custom authentication is added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCookies {
    pub session: String,
    pub pat: String,
}

/// Outcome of a distributed invalidation.
///
/// Local invalidation has already succeeded when a report exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    /// Instance ids of peers that acknowledged the invalidation.
    pub notified: Vec<String>,
    /// Instance ids of peers that failed or timed out.
    pub unreachable: Vec<String>,
}

impl InvalidationReport {
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.notified.len() + self.unreachable.len()
    }
}
