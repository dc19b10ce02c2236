use std::sync::Arc;

use async_trait::async_trait;
use auth_context::{InboundRequest, PeerCertificate};
use chrono::DateTime;
use service_auth_sdk::{
    CertificateDetails, Credential, CredentialKind, Origin, ParsedCredential, UserDirectory,
};
use sha2::{Digest, Sha256};
use x509_parser::certificate::X509Certificate;

use super::{CredentialResolver, mint_for};
use crate::domain::error::{CredentialError, DomainError};
use crate::domain::token_service::TokenService;

/// How a client certificate becomes a mainframe user id.
#[derive(Clone)]
pub enum IdentityMapper {
    /// The subject common name is the user id.
    CommonName,
    /// The user directory holds the certificate-to-user mapping.
    Directory(Arc<dyn UserDirectory>),
}

impl IdentityMapper {
    async fn map(
        &self,
        certificate: &PeerCertificate,
        common_name: Option<String>,
    ) -> Result<String, CredentialError> {
        let user = match self {
            Self::CommonName => common_name,
            Self::Directory(directory) => directory
                .map_certificate(certificate)
                .await
                .map_err(|e| {
                    tracing::debug!(error = %e, "certificate mapping lookup failed");
                    CredentialError::UnmappedIdentity
                })?,
        };
        user.filter(|u| !u.trim().is_empty())
            .ok_or(CredentialError::UnmappedIdentity)
    }
}

/// Client certificates presented during the TLS handshake.
pub struct X509Resolver {
    tokens: Arc<TokenService>,
    mapper: IdentityMapper,
}

impl X509Resolver {
    #[must_use]
    pub fn new(tokens: Arc<TokenService>, mapper: IdentityMapper) -> Self {
        Self { tokens, mapper }
    }

    fn certificate(credential: &Credential) -> Result<&PeerCertificate, CredentialError> {
        credential.certificate().ok_or(CredentialError::WrongKind)
    }

    fn decode(certificate: &PeerCertificate) -> Result<X509Certificate<'_>, CredentialError> {
        let (_, parsed) = x509_parser::parse_x509_certificate(certificate.der())
            .map_err(|e| CredentialError::Malformed(e.to_string()))?;
        Ok(parsed)
    }

    /// Only certificates marked for client authentication are accepted.
    fn check_client_auth(parsed: &X509Certificate<'_>) -> Result<(), CredentialError> {
        match parsed.extended_key_usage() {
            Ok(Some(eku)) if eku.value.client_auth => Ok(()),
            Ok(_) => Err(CredentialError::MissingClientAuthUsage),
            Err(e) => Err(CredentialError::Malformed(e.to_string())),
        }
    }
}

#[async_trait]
impl CredentialResolver for X509Resolver {
    fn kind(&self) -> CredentialKind {
        CredentialKind::X509
    }

    fn extract(&self, request: &InboundRequest) -> Option<Credential> {
        request.peer_certificate().cloned().and_then(Credential::x509)
    }

    async fn validate(&self, credential: &Credential) -> Result<(), CredentialError> {
        let parsed = Self::decode(Self::certificate(credential)?)?;
        Self::check_client_auth(&parsed)
    }

    async fn identify(&self, credential: &Credential) -> Result<ParsedCredential, CredentialError> {
        let certificate = Self::certificate(credential)?;
        let (common_name, details, not_before, not_after) = {
            let parsed = Self::decode(certificate)?;
            Self::check_client_auth(&parsed)?;
            let common_name = parsed
                .subject()
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .map(ToOwned::to_owned);
            let details = CertificateDetails {
                public_key_fingerprint: hex::encode(Sha256::digest(parsed.public_key().raw)),
                distinguished_name: parsed.subject().to_string(),
                encoded: certificate.to_base64(),
            };
            let validity = parsed.validity();
            (
                common_name,
                details,
                DateTime::from_timestamp(validity.not_before.timestamp(), 0),
                DateTime::from_timestamp(validity.not_after.timestamp(), 0),
            )
        };

        let user_id = self.mapper.map(certificate, common_name).await?;
        let identity = ParsedCredential::new(user_id, Origin::X509, not_before, not_after)
            .ok_or_else(|| {
                CredentialError::Malformed("certificate validity window is empty".to_owned())
            })?;
        Ok(identity.with_certificate(details))
    }

    async fn derive_session_token(
        &self,
        credential: &Credential,
    ) -> Result<Option<String>, DomainError> {
        mint_for(self, &self.tokens, credential).await
    }
}
