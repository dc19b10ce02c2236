//! Domain errors for the service authentication module.

use service_auth_sdk::{
    CredentialKind, LegacyAuthError, PassTicketError, RegistryError, ServiceAuthError,
};

/// Failure of session or access token validation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is not valid: {0}")]
    NotValid(String),

    #[error("token has expired")]
    Expired,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::NotValid(e.to_string()),
        }
    }
}

/// Why a resolver rejected a credential. Recovered locally as absence.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("certificate is not usable for client authentication")]
    MissingClientAuthUsage,

    #[error("credential is malformed: {0}")]
    Malformed(String),

    #[error("credential type does not match resolver")]
    WrongKind,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("token is not scoped for service '{0}'")]
    OutOfScope(String),

    #[error("token has been revoked")]
    Revoked,

    #[error("token rejected by introspection")]
    Introspection,

    #[error("no mainframe identity is mapped to the credential")]
    UnmappedIdentity,
}

/// Internal domain errors.
#[derive(thiserror::Error, Debug)]
pub enum DomainError {
    #[error("{kind} credential is not valid")]
    CredentialInvalid { kind: CredentialKind },

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("registry lookup failed: {0}")]
    Registry(String),

    #[error("could not generate pass-ticket for user '{user_id}' and application '{application_id}': {reason}")]
    PassTicket {
        user_id: String,
        application_id: String,
        reason: String,
    },

    #[error("application id is required by scheme but not declared")]
    MissingApplicationId,

    #[error("legacy authentication failed: {0}")]
    Legacy(String),

    #[error("token signing failed: {0}")]
    Signing(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RegistryError> for DomainError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e.to_string())
    }
}

impl From<PassTicketError> for DomainError {
    fn from(e: PassTicketError) -> Self {
        Self::PassTicket {
            user_id: e.user_id,
            application_id: e.application_id,
            reason: e.reason,
        }
    }
}

impl From<LegacyAuthError> for DomainError {
    fn from(e: LegacyAuthError) -> Self {
        Self::Legacy(e.to_string())
    }
}

impl From<ServiceAuthError> for DomainError {
    fn from(e: ServiceAuthError) -> Self {
        match e {
            ServiceAuthError::TokenExpired => Self::Token(TokenError::Expired),
            ServiceAuthError::TokenInvalid(msg) => Self::Token(TokenError::NotValid(msg)),
            ServiceAuthError::Registry(msg) => Self::Registry(msg),
            ServiceAuthError::DownstreamGenerationFailed(msg) => Self::Legacy(msg),
            ServiceAuthError::CredentialInvalid(msg)
            | ServiceAuthError::BackendUnresolvable(msg)
            | ServiceAuthError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<DomainError> for ServiceAuthError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::CredentialInvalid { .. } => Self::CredentialInvalid(e.to_string()),
            DomainError::Token(TokenError::Expired) => Self::TokenExpired,
            DomainError::Token(TokenError::NotValid(msg)) => Self::TokenInvalid(msg),
            DomainError::MissingApplicationId => Self::BackendUnresolvable(e.to_string()),
            DomainError::Registry(msg) => Self::Registry(msg),
            DomainError::PassTicket { .. } | DomainError::Legacy(_) => {
                Self::DownstreamGenerationFailed(e.to_string())
            }
            DomainError::Signing(msg) | DomainError::Internal(msg) => Self::Internal(msg),
        }
    }
}
