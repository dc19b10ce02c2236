//! Token lifecycle: minting, validating, and invalidating gateway tokens.
//!
//! Session tokens and personal access tokens are HS512 JWTs signed with the
//! cluster-wide secret. Tokens issued by the legacy authentication provider are
//! recognised by their issuer and validated by that provider.
//!
//! Invalidation is local first and then best effort on every gateway peer. The
//! invalidated-token set is consulted before any signature check.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_auth_sdk::{
    InvalidationReport, LegacyAuthProvider, Origin, ParsedCredential, PassTicketGenerator,
};

use super::error::{CredentialError, DomainError, TokenError};
use super::peers::PeerNotifier;
use crate::config::{LegacyConfig, TokenConfig};

const ALGORITHM: Algorithm = Algorithm::HS512;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
    iss: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    jti: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dom: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ltpa: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    scopes: Vec<String>,
    #[serde(rename = "auth.prov", default, skip_serializing_if = "Option::is_none")]
    auth_prov: Option<String>,
}

/// Claims read without checking the signature. Only used to route a token.
#[derive(Debug, Default, Deserialize)]
struct UnverifiedClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    ltpa: Option<String>,
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

fn parsed(
    sub: &str,
    origin: Origin,
    iat: Option<i64>,
    exp: Option<i64>,
) -> Result<ParsedCredential, TokenError> {
    ParsedCredential::new(sub, origin, iat.and_then(timestamp), exp.and_then(timestamp))
        .ok_or_else(|| TokenError::NotValid("token has no subject or an empty validity window".to_owned()))
}

fn unverified_claims(token: &str) -> Result<UnverifiedClaims, TokenError> {
    Ok(jsonwebtoken::dangerous::insecure_decode::<UnverifiedClaims>(token)?.claims)
}

/// A verified personal access token.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub identity: ParsedCredential,
    /// Lower-cased service ids the token may be used for.
    pub scopes: Vec<String>,
}

impl AccessToken {
    #[must_use]
    pub fn is_scoped_for(&self, service_id: &str) -> bool {
        self.scopes
            .iter()
            .any(|scope| scope.eq_ignore_ascii_case(service_id))
    }
}

/// Identity read from a foreign token.
#[derive(Debug, Clone)]
pub struct ExternalIdentity {
    pub identity: ParsedCredential,
    pub issuer: Option<String>,
}

/// Creates, validates, and invalidates gateway tokens.
pub struct TokenService {
    config: TokenConfig,
    legacy_config: LegacyConfig,
    session_ttl: TimeDelta,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    peers: PeerNotifier,
    pass_tickets: Arc<dyn PassTicketGenerator>,
    legacy: Option<Arc<dyn LegacyAuthProvider>>,
    /// Invalidated token -> its expiry, when readable.
    invalidated: DashMap<String, Option<DateTime<Utc>>>,
    validated: DashMap<String, ParsedCredential>,
    revoked: DashMap<String, Option<DateTime<Utc>>>,
}

impl TokenService {
    /// # Errors
    ///
    /// Returns [`DomainError::Internal`] when the secret is empty or the expiration is out of range.
    pub fn new(
        config: TokenConfig,
        legacy_config: LegacyConfig,
        peers: PeerNotifier,
        pass_tickets: Arc<dyn PassTicketGenerator>,
        legacy: Option<Arc<dyn LegacyAuthProvider>>,
    ) -> Result<Self, DomainError> {
        let secret = config.secret.expose_secret().as_bytes();
        if secret.is_empty() {
            return Err(DomainError::Internal(
                "token signing secret must not be empty".to_owned(),
            ));
        }
        let encoding_key = EncodingKey::from_secret(secret);
        let decoding_key = DecodingKey::from_secret(secret);
        let session_ttl = i64::try_from(config.expiration_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .filter(|ttl| *ttl > TimeDelta::zero())
            .ok_or_else(|| DomainError::Internal("token expiration out of range".to_owned()))?;

        Ok(Self {
            encoding_key,
            decoding_key,
            config,
            legacy_config,
            session_ttl,
            peers,
            pass_tickets,
            legacy,
            invalidated: DashMap::new(),
            validated: DashMap::new(),
            revoked: DashMap::new(),
        })
    }

    #[must_use]
    pub fn peers(&self) -> &PeerNotifier {
        &self.peers
    }

    /// Mint a session token for `user_id` valid for the configured expiration.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Signing`] if encoding fails.
    pub fn create_session_token(
        &self,
        user_id: &str,
        domain: &str,
        legacy_token: Option<&str>,
    ) -> Result<String, DomainError> {
        let now = Utc::now();
        self.mint_session(user_id, domain, legacy_token, now, now + self.session_ttl)
    }

    fn mint_session(
        &self,
        user_id: &str,
        domain: &str,
        legacy_token: Option<&str>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<String, DomainError> {
        self.sign(&Claims {
            sub: user_id.to_owned(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.config.issuer.clone(),
            jti: Some(uuid::Uuid::new_v4().to_string()),
            dom: Some(domain.to_owned()),
            ltpa: legacy_token.map(ToOwned::to_owned),
            scopes: Vec::new(),
            auth_prov: None,
        })
    }

    fn sign(&self, claims: &Claims) -> Result<String, DomainError> {
        jsonwebtoken::encode(&Header::new(ALGORITHM), claims, &self.encoding_key)
            .map_err(|e| DomainError::Signing(e.to_string()))
    }

    fn decode_verified(&self, token: &str, issuer: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.validate_aud = false;
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }

    /// Origin of `token`, read from its issuer without checking the signature.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::NotValid`] when `token` is not a decodable JWT.
    pub fn token_origin(&self, token: &str) -> Result<Origin, TokenError> {
        let claims = unverified_claims(token)?;
        Ok(self.origin_of(claims.iss.as_deref()))
    }

    /// Subject, issuer, and validity of a token issued elsewhere, without checking the signature.
    ///
    /// Only meaningful once the issuer has vouched for the token.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::NotValid`] when `token` is not a decodable JWT or has no subject.
    pub fn external_identity(&self, token: &str) -> Result<ExternalIdentity, TokenError> {
        let claims = unverified_claims(token)?;
        let identity = parsed(
            claims.sub.as_deref().unwrap_or_default(),
            self.origin_of(claims.iss.as_deref()),
            claims.iat,
            claims.exp,
        )?;
        Ok(ExternalIdentity {
            identity,
            issuer: claims.iss,
        })
    }

    fn origin_of(&self, issuer: Option<&str>) -> Origin {
        match issuer {
            Some(iss) if iss == self.config.issuer => Origin::Zowe,
            Some(iss) if iss == self.config.pat_issuer => Origin::ZowePat,
            Some(iss) if iss == self.config.legacy_issuer => Origin::Zosmf,
            _ => Origin::Other,
        }
    }

    /// Validate a session token (or a token issued by the legacy provider).
    ///
    /// # Errors
    ///
    /// - [`TokenError::NotValid`] if the token was invalidated, is malformed, or its signature does not match
    /// - [`TokenError::Expired`] if the token is past its expiry
    pub async fn validate(&self, token: &str) -> Result<ParsedCredential, TokenError> {
        if self.invalidated.contains_key(token) {
            return Err(TokenError::NotValid("token was invalidated".to_owned()));
        }
        let cached = self.validated.get(token).map(|entry| entry.value().clone());
        if let Some(cached) = cached {
            if cached.is_expired_at(Utc::now()) {
                self.validated.remove(token);
                return Err(TokenError::Expired);
            }
            return Ok(cached);
        }

        let claims = unverified_claims(token)?;
        let identity = match self.origin_of(claims.iss.as_deref()) {
            Origin::Zosmf => self.validate_legacy(token, &claims).await?,
            _ => {
                let claims = self.decode_verified(token, &self.config.issuer)?;
                parsed(&claims.sub, Origin::Zowe, Some(claims.iat), Some(claims.exp))?
            }
        };
        self.remember(token, &identity);
        Ok(identity)
    }

    async fn validate_legacy(
        &self,
        token: &str,
        claims: &UnverifiedClaims,
    ) -> Result<ParsedCredential, TokenError> {
        let Some(provider) = &self.legacy else {
            return Err(TokenError::NotValid(
                "no legacy authentication provider is configured".to_owned(),
            ));
        };
        match provider.validate(token).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(TokenError::NotValid(
                    "rejected by the legacy authentication provider".to_owned(),
                ));
            }
            Err(e) => return Err(TokenError::NotValid(e.to_string())),
        }
        let identity = parsed(
            claims.sub.as_deref().unwrap_or_default(),
            Origin::Zosmf,
            claims.iat,
            claims.exp,
        )?;
        if identity.is_expired_at(Utc::now()) {
            return Err(TokenError::Expired);
        }
        Ok(identity)
    }

    fn remember(&self, token: &str, identity: &ParsedCredential) {
        if self.validated.len() >= self.config.validation_cache_size {
            let now = Utc::now();
            self.validated.retain(|_, cached| !cached.is_expired_at(now));
            if self.validated.len() >= self.config.validation_cache_size {
                return;
            }
        }
        self.validated.insert(token.to_owned(), identity.clone());
    }

    /// Legacy session identifier embedded in a valid session token.
    ///
    /// # Errors
    ///
    /// Same as [`TokenService::validate`] for the local issuer.
    pub fn legacy_token(&self, token: &str) -> Result<Option<String>, TokenError> {
        if self.invalidated.contains_key(token) {
            return Err(TokenError::NotValid("token was invalidated".to_owned()));
        }
        Ok(self.decode_verified(token, &self.config.issuer)?.ltpa)
    }

    #[must_use]
    pub fn is_invalidated(&self, token: &str) -> bool {
        self.invalidated.contains_key(token)
    }

    /// Invalidate `token` locally and, when `distribute` is set, on every gateway peer.
    ///
    /// Local invalidation always takes effect. Legacy sessions referenced by the token
    /// are terminated best effort.
    #[tracing::instrument(skip_all, fields(distribute = distribute))]
    pub async fn invalidate(&self, token: &str, distribute: bool) -> InvalidationReport {
        let claims = unverified_claims(token).ok();
        let expires_at = claims.as_ref().and_then(|c| c.exp).and_then(timestamp);

        self.invalidated.insert(token.to_owned(), expires_at);
        self.validated.remove(token);
        self.prune_invalidated();

        if let (Some(provider), Some(claims)) = (&self.legacy, &claims) {
            let legacy_session = match self.origin_of(claims.iss.as_deref()) {
                Origin::Zosmf => Some(token),
                _ => claims.ltpa.as_deref(),
            };
            if let Some(session) = legacy_session
                && let Err(e) = provider.invalidate(session).await
            {
                tracing::warn!(error = %e, "legacy session could not be invalidated");
            }
        }

        if distribute {
            self.peers.broadcast(token).await
        } else {
            InvalidationReport::default()
        }
    }

    fn prune_invalidated(&self) {
        if self.invalidated.len() <= self.config.invalidated_prune_threshold {
            return;
        }
        let now = Utc::now();
        let before = self.invalidated.len();
        self.invalidated
            .retain(|_, expires_at| expires_at.is_some_and(|exp| exp > now));
        tracing::debug!(
            pruned = before.saturating_sub(self.invalidated.len()),
            "pruned expired invalidated tokens"
        );
    }

    /// Locally invalidated tokens that have not expired yet.
    #[must_use]
    pub fn invalidated_tokens(&self) -> Vec<String> {
        let now = Utc::now();
        self.invalidated
            .iter()
            .filter(|entry| entry.value().is_none_or(|exp| exp > now))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Re-send every locally invalidated token to the peer `to_instance_id`.
    ///
    /// Returns `false` when no such peer is registered.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Registry`] when peers cannot be enumerated.
    #[tracing::instrument(skip(self))]
    pub async fn distribute_invalidated(&self, to_instance_id: &str) -> Result<bool, DomainError> {
        let peers = self.peers.peers().await?;
        let Some(peer) = peers.into_iter().find(|p| p.instance_id == to_instance_id) else {
            tracing::debug!("unknown gateway peer");
            return Ok(false);
        };
        let tokens = self.invalidated_tokens();
        let total = tokens.len();
        let sent = self.peers.replay(&peer, tokens).await;
        tracing::info!(sent, total, "replayed invalidated tokens to peer");
        Ok(true)
    }

    /// Mint a session token for an identity proven by something other than a password.
    ///
    /// When the legacy provider is enabled and reachable, a legacy session is obtained
    /// with a pass-ticket and embedded in the token. Otherwise, or when the provider
    /// fails, the token is minted locally.
    ///
    /// # Errors
    ///
    /// - [`DomainError::PassTicket`] if the pass-ticket for the legacy provider cannot be generated
    /// - [`DomainError::Signing`] if encoding fails
    #[tracing::instrument(skip_all)]
    pub async fn create_jwt_without_credentials(&self, user_id: &str) -> Result<String, DomainError> {
        if self.legacy_config.enabled
            && let Some(provider) = &self.legacy
        {
            if provider.is_available().await {
                let ticket = self
                    .pass_tickets
                    .generate(user_id, &self.legacy_config.applid)
                    .await?;
                match provider.authenticate(user_id, &ticket).await {
                    Ok(session) => {
                        let domain = session.domain.as_deref().unwrap_or(&self.config.issuer);
                        return self.create_session_token(
                            user_id,
                            domain,
                            Some(session.token.expose_secret()),
                        );
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "legacy authentication failed, minting token locally");
                    }
                }
            } else {
                tracing::debug!("legacy authentication provider unavailable, minting token locally");
            }
        }
        self.create_session_token(user_id, &self.config.issuer, None)
    }

    /// Mint a personal access token for `user_id`, valid for `days_to_live` days on `scopes`.
    ///
    /// # Errors
    ///
    /// - [`DomainError::Internal`] if `days_to_live` is out of range
    /// - [`DomainError::Signing`] if encoding fails
    pub fn create_personal_access_token(
        &self,
        user_id: &str,
        days_to_live: u32,
        scopes: &[String],
    ) -> Result<String, DomainError> {
        let ttl = TimeDelta::try_days(i64::from(days_to_live))
            .filter(|ttl| *ttl > TimeDelta::zero())
            .ok_or_else(|| DomainError::Internal(format!("invalid token lifetime of {days_to_live} days")))?;
        let now = Utc::now();
        self.sign(&Claims {
            sub: user_id.to_owned(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            iss: self.config.pat_issuer.clone(),
            jti: Some(uuid::Uuid::new_v4().to_string()),
            dom: None,
            ltpa: None,
            scopes: scopes.iter().map(|s| s.to_ascii_lowercase()).collect(),
            auth_prov: Some(self.config.issuer.clone()),
        })
    }

    /// Verify signature, issuer, and expiry of a personal access token.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] on any verification failure.
    pub fn parse_access_token(&self, token: &str) -> Result<AccessToken, TokenError> {
        let claims = self.decode_verified(token, &self.config.pat_issuer)?;
        Ok(AccessToken {
            identity: parsed(&claims.sub, Origin::ZowePat, Some(claims.iat), Some(claims.exp))?,
            scopes: claims.scopes,
        })
    }

    /// Full personal access token check for a request to `service_id`.
    ///
    /// # Errors
    ///
    /// - [`CredentialError::Revoked`] if the token was revoked
    /// - [`CredentialError::Token`] if verification fails
    /// - [`CredentialError::OutOfScope`] if `service_id` is not among the token scopes
    pub fn validate_access_token(
        &self,
        token: &str,
        service_id: &str,
    ) -> Result<ParsedCredential, CredentialError> {
        if self.is_access_token_revoked(token) {
            return Err(CredentialError::Revoked);
        }
        let access = self.parse_access_token(token)?;
        if !access.is_scoped_for(service_id) {
            return Err(CredentialError::OutOfScope(service_id.to_owned()));
        }
        Ok(access.identity)
    }

    pub fn revoke_access_token(&self, token: &str) {
        let expires_at = unverified_claims(token)
            .ok()
            .and_then(|c| c.exp)
            .and_then(timestamp);
        self.revoked.insert(token.to_owned(), expires_at);
        self.prune_revoked();
    }

    /// Revocations of expired access tokens are dropped past the prune threshold.
    fn prune_revoked(&self) {
        if self.revoked.len() <= self.config.invalidated_prune_threshold {
            return;
        }
        let now = Utc::now();
        let before = self.revoked.len();
        self.revoked
            .retain(|_, expires_at| expires_at.is_some_and(|exp| exp > now));
        tracing::debug!(
            pruned = before.saturating_sub(self.revoked.len()),
            "pruned expired access token revocations"
        );
    }

    #[must_use]
    pub fn is_access_token_revoked(&self, token: &str) -> bool {
        self.revoked.contains_key(token)
    }
}
