//! Configuration for the service authentication module.

use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use secrecy::SecretString;
use serde::Deserialize;
use service_auth_sdk::GatewayCookies;

/// Prefix of environment variables overriding file configuration.
///
/// Nested keys are separated by `__`, e.g. `SERVICE_AUTH__TOKEN__SECRET`.
pub const ENV_PREFIX: &str = "SERVICE_AUTH__";

/// Configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceAuthConfig {
    pub token: TokenConfig,
    pub cookies: CookieConfig,
    pub resolvers: ResolverConfig,
    pub passticket: PassTicketConfig,
    pub metadata: MetadataConfig,
    pub cluster: ClusterConfig,
    pub legacy: LegacyConfig,
}

impl ServiceAuthConfig {
    /// Load from an optional YAML file, then apply `SERVICE_AUTH__*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] when a value has the wrong type or an unknown key is present.
    pub fn load(path: Option<&Path>) -> Result<Self, Box<figment::Error>> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)
    }

    #[must_use]
    pub fn gateway_cookies(&self) -> GatewayCookies {
        GatewayCookies {
            session: self.cookies.session_cookie.clone(),
            pat: self.cookies.pat_cookie.clone(),
        }
    }
}

/// Session and personal access token settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TokenConfig {
    /// Issuer of session tokens minted by this gateway.
    pub issuer: String,
    /// Issuer of personal access tokens minted by this gateway.
    pub pat_issuer: String,
    /// Issuer the legacy authentication provider puts in its tokens.
    pub legacy_issuer: String,
    /// HS512 signing key shared by every gateway node. Must not be empty.
    pub secret: SecretString,
    pub expiration_secs: u64,
    /// Upper bound on memoised successful validations.
    pub validation_cache_size: usize,
    /// Size of the invalidated-token set above which expired entries are pruned.
    pub invalidated_prune_threshold: usize,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: "gateway".to_owned(),
            pat_issuer: "gateway-pat".to_owned(),
            legacy_issuer: "zOSMF".to_owned(),
            secret: SecretString::from(String::new()),
            expiration_secs: 86_400,
            validation_cache_size: 10_000,
            invalidated_prune_threshold: 1_024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CookieConfig {
    pub session_cookie: String,
    pub pat_cookie: String,
    pub pat_header: String,
    /// Header naming the target service, used to check PAT scopes.
    pub service_id_header: String,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            session_cookie: "gatewayAuthenticationToken".to_owned(),
            pat_cookie: "personalAccessToken".to_owned(),
            pat_header: "X-Personal-Access-Token".to_owned(),
            service_id_header: "X-Service-Id".to_owned(),
        }
    }
}

/// How a client certificate is mapped to a mainframe user id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum X509MapperKind {
    /// Subject common name is the user id.
    #[default]
    CommonName,
    /// Look the certificate up in the user directory.
    Directory,
}

/// Which credential resolvers participate. Session tokens are always accepted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    pub x509_enabled: bool,
    pub pat_enabled: bool,
    pub oidc_enabled: bool,
    pub x509_mapper: X509MapperKind,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PassTicketConfig {
    pub custom_user_header: Option<String>,
    pub custom_auth_header: Option<String>,
    /// Lifetime of a pass-ticket command. `0` expires it as soon as it was issued.
    pub ttl_millis: u64,
}

impl PassTicketConfig {
    /// Both custom headers, when both are configured and non-empty.
    #[must_use]
    pub fn custom_headers(&self) -> Option<(String, String)> {
        match (&self.custom_user_header, &self.custom_auth_header) {
            (Some(user), Some(auth)) if !user.is_empty() && !auth.is_empty() => {
                Some((user.clone(), auth.clone()))
            }
            _ => None,
        }
    }
}

/// Registry metadata keys carrying a backend's declared requirement.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataConfig {
    pub scheme_key: String,
    pub applid_key: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            scheme_key: "authentication.scheme".to_owned(),
            applid_key: "authentication.applid".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterConfig {
    /// Service id under which gateway nodes register themselves.
    pub gateway_service_id: String,
    /// Registry instance id of this node; skipped during fan-out.
    pub instance_id: String,
    pub peer_timeout_millis: u64,
    pub peer_concurrency: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            gateway_service_id: "gateway".to_owned(),
            instance_id: String::new(),
            peer_timeout_millis: 2_000,
            peer_concurrency: 8,
        }
    }
}

impl ClusterConfig {
    #[must_use]
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_millis)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LegacyConfig {
    pub enabled: bool,
    /// Application id used to obtain a legacy session through a pass-ticket.
    pub applid: String,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            applid: "IZUDFLT".to_owned(),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;

    #[test]
    fn defaults_match_gateway_conventions() {
        let cfg = ServiceAuthConfig::default();
        assert_eq!(cfg.token.issuer, "gateway");
        assert_eq!(cfg.token.expiration_secs, 24 * 60 * 60);
        assert_eq!(cfg.cluster.peer_timeout(), Duration::from_secs(2));
        assert_eq!(cfg.cookies.session_cookie, "gatewayAuthenticationToken");
        assert_eq!(cfg.metadata.scheme_key, "authentication.scheme");
        assert_eq!(cfg.passticket.ttl_millis, 0);
        assert!(!cfg.resolvers.pat_enabled);
        assert_eq!(cfg.legacy.applid, "IZUDFLT");
    }

    #[test]
    fn custom_headers_require_both() {
        let mut cfg = PassTicketConfig {
            custom_user_header: Some("X-User".to_owned()),
            ..PassTicketConfig::default()
        };
        assert!(cfg.custom_headers().is_none());
        cfg.custom_auth_header = Some("X-Ticket".to_owned());
        assert_eq!(
            cfg.custom_headers(),
            Some(("X-User".to_owned(), "X-Ticket".to_owned()))
        );
    }

    #[test]
    fn loads_yaml_with_env_override() {
        let mut file = temp_yaml();
        writeln!(
            file.1,
            "token:\n  secret: from-file\n  expiration_secs: 60\nresolvers:\n  pat_enabled: true\n"
        )
        .unwrap();

        temp_env::with_vars(
            [("SERVICE_AUTH__CLUSTER__INSTANCE_ID", Some("gw-2"))],
            || {
                let cfg = ServiceAuthConfig::load(Some(&file.0)).unwrap();
                assert_eq!(cfg.token.secret.expose_secret(), "from-file");
                assert_eq!(cfg.token.expiration_secs, 60);
                assert!(cfg.resolvers.pat_enabled);
                assert_eq!(cfg.cluster.instance_id, "gw-2");
                assert_eq!(cfg.cluster.gateway_service_id, "gateway");
            },
        );
        std::fs::remove_file(&file.0).unwrap();
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = temp_yaml();
        writeln!(file.1, "token:\n  nope: 1\n").unwrap();
        assert!(ServiceAuthConfig::load(Some(&file.0)).is_err());
        std::fs::remove_file(&file.0).unwrap();
    }

    fn temp_yaml() -> (std::path::PathBuf, std::fs::File) {
        let path = std::env::temp_dir().join(format!("service-auth-{}.yaml", uuid::Uuid::new_v4()));
        let file = std::fs::File::create(&path).unwrap();
        (path, file)
    }
}
