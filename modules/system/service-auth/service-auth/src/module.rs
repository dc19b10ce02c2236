//! Service authentication module.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use service_auth_sdk::{
    LegacyAuthProvider, OidcIntrospectionClient, PassTicketGenerator, PeerInvalidationClient,
    RegistryEvent, ServiceAuthClient, ServiceRegistryClient, UserDirectory,
};
use tracing::info;

use crate::config::{ServiceAuthConfig, X509MapperKind};
use crate::domain::resolvers::{
    CredentialResolver, IdentityMapper, JwtResolver, OidcResolver, PatResolver, X509Resolver,
};
use crate::domain::{
    CommandService, CredentialBroker, PeerNotifier, SchemeFactory, Service,
    ServiceAuthLocalClient, TokenService,
};
use crate::infra::HttpPeerClient;

/// Systems the module talks to but does not own.
pub struct Collaborators {
    pub registry: Arc<dyn ServiceRegistryClient>,
    pub pass_tickets: Arc<dyn PassTicketGenerator>,
    /// Defaults to [`HttpPeerClient`].
    pub peers: Option<Arc<dyn PeerInvalidationClient>>,
    pub legacy: Option<Arc<dyn LegacyAuthProvider>>,
    /// Required when the OIDC resolver is enabled.
    pub introspection: Option<Arc<dyn OidcIntrospectionClient>>,
    /// Required by the directory certificate mapper.
    pub directory: Option<Arc<dyn UserDirectory>>,
}

impl Collaborators {
    #[must_use]
    pub fn new(
        registry: Arc<dyn ServiceRegistryClient>,
        pass_tickets: Arc<dyn PassTicketGenerator>,
    ) -> Self {
        Self {
            registry,
            pass_tickets,
            peers: None,
            legacy: None,
            introspection: None,
            directory: None,
        }
    }

    #[must_use]
    pub fn with_peers(mut self, peers: Arc<dyn PeerInvalidationClient>) -> Self {
        self.peers = Some(peers);
        self
    }

    #[must_use]
    pub fn with_legacy(mut self, legacy: Arc<dyn LegacyAuthProvider>) -> Self {
        self.legacy = Some(legacy);
        self
    }

    #[must_use]
    pub fn with_introspection(mut self, introspection: Arc<dyn OidcIntrospectionClient>) -> Self {
        self.introspection = Some(introspection);
        self
    }

    #[must_use]
    pub fn with_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }
}

/// Service authentication module.
///
/// Built once at process start. Every shared structure (command cache,
/// invalidated-token set, validation cache) belongs to this instance, so tests
/// construct isolated modules.
pub struct ServiceAuthModule {
    service: Arc<Service>,
    client: Arc<dyn ServiceAuthClient>,
}

impl ServiceAuthModule {
    /// Wire resolvers, scheme strategies, and the token lifecycle from `config`.
    ///
    /// # Errors
    ///
    /// Fails when the signing secret is empty, a resolver is enabled without the
    /// collaborator it needs, or the peer HTTP client cannot be built.
    #[tracing::instrument(skip_all, fields(instance_id = %config.cluster.instance_id))]
    pub fn init(config: ServiceAuthConfig, collaborators: Collaborators) -> anyhow::Result<Self> {
        info!(
            x509 = config.resolvers.x509_enabled,
            pat = config.resolvers.pat_enabled,
            oidc = config.resolvers.oidc_enabled,
            legacy = config.legacy.enabled,
            "Initializing service_auth"
        );

        let peer_client: Arc<dyn PeerInvalidationClient> = match collaborators.peers.clone() {
            Some(client) => client,
            None => Arc::new(HttpPeerClient::new().context("building peer invalidation client")?),
        };
        if config.legacy.enabled && collaborators.legacy.is_none() {
            tracing::warn!("legacy authentication enabled without a provider, tokens are minted locally");
        }

        let peers = PeerNotifier::new(
            Arc::clone(&collaborators.registry),
            peer_client,
            &config.cluster,
        );
        let tokens = Arc::new(TokenService::new(
            config.token.clone(),
            config.legacy.clone(),
            peers,
            Arc::clone(&collaborators.pass_tickets),
            collaborators.legacy.clone(),
        )?);

        let broker = Arc::new(Self::broker(&config, &collaborators, &tokens)?);
        let schemes = SchemeFactory::new(
            Arc::clone(&broker),
            Arc::clone(&tokens),
            Arc::clone(&collaborators.pass_tickets),
            &config.passticket,
            config.gateway_cookies(),
        )?;
        let commands = Arc::new(CommandService::new(
            Arc::clone(&collaborators.registry),
            schemes,
            config.metadata.clone(),
        ));

        let service = Arc::new(Service::new(broker, commands, tokens));
        let client: Arc<dyn ServiceAuthClient> =
            Arc::new(ServiceAuthLocalClient::new(Arc::clone(&service)));

        info!(resolvers = ?service.broker().kinds(), "service_auth initialized");
        Ok(Self { service, client })
    }

    fn broker(
        config: &ServiceAuthConfig,
        collaborators: &Collaborators,
        tokens: &Arc<TokenService>,
    ) -> anyhow::Result<CredentialBroker> {
        let resolvers = &config.resolvers;

        let jwt: Arc<dyn CredentialResolver> = Arc::new(JwtResolver::new(
            Arc::clone(tokens),
            config.cookies.session_cookie.clone(),
        ));

        let pat = resolvers.pat_enabled.then(|| {
            Arc::new(PatResolver::new(Arc::clone(tokens), &config.cookies))
                as Arc<dyn CredentialResolver>
        });

        let oidc = if resolvers.oidc_enabled {
            let introspection = collaborators
                .introspection
                .clone()
                .context("OIDC resolver enabled without an introspection client")?;
            Some(Arc::new(OidcResolver::new(
                Arc::clone(tokens),
                introspection,
                collaborators.directory.clone(),
            )) as Arc<dyn CredentialResolver>)
        } else {
            None
        };

        let x509 = if resolvers.x509_enabled {
            let mapper = match resolvers.x509_mapper {
                X509MapperKind::CommonName => IdentityMapper::CommonName,
                X509MapperKind::Directory => IdentityMapper::Directory(
                    collaborators
                        .directory
                        .clone()
                        .context("directory certificate mapper configured without a user directory")?,
                ),
            };
            Some(Arc::new(X509Resolver::new(Arc::clone(tokens), mapper)) as Arc<dyn CredentialResolver>)
        } else {
            None
        };

        Ok(CredentialBroker::new(jwt, pat, oidc, x509))
    }

    /// API handed to the reverse-proxy filter chain.
    #[must_use]
    pub fn client(&self) -> Arc<dyn ServiceAuthClient> {
        Arc::clone(&self.client)
    }

    #[must_use]
    pub fn service(&self) -> &Arc<Service> {
        &self.service
    }

    /// Peer invalidation endpoints, to be mounted on the gateway's internal listener.
    #[must_use]
    pub fn router(&self) -> Router {
        crate::api::router(Arc::clone(&self.service))
    }

    /// Evict cached commands affected by a registry change.
    pub fn on_registry_event(&self, event: &RegistryEvent) {
        info!(?event, "registry change observed");
        self.service.commands().on_registry_event(event);
    }
}
