//! Service-level command resolution.
//!
//! A service's live instances are fetched from the registry and reduced to one
//! [`BackendRequirement`]. When the instances disagree, the real command can only be
//! known once the load balancer has chosen an instance, so a deferred
//! [`UniversalCommand`] is returned and recorded in the [`RoutingContext`].

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use service_auth_sdk::{
    AuthScheme, AuthenticationCommand, BackendRequirement, Credential, InstanceCommandResolver,
    RegistryEvent, RoutingContext, ServiceAuthError, ServiceInstance, ServiceRegistryClient,
    UniversalCommand,
};

use super::cache::CommandCache;
use super::error::DomainError;
use super::schemes::SchemeFactory;
use crate::config::MetadataConfig;

/// Requirement shared by every instance, or a disagreement.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ServiceRequirement {
    NoInstances,
    Uniform(BackendRequirement),
    Heterogeneous,
}

pub struct CommandService {
    registry: Arc<dyn ServiceRegistryClient>,
    schemes: SchemeFactory,
    cache: CommandCache,
    metadata: MetadataConfig,
}

impl CommandService {
    #[must_use]
    pub fn new(
        registry: Arc<dyn ServiceRegistryClient>,
        schemes: SchemeFactory,
        metadata: MetadataConfig,
    ) -> Self {
        Self {
            registry,
            schemes,
            cache: CommandCache::new(),
            metadata,
        }
    }

    #[must_use]
    pub fn cache(&self) -> &CommandCache {
        &self.cache
    }

    /// Requirement declared in `instance` registry metadata.
    #[must_use]
    pub fn requirement_for(&self, instance: &ServiceInstance) -> BackendRequirement {
        let declared = instance.metadata_value(&self.metadata.scheme_key);
        let scheme = AuthScheme::from_metadata(declared);
        if scheme == AuthScheme::None
            && let Some(value) = declared
        {
            tracing::warn!(
                service_id = %instance.service_id,
                instance_id = %instance.instance_id,
                scheme = value,
                "unknown authentication scheme, no authentication applied"
            );
        }
        BackendRequirement::new(scheme, instance.metadata_value(&self.metadata.applid_key))
    }

    fn reduce(requirements: Vec<BackendRequirement>) -> ServiceRequirement {
        let mut requirements = requirements.into_iter();
        let Some(first) = requirements.next() else {
            return ServiceRequirement::NoInstances;
        };
        if requirements.all(|r| r == first) {
            ServiceRequirement::Uniform(first)
        } else {
            ServiceRequirement::Heterogeneous
        }
    }

    fn bind_to_service<'c>(
        service_id: &str,
        credential: &'c Credential,
    ) -> Result<Cow<'c, Credential>, DomainError> {
        credential.for_service(service_id).ok_or_else(|| {
            tracing::debug!(
                kind = %credential.kind(),
                "access token targets another service"
            );
            DomainError::CredentialInvalid {
                kind: credential.kind(),
            }
        })
    }

    /// Command for `credential` against `requirement`, from the cache when unexpired.
    ///
    /// Commands carrying the user's identity are only served while `credential` is
    /// still valid, cache hits included.
    ///
    /// # Errors
    ///
    /// - [`DomainError::CredentialInvalid`] when the credential is no longer valid
    /// - scheme generation failures
    pub async fn get_command(
        &self,
        requirement: &BackendRequirement,
        credential: &Credential,
    ) -> Result<Arc<AuthenticationCommand>, DomainError> {
        let key = (requirement.clone(), credential.cache_key());
        let command = self
            .cache
            .get_or_create(key, || self.schemes.create(requirement, credential))
            .await?;
        if command.requires_valid_source() && !self.schemes.broker().is_valid(credential).await {
            tracing::debug!(kind = %credential.kind(), "credential no longer valid, command withheld");
            return Err(DomainError::CredentialInvalid {
                kind: credential.kind(),
            });
        }
        Ok(command)
    }

    /// Command for `credential` against every live instance of `service_id`.
    ///
    /// # Errors
    ///
    /// - [`DomainError::CredentialInvalid`] when an access token targets another service
    /// - [`DomainError::Registry`] when the instance lookup fails
    /// - scheme generation failures for uniform services
    #[tracing::instrument(skip_all, fields(service_id = %service_id))]
    pub async fn get_service_command(
        self: &Arc<Self>,
        service_id: &str,
        credential: &Credential,
        routing: &mut RoutingContext,
    ) -> Result<Arc<AuthenticationCommand>, DomainError> {
        let credential = Self::bind_to_service(service_id, credential)?;
        let requirements: Vec<BackendRequirement> = self
            .registry
            .get_instances(service_id)
            .await?
            .iter()
            .map(|instance| self.requirement_for(instance))
            .collect();
        for requirement in &requirements {
            self.cache.track(service_id, requirement);
        }
        let instances = requirements.len();

        match Self::reduce(requirements) {
            ServiceRequirement::NoInstances => {
                tracing::debug!("no live instances, no authentication applied");
                Ok(Arc::new(AuthenticationCommand::Empty))
            }
            ServiceRequirement::Uniform(requirement) => {
                self.get_command(&requirement, &credential).await
            }
            ServiceRequirement::Heterogeneous => {
                tracing::debug!(
                    instances,
                    "instances disagree on authentication, deferring to load balancer"
                );
                let this: Arc<Self> = Arc::clone(self);
                let resolver: Arc<dyn InstanceCommandResolver> = this;
                let command = Arc::new(AuthenticationCommand::Universal(UniversalCommand::new(
                    service_id,
                    credential.into_owned(),
                    resolver,
                )));
                routing.defer(Arc::clone(&command));
                Ok(command)
            }
        }
    }

    pub fn evict_service(&self, service_id: &str) {
        self.cache.evict_service(service_id);
    }

    pub fn evict_all(&self) {
        self.cache.evict_all();
    }

    pub fn on_registry_event(&self, event: &RegistryEvent) {
        match event {
            RegistryEvent::ServiceChanged(service_id) => self.evict_service(service_id),
            RegistryEvent::Refreshed => self.evict_all(),
        }
    }
}

#[async_trait]
impl InstanceCommandResolver for CommandService {
    #[tracing::instrument(skip_all, fields(service_id = %instance.service_id, instance_id = %instance.instance_id))]
    async fn command_for_instance(
        &self,
        instance: &ServiceInstance,
        credential: &Credential,
    ) -> Result<Arc<AuthenticationCommand>, ServiceAuthError> {
        let credential = Self::bind_to_service(&instance.service_id, credential)?;
        let requirement = self.requirement_for(instance);
        self.cache.track(&instance.service_id, &requirement);
        Ok(self.get_command(&requirement, &credential).await?)
    }
}
