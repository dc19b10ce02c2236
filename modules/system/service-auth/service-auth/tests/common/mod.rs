#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

//! Shared fixtures for the service auth integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use secrecy::SecretString;
use service_auth::{Collaborators, ServiceAuthConfig, ServiceAuthModule};
use service_auth_sdk::{
    PassTicketError, PassTicketGenerator, PeerError, PeerInvalidationClient, ServiceInstance,
};
use static_registry_plugin::StaticServiceRegistry;

pub const SECRET: &str = "integration-test-secret";
pub const SCHEME_KEY: &str = "authentication.scheme";
pub const APPLID_KEY: &str = "authentication.applid";

/// Config with a signing secret and pass-tickets that stay cached for a minute.
pub fn config() -> ServiceAuthConfig {
    let mut config = ServiceAuthConfig::default();
    config.token.secret = SecretString::from(SECRET);
    config.cluster.instance_id = "gw-1".to_owned();
    config.passticket.ttl_millis = 60_000;
    config
}

pub fn instance(
    instance_id: &str,
    service_id: &str,
    scheme: Option<&str>,
    applid: Option<&str>,
) -> ServiceInstance {
    let mut metadata = HashMap::new();
    if let Some(scheme) = scheme {
        metadata.insert(SCHEME_KEY.to_owned(), scheme.to_owned());
    }
    if let Some(applid) = applid {
        metadata.insert(APPLID_KEY.to_owned(), applid.to_owned());
    }
    ServiceInstance {
        instance_id: instance_id.to_owned(),
        service_id: service_id.to_owned(),
        host: "127.0.0.1".to_owned(),
        port: 8080,
        secure_port: None,
        metadata,
    }
}

/// Records every generation request and hands out `PT1`, `PT2`, ...
#[derive(Default)]
pub struct CountingTickets {
    calls: Mutex<Vec<(String, String)>>,
    counter: AtomicUsize,
    fail: AtomicBool,
}

impl CountingTickets {
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PassTicketGenerator for CountingTickets {
    async fn generate(
        &self,
        user_id: &str,
        application_id: &str,
    ) -> Result<SecretString, PassTicketError> {
        self.calls
            .lock()
            .unwrap()
            .push((user_id.to_owned(), application_id.to_owned()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(PassTicketError {
                user_id: user_id.to_owned(),
                application_id: application_id.to_owned(),
                reason: "RACF refused".to_owned(),
            });
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SecretString::from(format!("PT{n}")))
    }
}

pub struct NoPeers;

#[async_trait]
impl PeerInvalidationClient for NoPeers {
    async fn invalidate(&self, _: &ServiceInstance, _: &str) -> Result<(), PeerError> {
        Ok(())
    }
}

pub struct Harness {
    pub module: ServiceAuthModule,
    pub registry: Arc<StaticServiceRegistry>,
    pub tickets: Arc<CountingTickets>,
}

pub fn harness(config: ServiceAuthConfig, instances: Vec<ServiceInstance>) -> Harness {
    harness_with(config, instances, |c| c)
}

pub fn harness_with(
    config: ServiceAuthConfig,
    instances: Vec<ServiceInstance>,
    extend: impl FnOnce(Collaborators) -> Collaborators,
) -> Harness {
    let registry = Arc::new(StaticServiceRegistry::new(instances));
    let tickets = Arc::new(CountingTickets::default());
    let collaborators = Collaborators::new(registry.clone(), tickets.clone())
        .with_peers(Arc::new(NoPeers));
    let module = ServiceAuthModule::init(config, extend(collaborators)).unwrap();
    Harness {
        module,
        registry,
        tickets,
    }
}
