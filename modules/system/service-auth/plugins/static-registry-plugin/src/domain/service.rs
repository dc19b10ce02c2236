//! In-memory registry and pass-ticket generator.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use secrecy::SecretString;
use service_auth_sdk::{RegistryEvent, ServiceInstance};

use crate::config::{PassTicketConfig, StaticRegistryPluginConfig};

/// Service registry backed by a list of instances.
pub struct StaticServiceRegistry {
    instances: RwLock<Vec<ServiceInstance>>,
}

impl StaticServiceRegistry {
    #[must_use]
    pub fn from_config(cfg: &StaticRegistryPluginConfig) -> Self {
        Self::new(cfg.instances.clone())
    }

    #[must_use]
    pub fn new(instances: Vec<ServiceInstance>) -> Self {
        Self {
            instances: RwLock::new(instances),
        }
    }

    /// Instances of `service_id`, compared case-insensitively.
    #[must_use]
    pub fn instances_of(&self, service_id: &str) -> Vec<ServiceInstance> {
        self.instances
            .read()
            .iter()
            .filter(|i| i.service_id.eq_ignore_ascii_case(service_id))
            .cloned()
            .collect()
    }

    /// Add or replace an instance (matched by instance id).
    #[must_use = "forward the event so cached commands are evicted"]
    pub fn register(&self, instance: ServiceInstance) -> RegistryEvent {
        let service_id = instance.service_id.clone();
        let mut instances = self.instances.write();
        match instances
            .iter_mut()
            .find(|i| i.instance_id == instance.instance_id)
        {
            Some(existing) => *existing = instance,
            None => instances.push(instance),
        }
        tracing::debug!(service_id = %service_id, "instance registered");
        RegistryEvent::ServiceChanged(service_id)
    }

    /// Remove an instance. `None` when it was not registered.
    #[must_use = "forward the event so cached commands are evicted"]
    pub fn deregister(&self, instance_id: &str) -> Option<RegistryEvent> {
        let mut instances = self.instances.write();
        let position = instances.iter().position(|i| i.instance_id == instance_id)?;
        let removed = instances.remove(position);
        tracing::debug!(service_id = %removed.service_id, instance_id, "instance deregistered");
        Some(RegistryEvent::ServiceChanged(removed.service_id))
    }
}

/// Generates random single-use pass-tickets.
pub struct StaticPassTicketGenerator {
    applications: HashSet<String>,
    denied_users: HashSet<String>,
    generated: AtomicUsize,
}

impl StaticPassTicketGenerator {
    #[must_use]
    pub fn from_config(cfg: &PassTicketConfig) -> Self {
        Self {
            applications: cfg
                .applications
                .iter()
                .map(|a| a.to_ascii_uppercase())
                .collect(),
            denied_users: cfg
                .denied_users
                .iter()
                .map(|u| u.to_ascii_uppercase())
                .collect(),
            generated: AtomicUsize::new(0),
        }
    }

    /// Number of tickets handed out so far.
    #[must_use]
    pub fn generated(&self) -> usize {
        self.generated.load(Ordering::SeqCst)
    }

    /// A fresh eight-character ticket, or the reason none can be issued.
    ///
    /// # Errors
    ///
    /// Returns a reason when the user is denied or the application is unknown.
    pub fn issue(&self, user_id: &str, application_id: &str) -> Result<SecretString, String> {
        if self.denied_users.contains(&user_id.to_ascii_uppercase()) {
            return Err("user is not authorized for pass-tickets".to_owned());
        }
        if !self.applications.is_empty()
            && !self.applications.contains(&application_id.to_ascii_uppercase())
        {
            return Err("application is not defined".to_owned());
        }
        let mut ticket = uuid::Uuid::new_v4().simple().to_string();
        ticket.truncate(8);
        self.generated.fetch_add(1, Ordering::SeqCst);
        Ok(SecretString::from(ticket.to_ascii_uppercase()))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn instance(id: &str, service: &str) -> ServiceInstance {
        ServiceInstance {
            instance_id: id.to_owned(),
            service_id: service.to_owned(),
            host: "localhost".to_owned(),
            port: 8080,
            secure_port: None,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = StaticServiceRegistry::new(vec![instance("a-1", "Orders")]);
        assert_eq!(registry.instances_of("orders").len(), 1);
        assert!(registry.instances_of("billing").is_empty());
    }

    #[test]
    fn register_replaces_by_instance_id() {
        let registry = StaticServiceRegistry::new(vec![instance("a-1", "orders")]);
        let mut moved = instance("a-1", "orders");
        moved.port = 9090;

        assert_eq!(
            registry.register(moved),
            RegistryEvent::ServiceChanged("orders".to_owned())
        );
        let instances = registry.instances_of("orders");
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].port, 9090);
    }

    #[test]
    fn deregister_reports_the_service() {
        let registry = StaticServiceRegistry::new(vec![instance("a-1", "orders")]);
        assert_eq!(
            registry.deregister("a-1"),
            Some(RegistryEvent::ServiceChanged("orders".to_owned()))
        );
        assert_eq!(registry.deregister("a-1"), None);
    }

    #[test]
    fn tickets_are_fresh_and_counted() {
        let generator = StaticPassTicketGenerator::from_config(&PassTicketConfig::default());
        let a = generator.issue("alice", "IZUDFLT").unwrap();
        let b = generator.issue("alice", "IZUDFLT").unwrap();

        assert_eq!(a.expose_secret().len(), 8);
        assert_ne!(a.expose_secret(), b.expose_secret());
        assert_eq!(generator.generated(), 2);
    }

    #[test]
    fn restrictions_are_enforced() {
        let generator = StaticPassTicketGenerator::from_config(&PassTicketConfig {
            applications: vec!["izudflt".to_owned()],
            denied_users: vec!["mallory".to_owned()],
        });

        assert!(generator.issue("alice", "IZUDFLT").is_ok());
        assert!(generator.issue("alice", "OTHER").is_err());
        assert!(generator.issue("MALLORY", "IZUDFLT").is_err());
        assert_eq!(generator.generated(), 1);
    }
}
