//! Collaborator trait implementations for the static plugin.

use async_trait::async_trait;
use secrecy::SecretString;
use service_auth_sdk::{
    PassTicketError, PassTicketGenerator, RegistryError, ServiceInstance, ServiceRegistryClient,
};

use super::service::{StaticPassTicketGenerator, StaticServiceRegistry};

#[async_trait]
impl ServiceRegistryClient for StaticServiceRegistry {
    async fn get_instances(&self, service_id: &str) -> Result<Vec<ServiceInstance>, RegistryError> {
        Ok(self.instances_of(service_id))
    }
}

#[async_trait]
impl PassTicketGenerator for StaticPassTicketGenerator {
    async fn generate(
        &self,
        user_id: &str,
        application_id: &str,
    ) -> Result<SecretString, PassTicketError> {
        self.issue(user_id, application_id)
            .map_err(|reason| PassTicketError {
                user_id: user_id.to_owned(),
                application_id: application_id.to_owned(),
                reason,
            })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::{PassTicketConfig, StaticRegistryPluginConfig};

    #[tokio::test]
    async fn registry_from_config() {
        let cfg: StaticRegistryPluginConfig = serde_json::from_value(serde_json::json!({
            "instances": [{
                "instance_id": "orders-1",
                "service_id": "orders",
                "host": "orders.internal",
                "port": 8080,
                "metadata": { "authentication.scheme": "bypass" }
            }]
        }))
        .unwrap();
        let registry = StaticServiceRegistry::from_config(&cfg);
        let client: &dyn ServiceRegistryClient = &registry;

        let instances = client.get_instances("orders").await.unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].metadata_value("authentication.scheme"), Some("bypass"));
        assert!(client.get_instances("billing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn generation_failure_names_user_and_application() {
        let generator = StaticPassTicketGenerator::from_config(&PassTicketConfig {
            applications: Vec::new(),
            denied_users: vec!["bob".to_owned()],
        });
        let client: &dyn PassTicketGenerator = &generator;

        let err = client.generate("bob", "IZUDFLT").await.unwrap_err();
        assert_eq!(err.user_id, "bob");
        assert_eq!(err.application_id, "IZUDFLT");
    }

    #[test]
    fn unknown_config_keys_are_rejected() {
        let parsed: Result<StaticRegistryPluginConfig, _> =
            serde_json::from_value(serde_json::json!({ "unknown": true }));
        assert!(parsed.is_err());
    }
}
