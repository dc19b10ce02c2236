//! Configuration for the static registry plugin.

use serde::Deserialize;
use service_auth_sdk::ServiceInstance;

/// Plugin configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticRegistryPluginConfig {
    /// Live instances, in registration order.
    pub instances: Vec<ServiceInstance>,

    pub pass_tickets: PassTicketConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PassTicketConfig {
    /// Applications tickets may be generated for. Empty means any.
    pub applications: Vec<String>,

    /// Users the generator refuses, to exercise failure paths.
    pub denied_users: Vec<String>,
}
