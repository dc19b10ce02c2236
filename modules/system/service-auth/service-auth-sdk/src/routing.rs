//! Request-scoped routing state shared between command lookup and load balancing.

use std::sync::Arc;

use auth_context::OutboundRequest;

use crate::command::AuthenticationCommand;
use crate::error::ServiceAuthError;
use crate::models::ServiceInstance;

/// Marker telling the load-balancing step to run a deferred command once it has
/// picked an instance.
#[derive(Debug, Clone)]
pub struct LoadBalancerCommand {
    command: Arc<AuthenticationCommand>,
}

impl LoadBalancerCommand {
    #[must_use]
    pub fn command(&self) -> &Arc<AuthenticationCommand> {
        &self.command
    }
}

/// Per-request state passed explicitly from command lookup to the routing step.
#[derive(Debug, Default)]
pub struct RoutingContext {
    deferred: Option<LoadBalancerCommand>,
}

impl RoutingContext {
    /// Record a deferred command for the load balancer.
    pub fn defer(&mut self, command: Arc<AuthenticationCommand>) {
        self.deferred = Some(LoadBalancerCommand { command });
    }

    #[must_use]
    pub fn load_balancer_command(&self) -> Option<&LoadBalancerCommand> {
        self.deferred.as_ref()
    }

    #[must_use]
    pub fn is_deferred(&self) -> bool {
        self.deferred.is_some()
    }

    /// Run the deferred command against the chosen `instance`, consuming the marker.
    ///
    /// Returns `false` when nothing was deferred.
    ///
    /// # Errors
    ///
    /// Propagates failures of the deferred command.
    pub async fn apply_for_instance(
        &mut self,
        instance: &ServiceInstance,
        request: &mut OutboundRequest,
    ) -> Result<bool, ServiceAuthError> {
        let Some(deferred) = self.deferred.take() else {
            return Ok(false);
        };
        deferred.command.apply(request, Some(instance)).await?;
        Ok(true)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn instance() -> ServiceInstance {
        ServiceInstance {
            instance_id: "a".to_owned(),
            service_id: "svc".to_owned(),
            host: "h".to_owned(),
            port: 1,
            secure_port: None,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn nothing_deferred_is_a_no_op() {
        let mut ctx = RoutingContext::default();
        let mut request = OutboundRequest::default();
        assert!(!ctx.apply_for_instance(&instance(), &mut request).await.unwrap());
    }

    #[tokio::test]
    async fn deferred_marker_is_consumed() {
        let mut ctx = RoutingContext::default();
        ctx.defer(Arc::new(AuthenticationCommand::Bypass));
        assert!(ctx.is_deferred());

        let mut request = OutboundRequest::default();
        assert!(ctx.apply_for_instance(&instance(), &mut request).await.unwrap());
        assert!(!ctx.is_deferred());
    }
}
