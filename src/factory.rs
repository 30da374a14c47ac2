//! Router factory
//!
//! Wires a new end point and a message router together. The default-address
//! variant reads its address from [`RouterConfig`] once, at factory
//! construction.

use std::sync::Arc;

use crate::config::RouterConfig;
use crate::domain_types::EndpointAddress;
use crate::router::MessageRouter;
use crate::system::RoutingSystem;
use crate::traits::{RouteManager, RouteMessageHandler, RoutingError};

/// Stateless builder of [`MessageRouter`]s over one routing system and one
/// route manager.
#[derive(Clone)]
pub struct RouterFactory {
    routing_system: Arc<RoutingSystem>,
    route_manager: Arc<dyn RouteManager>,
    default_address: EndpointAddress,
}

impl RouterFactory {
    /// Creates a factory. The configured default end-point name is captured
    /// here; later config changes do not affect this factory.
    pub fn new(
        routing_system: Arc<RoutingSystem>,
        route_manager: Arc<dyn RouteManager>,
        config: &RouterConfig,
    ) -> Self {
        Self {
            routing_system,
            route_manager,
            default_address: EndpointAddress::from(config.default_end_point.to_string()),
        }
    }

    /// Creates a router on a newly created end point for `address`.
    pub fn create_router(
        &self,
        address: EndpointAddress,
        handler: Arc<dyn RouteMessageHandler>,
    ) -> Result<MessageRouter, RoutingError> {
        let end_point = self.routing_system.create_end_point(address)?;
        Ok(MessageRouter::new(
            handler,
            end_point,
            Arc::clone(&self.route_manager),
        ))
    }

    /// Creates a router on the configured default address.
    pub fn create_default_router(
        &self,
        handler: Arc<dyn RouteMessageHandler>,
    ) -> Result<MessageRouter, RoutingError> {
        self.create_router(self.default_address.clone(), handler)
    }

    /// The address used by [`create_default_router`](Self::create_default_router).
    #[must_use]
    pub fn default_address(&self) -> &EndpointAddress {
        &self.default_address
    }
}
