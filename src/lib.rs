//! # Telford — process-local message routing fabric
//!
//! Telford routes messages between logical *end points* inside one process.
//! Producers tag a message with a hierarchical *route* key; the router looks
//! up interested end-point addresses in a route manager and dispatches either
//! point-to-point (the first handler to take the message wins) or publish
//! (every matching end point is contacted, handled responses are collected).
//!
//! Each logical address is backed by a *cluster* of one or more concrete end
//! points distinguished by cluster node identifiers, so replicas of the same
//! address can coexist; sends that name no node land in the cluster's
//! broadcast inbox and are claimed by whichever replica receives first.
//!
//! Request/response semantics are carried by a single-shot receive-result
//! handshake with linked cancellation: the sender awaits exactly one of the
//! receiver's ack, handler result or cancellation. Delivery is at-most-once;
//! a target that disappears mid-flight is reported as the default (soft
//! failure) result, never as an error.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use telford::{
//!     InMemoryRouteManager, RouteHierarchy, RouteMessage, RouterConfig, RouterFactory,
//!     RoutingSystem, EndpointScope,
//! };
//! # use telford::{RouteMessageHandler, RouteMessageHandleResult, Route, BoxError};
//! # struct MyHandler;
//! # #[async_trait::async_trait]
//! # impl RouteMessageHandler for MyHandler {
//! #     async fn handle(
//! #         &self,
//! #         _route_message: RouteMessage,
//! #         _route: Route,
//! #         _publish: bool,
//! #         _local_dispatch: bool,
//! #         _remote_scope: EndpointScope,
//! #         _local_scope: EndpointScope,
//! #         _token: CancellationToken,
//! #     ) -> Result<RouteMessageHandleResult, BoxError> {
//! #         Ok(RouteMessageHandleResult::default())
//! #     }
//! # }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let system = RoutingSystem::new();
//! let route_manager = Arc::new(InMemoryRouteManager::new());
//! let factory = RouterFactory::new(system, route_manager, &RouterConfig::default());
//!
//! let router = factory.create_router("orders".into(), Arc::new(MyHandler))?;
//!
//! let responses = router
//!     .route_hierarchy(
//!         &RouteHierarchy::new(vec!["orders/created".into()]),
//!         RouteMessage::default(),
//!         false,
//!         EndpointScope::NO_SCOPE,
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! # drop(responses);
//! router.dispose().await;
//! # Ok(())
//! # }
//! ```

pub mod cluster;
pub mod config;
pub mod domain_types;
pub mod endpoint;
pub mod factory;
pub mod message;
pub mod receive_result;
pub mod route_manager;
pub mod router;
pub mod system;
pub mod traits;

mod cancellation;
mod frame;
mod inbox;

pub use cluster::EndpointCluster;
pub use config::{ConfigError, EndpointName, RouterConfig, RouterConfigBuilder};
pub use domain_types::{
    ClusterNodeId, EndpointAddress, EndpointScope, Route, RouteHierarchy, RouteMessage,
    RouteMessageHandleResult, RouteRegistration, RouteRegistrationOptions, RouteTarget,
};
pub use endpoint::RouteEndpoint;
pub use factory::RouterFactory;
pub use frame::FrameError;
pub use message::Message;
pub use receive_result::ReceiveResult;
pub use route_manager::InMemoryRouteManager;
pub use router::MessageRouter;
pub use system::RoutingSystem;
pub use traits::{BoxError, RouteManager, RouteMessageHandler, RoutingError};
