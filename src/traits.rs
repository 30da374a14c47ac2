//! Error taxonomy and consumed contracts
//!
//! The routing fabric consumes two interfaces it does not implement itself:
//! the route manager (the directory mapping routes to registered end points)
//! and the route-message handler (the user callback the router drives). Both
//! are closed-world seams: exactly the operations below, nothing more.

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain_types::{
    EndpointAddress, EndpointScope, Route, RouteMessage, RouteMessageHandleResult,
    RouteRegistration, RouteTarget,
};

/// Boxed error for faults crossing the consumed contracts.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures surfaced by the routing fabric.
///
/// Soft unavailability (a target that evaporated or never existed) is *not*
/// an error; it is reported as the default
/// [`RouteMessageHandleResult`](crate::RouteMessageHandleResult).
#[derive(Debug, Error)]
pub enum RoutingError {
    /// The router, end point or routing system has been disposed.
    #[error("the routing component has been disposed")]
    Disposed,

    /// A cancellation token was observed.
    #[error("the operation was canceled")]
    Canceled,

    /// An end point already exists for the address in this process.
    #[error("an end point is already present for address {address}")]
    AlreadyPresent {
        /// The contested address.
        address: EndpointAddress,
    },

    /// A dispatch was attempted without a target scope.
    #[error("dispatch requires a target scope")]
    MissingTargetScope,

    /// The route manager failed while the router was consulting it.
    #[error("route manager failure")]
    RouteManager {
        /// The route manager's own failure.
        #[source]
        source: BoxError,
    },
}

/// The user callback the router invokes for every message it matches.
///
/// `local_dispatch` is the sender's assertion that the dispatch stays on the
/// local logical end point; treat it as a policy hint only. `remote_scope`
/// and `local_scope` are already expressed from the handler's side: local
/// means "here".
#[async_trait]
pub trait RouteMessageHandler: Send + Sync {
    /// Handles one routed message, returning whether it was taken and the
    /// response to hand back to the sender.
    #[allow(clippy::too_many_arguments)]
    async fn handle(
        &self,
        route_message: RouteMessage,
        route: Route,
        publish: bool,
        local_dispatch: bool,
        remote_scope: EndpointScope,
        local_scope: EndpointScope,
        token: CancellationToken,
    ) -> Result<RouteMessageHandleResult, BoxError>;
}

/// The directory that stores `route -> (end point, options)` registrations.
///
/// The router consumes this contract; storage and replication are the
/// implementation's business. One ordering property is relied upon: within a
/// single `get_routes` call the returned targets are stable, and
/// later-registered targets sort after earlier ones. P2p dispatch iterates
/// the result in reverse so that the most recently registered (most
/// specific) handler is tried first.
#[async_trait]
pub trait RouteManager: Send + Sync {
    /// Records a registration for `end_point`.
    async fn add_route(
        &self,
        end_point: EndpointAddress,
        registration: RouteRegistration,
        token: CancellationToken,
    ) -> Result<(), BoxError>;

    /// Removes one route registered by `end_point`.
    async fn remove_route(
        &self,
        end_point: EndpointAddress,
        route: Route,
        token: CancellationToken,
    ) -> Result<(), BoxError>;

    /// Removes every route registered by `end_point`; persistent
    /// registrations are only touched when `include_persistent` is set.
    async fn remove_routes(
        &self,
        end_point: EndpointAddress,
        include_persistent: bool,
        token: CancellationToken,
    ) -> Result<(), BoxError>;

    /// All targets registered for `route`, in registration order.
    async fn get_routes(
        &self,
        route: Route,
        token: CancellationToken,
    ) -> Result<Vec<RouteTarget>, BoxError>;
}
