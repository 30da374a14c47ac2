//! The message router
//!
//! One router runs per local end point. It owns the long-lived receive loop,
//! decodes inbound routing frames and drives the user handler, and on the
//! outbound side walks route hierarchies to dispatch point-to-point or
//! publish fan-out. P2p stops at the first handler that takes the message;
//! publish contacts every matching end point and aggregates the handled
//! responses.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::cancellation::LinkedCancellation;
use crate::domain_types::{
    ClusterNodeId, EndpointAddress, EndpointScope, Route, RouteHierarchy, RouteMessage,
    RouteMessageHandleResult, RouteRegistration, RouteRegistrationOptions, RouteTarget,
};
use crate::endpoint::RouteEndpoint;
use crate::frame::{self, RoutingFrame};
use crate::receive_result::ReceiveResult;
use crate::traits::{RouteManager, RouteMessageHandler, RoutingError};

/// Routes messages between the local end point and the rest of the fabric.
pub struct MessageRouter {
    inner: Arc<RouterInner>,
    receive_task: Mutex<Option<JoinHandle<()>>>,
}

struct RouterInner {
    handler: Arc<dyn RouteMessageHandler>,
    end_point: Arc<RouteEndpoint>,
    route_manager: Arc<dyn RouteManager>,
    seq: AtomicI64,
    disposal: CancellationToken,
    disposed: AtomicBool,
}

impl MessageRouter {
    /// Creates a router bound to `end_point` and starts its receive loop.
    ///
    /// Every message arriving at the end point is decoded and handed to
    /// `handler`; every outbound dispatch consults `route_manager` for
    /// matching targets.
    pub fn new(
        handler: Arc<dyn RouteMessageHandler>,
        end_point: Arc<RouteEndpoint>,
        route_manager: Arc<dyn RouteManager>,
    ) -> Self {
        let inner = Arc::new(RouterInner {
            handler,
            end_point,
            route_manager,
            seq: AtomicI64::new(0),
            disposal: CancellationToken::new(),
            disposed: AtomicBool::new(false),
        });
        let receive_task = spawn_receive_task(Arc::clone(&inner));
        Self {
            inner,
            receive_task: Mutex::new(Some(receive_task)),
        }
    }

    /// The local end point's logical address.
    #[must_use]
    pub fn address(&self) -> &EndpointAddress {
        self.inner.end_point.address()
    }

    /// The local end point's cluster node identifier.
    #[must_use]
    pub fn cluster_node_id(&self) -> &ClusterNodeId {
        self.inner.end_point.cluster_node_id()
    }

    /// Allocates a fresh scope for a call originating here.
    #[must_use]
    pub fn create_scope(&self) -> EndpointScope {
        self.inner.own_scope(self.inner.next_seq())
    }

    /// Whether `scope` names this router's end point.
    #[must_use]
    pub fn owns_scope(&self, scope: &EndpointScope) -> bool {
        scope.address() == self.address() && scope.cluster_node_id() == self.cluster_node_id()
    }

    /// Dispatches `route_message` to the single end point `remote_scope`
    /// names and returns the response route message.
    ///
    /// A `NO_SCOPE` local scope is replaced with this router's own scope.
    /// When the target scope is route-compatible with the local one the
    /// handler is invoked directly, without a frame or a transport send.
    /// The default route message signals that the target declined or does
    /// not exist.
    pub async fn route(
        &self,
        route: Route,
        route_message: RouteMessage,
        publish: bool,
        remote_scope: EndpointScope,
        local_scope: EndpointScope,
        token: &CancellationToken,
    ) -> Result<RouteMessage, RoutingError> {
        self.ensure_not_disposed()?;
        let result = Arc::clone(&self.inner)
            .dispatch(
                route,
                route_message,
                publish,
                remote_scope,
                local_scope,
                token.clone(),
            )
            .await?;
        Ok(result.into_route_message())
    }

    /// Walks `routes` most specific first and dispatches to the matching
    /// targets.
    ///
    /// P2p (`publish == false`) tries candidates within a route level in
    /// reverse registration order and returns the first handled response as
    /// a one-element list; if nothing handled the message, the last
    /// unsuccessful result is returned instead (empty when there was no
    /// candidate at all). Publish contacts every matching end point exactly
    /// once across all levels and returns the responses of those that
    /// reported handling, in no particular order.
    pub async fn route_hierarchy(
        &self,
        routes: &RouteHierarchy,
        route_message: RouteMessage,
        publish: bool,
        local_scope: EndpointScope,
        token: &CancellationToken,
    ) -> Result<Vec<RouteMessage>, RoutingError> {
        self.ensure_not_disposed()?;
        let inner = &self.inner;

        let mut contacted: HashSet<EndpointAddress> = HashSet::new();
        let mut last_unsuccessful: Option<RouteMessageHandleResult> = None;
        let mut tasks: Vec<JoinHandle<Result<RouteMessageHandleResult, RoutingError>>> =
            Vec::new();

        for route in routes {
            let matches = inner
                .route_manager
                .get_routes(route.clone(), token.clone())
                .await
                .map_err(|source| RoutingError::RouteManager { source })?;

            let matches: Vec<RouteTarget> = matches
                .into_iter()
                .filter(|target| {
                    if publish && contacted.contains(target.end_point()) {
                        return false;
                    }
                    // Local-dispatch-only registrations are invisible to
                    // every end point but their owner.
                    if target
                        .options()
                        .contains(RouteRegistrationOptions::LOCAL_DISPATCH_ONLY)
                        && target.end_point() != inner.end_point.address()
                    {
                        return false;
                    }
                    true
                })
                .collect();

            if matches.is_empty() {
                continue;
            }

            if publish {
                for target in &matches {
                    contacted.insert(target.end_point().clone());
                }
                for target in matches {
                    let inner = Arc::clone(inner);
                    let route = route.clone();
                    let route_message = route_message.clone();
                    let local_scope = local_scope.clone();
                    let token = token.clone();
                    let remote_scope = EndpointScope::new(
                        target.end_point().clone(),
                        ClusterNodeId::default(),
                        0,
                    );
                    tasks.push(tokio::spawn(async move {
                        inner
                            .dispatch(route, route_message, true, remote_scope, local_scope, token)
                            .await
                    }));
                }
            } else {
                // Later registrations are more specific; try them first.
                for target in matches.iter().rev() {
                    if target.end_point().is_unknown() {
                        continue;
                    }
                    if target
                        .options()
                        .contains(RouteRegistrationOptions::PUBLISH_ONLY)
                    {
                        continue;
                    }
                    let remote_scope = EndpointScope::new(
                        target.end_point().clone(),
                        ClusterNodeId::default(),
                        0,
                    );
                    let result = Arc::clone(inner)
                        .dispatch(
                            route.clone(),
                            route_message.clone(),
                            false,
                            remote_scope,
                            local_scope.clone(),
                            token.clone(),
                        )
                        .await?;
                    if result.is_handled() {
                        return Ok(vec![result.into_route_message()]);
                    }
                    last_unsuccessful = Some(result);
                }
            }
        }

        if publish {
            if tasks.is_empty() {
                return Ok(Vec::new());
            }
            let outcomes = join_all(tasks).await;
            Ok(outcomes
                .into_iter()
                .filter_map(|joined| match joined {
                    Ok(Ok(result)) if result.is_handled() => Some(result.into_route_message()),
                    Ok(Ok(_)) => None,
                    Ok(Err(error)) => {
                        debug!(target: "telford::router", %error, "publish dispatch dropped");
                        None
                    }
                    Err(join_error) => {
                        warn!(target: "telford::router", %join_error, "publish dispatch task failed");
                        None
                    }
                })
                .collect())
        } else {
            Ok(last_unsuccessful
                .map(|result| vec![result.into_route_message()])
                .unwrap_or_default())
        }
    }

    /// Registers a route for this router's end point.
    pub async fn register_route(
        &self,
        registration: RouteRegistration,
        token: &CancellationToken,
    ) -> Result<(), RoutingError> {
        self.ensure_not_disposed()?;
        self.inner
            .route_manager
            .add_route(self.address().clone(), registration, token.clone())
            .await
            .map_err(|source| RoutingError::RouteManager { source })
    }

    /// Removes one route registered by this router's end point.
    pub async fn unregister_route(
        &self,
        route: Route,
        token: &CancellationToken,
    ) -> Result<(), RoutingError> {
        self.ensure_not_disposed()?;
        self.inner
            .route_manager
            .remove_route(self.address().clone(), route, token.clone())
            .await
            .map_err(|source| RoutingError::RouteManager { source })
    }

    /// Removes every route registered by this router's end point.
    pub async fn unregister_all(
        &self,
        include_persistent: bool,
        token: &CancellationToken,
    ) -> Result<(), RoutingError> {
        self.ensure_not_disposed()?;
        self.inner
            .route_manager
            .remove_routes(self.address().clone(), include_persistent, token.clone())
            .await
            .map_err(|source| RoutingError::RouteManager { source })
    }

    /// Disposes the router: stops the receive loop, disposes the local end
    /// point and clears its non-persistent route registrations. In-flight
    /// dispatches observe [`RoutingError::Disposed`]. Idempotent.
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(target: "telford::router", address = %self.address(), "disposing router");
        self.inner.disposal.cancel();

        let task = self
            .receive_task
            .lock()
            .expect("router mutex poisoned")
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }

        self.inner.end_point.dispose();

        if let Err(error) = self
            .inner
            .route_manager
            .remove_routes(self.address().clone(), false, CancellationToken::new())
            .await
        {
            warn!(
                target: "telford::router",
                %error,
                "failed to clear route registrations on disposal"
            );
        }
    }

    fn ensure_not_disposed(&self) -> Result<(), RoutingError> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            Err(RoutingError::Disposed)
        } else {
            Ok(())
        }
    }
}

impl Drop for MessageRouter {
    fn drop(&mut self) {
        // Backstop only; dispose() is the orderly path.
        self.inner.disposal.cancel();
        if let Some(task) = self
            .receive_task
            .lock()
            .expect("router mutex poisoned")
            .take()
        {
            task.abort();
        }
    }
}

impl RouterInner {
    fn own_scope(&self, seq: i64) -> EndpointScope {
        EndpointScope::new(
            self.end_point.address().clone(),
            self.end_point.cluster_node_id().clone(),
            seq,
        )
    }

    fn next_seq(&self) -> i64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Dispatches one message to one target scope and awaits the outcome.
    async fn dispatch(
        self: Arc<Self>,
        route: Route,
        route_message: RouteMessage,
        publish: bool,
        remote_scope: EndpointScope,
        local_scope: EndpointScope,
        token: CancellationToken,
    ) -> Result<RouteMessageHandleResult, RoutingError> {
        if remote_scope.is_no_scope() {
            return Err(RoutingError::MissingTargetScope);
        }
        let local_scope = if local_scope.is_no_scope() {
            self.own_scope(0)
        } else {
            local_scope
        };

        if local_scope.route_compatible(&remote_scope) {
            // The dispatch never leaves this end point: act as the receiver
            // directly, scopes reversed because we are now that side.
            trace!(target: "telford::router", route = %route, "short-circuit local dispatch");
            let linked = LinkedCancellation::link(&self.disposal, &token);
            return match self
                .handler
                .handle(
                    route_message,
                    route,
                    publish,
                    true,
                    local_scope,
                    remote_scope,
                    linked.token(),
                )
                .await
            {
                Ok(result) => Ok(result),
                Err(error) => {
                    warn!(target: "telford::router", %error, "route message handler failed");
                    Ok(RouteMessageHandleResult::default())
                }
            };
        }

        let local_dispatch = remote_scope.address() == self.end_point.address();
        let mut message = route_message.into_message();
        frame::encode(
            &RoutingFrame {
                publish,
                local_dispatch,
                remote_scope: remote_scope.clone(),
                local_scope,
                route,
            },
            &mut message,
        );

        let linked = LinkedCancellation::link(&self.disposal, &token);
        let sent = self
            .end_point
            .send(
                message,
                remote_scope.address().clone(),
                remote_scope.cluster_node_id().clone(),
                &linked.token(),
            )
            .await;
        match sent {
            // The linked token folds router disposal into the send's
            // cancellation; report it as what it was.
            Err(RoutingError::Canceled) if self.disposal.is_cancelled() => {
                Err(RoutingError::Disposed)
            }
            other => other,
        }
    }
}

fn spawn_receive_task(inner: Arc<RouterInner>) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(target: "telford::router", address = %inner.end_point.address(), "receive loop started");
        loop {
            match inner.end_point.receive(&inner.disposal).await {
                Ok(receive) => {
                    // Fire and forget: a failing handler task must never
                    // take down the receive loop.
                    let inner = Arc::clone(&inner);
                    tokio::spawn(handle_receive(inner, receive));
                }
                Err(RoutingError::Disposed | RoutingError::Canceled) => break,
                Err(error) => {
                    error!(target: "telford::router", %error, "receive failed, continuing");
                }
            }
        }
        debug!(target: "telford::router", address = %inner.end_point.address(), "receive loop stopped");
    })
}

/// Handles one inbound delivery and completes its receive result.
async fn handle_receive(inner: Arc<RouterInner>, receive: ReceiveResult) {
    let linked = LinkedCancellation::link(&inner.disposal, receive.cancellation());

    let mut message = receive.message().clone();
    let frame = match frame::decode(&mut message) {
        Ok(frame) => frame,
        Err(error) => {
            warn!(target: "telford::router", %error, "discarding malformed frame");
            receive.send_ack();
            return;
        }
    };

    if frame.local_scope.address() != inner.end_point.address() {
        warn!(
            target: "telford::router",
            expected = %inner.end_point.address(),
            actual = %frame.local_scope.address(),
            "frame addressed to a different end point"
        );
        receive.send_ack();
        return;
    }

    trace!(
        target: "telford::router",
        route = %frame.route,
        publish = frame.publish,
        remote = %frame.remote_scope,
        "handling routed message"
    );

    let outcome = inner
        .handler
        .handle(
            RouteMessage::from_message(message),
            frame.route,
            frame.publish,
            frame.local_dispatch,
            frame.remote_scope,
            frame.local_scope,
            linked.token(),
        )
        .await;

    if receive.cancellation().is_cancelled() {
        receive.send_cancellation();
        return;
    }

    match outcome {
        Ok(result) if result.is_handled() => receive.send_result(result),
        Ok(_) => receive.send_ack(),
        Err(error) => {
            warn!(target: "telford::router", %error, "route message handler failed");
            receive.send_ack();
        }
    }
}
