//! Route end points
//!
//! A [`RouteEndpoint`] is one concrete cluster node bound to a logical
//! address. It owns an unbounded inbox, competes with its sibling nodes for
//! the cluster's broadcast inbox, and sends through the routing system.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::cancellation::LinkedCancellation;
use crate::cluster::EndpointCluster;
use crate::domain_types::{ClusterNodeId, EndpointAddress, RouteMessageHandleResult};
use crate::inbox::Inbox;
use crate::message::Message;
use crate::receive_result::{Completion, ReceiveResult};
use crate::system::RoutingSystem;
use crate::traits::RoutingError;

/// One cluster node of a logical end point.
#[derive(Debug)]
pub struct RouteEndpoint {
    address: EndpointAddress,
    cluster_node_id: ClusterNodeId,
    inbox: Inbox<ReceiveResult>,
    broadcast: Arc<Inbox<ReceiveResult>>,
    cluster: Weak<EndpointCluster>,
    system: Weak<RoutingSystem>,
    disposal: CancellationToken,
    disposed: AtomicBool,
}

impl RouteEndpoint {
    pub(crate) fn new(
        address: EndpointAddress,
        cluster_node_id: ClusterNodeId,
        cluster: Weak<EndpointCluster>,
        broadcast: Arc<Inbox<ReceiveResult>>,
        system: Weak<RoutingSystem>,
    ) -> Arc<Self> {
        Arc::new(Self {
            address,
            cluster_node_id,
            inbox: Inbox::new(),
            broadcast,
            cluster,
            system,
            disposal: CancellationToken::new(),
            disposed: AtomicBool::new(false),
        })
    }

    /// The logical address shared by every node in the cluster.
    #[must_use]
    pub fn address(&self) -> &EndpointAddress {
        &self.address
    }

    /// This node's identifier, unique within its cluster.
    #[must_use]
    pub fn cluster_node_id(&self) -> &ClusterNodeId {
        &self.cluster_node_id
    }

    /// Receives the next delivery addressed to this node or broadcast to its
    /// cluster, whichever arrives first.
    ///
    /// FIFO order holds within each buffer; no order is defined between the
    /// two. Fails with [`RoutingError::Canceled`] when the caller's token
    /// fires and [`RoutingError::Disposed`] once the end point is disposed.
    pub async fn receive(&self, token: &CancellationToken) -> Result<ReceiveResult, RoutingError> {
        if self.disposal.is_cancelled() {
            return Err(RoutingError::Disposed);
        }
        tokio::select! {
            biased;
            () = self.disposal.cancelled() => Err(RoutingError::Disposed),
            () = token.cancelled() => Err(RoutingError::Canceled),
            item = self.inbox.pop() => item.map_err(|_| RoutingError::Disposed),
            item = self.broadcast.pop() => item.map_err(|_| RoutingError::Disposed),
        }
    }

    /// Sends a message to `remote_address` / `remote_node` and awaits the
    /// receiver's outcome.
    ///
    /// A target that does not exist, or disappears while the delivery is in
    /// flight, yields the default handle result rather than an error:
    /// delivery to a disappearing recipient is indistinguishable from
    /// delivery to a never-existent one. Disposal of *this* end point
    /// raises.
    pub async fn send(
        &self,
        message: Message,
        remote_address: EndpointAddress,
        remote_node: ClusterNodeId,
        token: &CancellationToken,
    ) -> Result<RouteMessageHandleResult, RoutingError> {
        if self.disposal.is_cancelled() {
            return Err(RoutingError::Disposed);
        }

        let linked = LinkedCancellation::link(token, &self.disposal);
        let (receive, result) =
            ReceiveResult::new(message, self.address.clone(), linked.token());

        if remote_address == self.address && remote_node == self.cluster_node_id {
            // Same node: deliver straight into our own inbox.
            if self.inbox.push(receive).is_err() {
                return Err(RoutingError::Disposed);
            }
        } else {
            let Some(cluster) = self
                .system
                .upgrade()
                .and_then(|system| system.get_cluster(&remote_address))
            else {
                trace!(target: "telford::endpoint", address = %remote_address, "send target has no cluster");
                return Ok(RouteMessageHandleResult::default());
            };
            if !cluster.deliver(&remote_node, receive) {
                trace!(target: "telford::endpoint", address = %remote_address, node = %remote_node, "send target evaporated");
                return Ok(RouteMessageHandleResult::default());
            }
        }

        tokio::select! {
            biased;
            () = self.disposal.cancelled() => Err(RoutingError::Disposed),
            () = token.cancelled() => Err(RoutingError::Canceled),
            outcome = result => match outcome {
                Ok(Completion::Completed(result)) => Ok(result),
                Ok(Completion::Canceled) => Err(RoutingError::Canceled),
                // The receiver was dropped undelivered; soft failure.
                Err(_) => Ok(RouteMessageHandleResult::default()),
            },
        }
    }

    /// Enqueues a delivery on this node's own inbox.
    pub(crate) fn deliver(&self, receive: ReceiveResult) -> bool {
        self.inbox.push(receive).is_ok()
    }

    /// Disposes the end point: rejects further operations, removes it from
    /// its cluster and drops undelivered inbox items (their senders observe
    /// the soft failure). Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(target: "telford::endpoint", address = %self.address, node = %self.cluster_node_id, "disposing end point");
        self.disposal.cancel();
        if let Some(cluster) = self.cluster.upgrade() {
            cluster.remove_node(&self.cluster_node_id);
        }
        let undelivered = self.inbox.close();
        if !undelivered.is_empty() {
            trace!(
                target: "telford::endpoint",
                count = undelivered.len(),
                "dropping undelivered inbox items"
            );
        }
    }

}
