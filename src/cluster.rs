//! End-point clusters
//!
//! A cluster is every concrete node sharing one logical address. It owns the
//! broadcast inbox fed by sends that name no cluster node, hands out
//! monotonic node identifiers, and serializes node creation and removal with
//! its own disposal under a single mutex.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::domain_types::{ClusterNodeId, EndpointAddress};
use crate::endpoint::RouteEndpoint;
use crate::inbox::Inbox;
use crate::receive_result::ReceiveResult;
use crate::system::RoutingSystem;
use crate::traits::RoutingError;

#[derive(Debug)]
struct NodeTable {
    nodes: HashMap<ClusterNodeId, Arc<RouteEndpoint>>,
    next_node_id: u64,
}

/// All cluster nodes bound to one logical end-point address.
#[derive(Debug)]
pub struct EndpointCluster {
    address: EndpointAddress,
    broadcast: Arc<Inbox<ReceiveResult>>,
    nodes: Mutex<NodeTable>,
    disposal: CancellationToken,
    disposed: AtomicBool,
    system: Weak<RoutingSystem>,
}

impl EndpointCluster {
    pub(crate) fn new(address: EndpointAddress, system: Weak<RoutingSystem>) -> Arc<Self> {
        Arc::new(Self {
            address,
            broadcast: Arc::new(Inbox::new()),
            nodes: Mutex::new(NodeTable {
                nodes: HashMap::new(),
                // Counter starts at 1; 0 would encode ambiguously close to
                // the default (empty) identifier in logs.
                next_node_id: 1,
            }),
            disposal: CancellationToken::new(),
            disposed: AtomicBool::new(false),
            system,
        })
    }

    /// The logical address every node in this cluster answers to.
    #[must_use]
    pub fn address(&self) -> &EndpointAddress {
        &self.address
    }

    /// Creates a new node with a freshly allocated identifier.
    ///
    /// Disposal is re-checked after the node is inserted; a cluster disposed
    /// mid-construction disposes the orphan and raises, so no caller ever
    /// holds a node of a dead cluster.
    pub fn create_end_point(self: &Arc<Self>) -> Result<Arc<RouteEndpoint>, RoutingError> {
        if self.disposal.is_cancelled() {
            return Err(RoutingError::Disposed);
        }

        let end_point = {
            let mut table = self.nodes.lock().expect("cluster mutex poisoned");
            let node_id = ClusterNodeId::from_counter(table.next_node_id);
            table.next_node_id += 1;
            let end_point = RouteEndpoint::new(
                self.address.clone(),
                node_id.clone(),
                Arc::downgrade(self),
                Arc::clone(&self.broadcast),
                self.system.clone(),
            );
            table.nodes.insert(node_id, Arc::clone(&end_point));
            end_point
        };

        if self.disposal.is_cancelled() {
            end_point.dispose();
            return Err(RoutingError::Disposed);
        }

        trace!(target: "telford::cluster", address = %self.address, node = %end_point.cluster_node_id(), "created cluster node");
        Ok(end_point)
    }

    /// Looks up one node by identifier.
    pub(crate) fn node(&self, node_id: &ClusterNodeId) -> Option<Arc<RouteEndpoint>> {
        self.nodes
            .lock()
            .expect("cluster mutex poisoned")
            .nodes
            .get(node_id)
            .cloned()
    }

    /// Routes a delivery into the cluster: a named node's inbox, or the
    /// broadcast inbox when no node is named. Returns false when the target
    /// is gone.
    pub(crate) fn deliver(&self, node_id: &ClusterNodeId, receive: ReceiveResult) -> bool {
        if node_id.is_default() {
            self.broadcast.push(receive).is_ok()
        } else {
            match self.node(node_id) {
                Some(node) => node.deliver(receive),
                None => false,
            }
        }
    }

    /// Removes a node from the map. Removing the last node claims disposal
    /// while the mutex is still held, so a concurrent create cannot obtain a
    /// handle to a cluster that is about to disappear.
    pub(crate) fn remove_node(self: &Arc<Self>, node_id: &ClusterNodeId) {
        let claimed = {
            let mut table = self.nodes.lock().expect("cluster mutex poisoned");
            table.nodes.remove(node_id);
            if table.nodes.is_empty() && !self.disposed.swap(true, Ordering::SeqCst) {
                self.disposal.cancel();
                true
            } else {
                false
            }
        };
        if claimed {
            debug!(target: "telford::cluster", address = %self.address, "last node removed, disposing cluster");
            self.finish_disposal();
        }
    }

    /// Disposes the cluster and every node in it. Idempotent.
    pub fn dispose(self: &Arc<Self>) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(target: "telford::cluster", address = %self.address, "disposing cluster");
        self.disposal.cancel();
        self.finish_disposal();
    }

    fn finish_disposal(self: &Arc<Self>) {
        let nodes: Vec<Arc<RouteEndpoint>> = {
            let mut table = self.nodes.lock().expect("cluster mutex poisoned");
            table.nodes.drain().map(|(_, node)| node).collect()
        };
        for node in nodes {
            node.dispose();
        }
        let undelivered = self.broadcast.close();
        if !undelivered.is_empty() {
            trace!(
                target: "telford::cluster",
                address = %self.address,
                count = undelivered.len(),
                "dropping undelivered broadcast items"
            );
        }
        if let Some(system) = self.system.upgrade() {
            system.remove_cluster(self);
        }
    }

    /// Whether the cluster has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposal.is_cancelled()
    }
}
