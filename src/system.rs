//! The routing system
//!
//! Registry of end-point clusters indexed by logical address. One mutex
//! serializes every lookup and mutation; clusters leave the map only through
//! their own disposal path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cluster::EndpointCluster;
use crate::domain_types::EndpointAddress;
use crate::endpoint::RouteEndpoint;
use crate::traits::RoutingError;

/// Process-local registry of logical end points.
#[derive(Debug)]
pub struct RoutingSystem {
    clusters: Mutex<HashMap<EndpointAddress, Arc<EndpointCluster>>>,
    disposal: CancellationToken,
    disposed: AtomicBool,
}

impl RoutingSystem {
    /// Creates an empty routing system.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            clusters: Mutex::new(HashMap::new()),
            disposal: CancellationToken::new(),
            disposed: AtomicBool::new(false),
        })
    }

    /// Creates the logical end point for `address` and returns its first
    /// cluster node.
    ///
    /// At most one active cluster exists per address in a process; a second
    /// create for the same address fails with
    /// [`RoutingError::AlreadyPresent`].
    pub fn create_end_point(
        self: &Arc<Self>,
        address: EndpointAddress,
    ) -> Result<Arc<RouteEndpoint>, RoutingError> {
        let mut clusters = self.clusters.lock().expect("routing system mutex poisoned");
        if self.disposal.is_cancelled() {
            return Err(RoutingError::Disposed);
        }
        if clusters.contains_key(&address) {
            return Err(RoutingError::AlreadyPresent { address });
        }

        let cluster = EndpointCluster::new(address.clone(), Arc::downgrade(self));
        let end_point = cluster.create_end_point()?;
        clusters.insert(address.clone(), cluster);

        debug!(target: "telford::system", address = %address, "created end point");
        Ok(end_point)
    }

    /// Looks up the cluster bound to `address`.
    #[must_use]
    pub fn get_cluster(&self, address: &EndpointAddress) -> Option<Arc<EndpointCluster>> {
        self.clusters
            .lock()
            .expect("routing system mutex poisoned")
            .get(address)
            .cloned()
    }

    /// Removes a cluster on its disposal path. The entry is erased only if
    /// it still refers to the caller, so a cluster recreated under the same
    /// address is never evicted by its predecessor's late disposal.
    pub(crate) fn remove_cluster(&self, cluster: &Arc<EndpointCluster>) {
        let mut clusters = self.clusters.lock().expect("routing system mutex poisoned");
        let still_ours = clusters
            .get(cluster.address())
            .is_some_and(|existing| Arc::ptr_eq(existing, cluster));
        if still_ours {
            clusters.remove(cluster.address());
            debug!(target: "telford::system", address = %cluster.address(), "removed cluster");
        }
    }

    /// Disposes every cluster and rejects further creates. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(target: "telford::system", "disposing routing system");
        self.disposal.cancel();
        let clusters: Vec<Arc<EndpointCluster>> = {
            let mut map = self.clusters.lock().expect("routing system mutex poisoned");
            map.drain().map(|(_, cluster)| cluster).collect()
        };
        for cluster in clusters {
            cluster.dispose();
        }
    }

    /// Whether the system has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposal.is_cancelled()
    }
}
