//! Domain types for the routing fabric
//!
//! Strongly-typed values for addresses, cluster nodes, scopes, routes and
//! registration metadata, so that the router never traffics in bare byte
//! buffers or strings.

use bitflags::bitflags;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::message::Message;

/// Logical name of a mailbox.
///
/// Addresses are opaque byte strings compared by content. The distinguished
/// [`EndpointAddress::UNKNOWN`] value (the empty address) never names a real
/// end point; route targets carrying it are skipped during dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointAddress(Bytes);

impl EndpointAddress {
    /// The sentinel address that names no end point.
    pub const UNKNOWN: Self = Self(Bytes::new());

    /// Creates an address from raw bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Whether this is the [`UNKNOWN`](Self::UNKNOWN) sentinel.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.0.is_empty()
    }

    /// The raw address bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for EndpointAddress {
    fn from(value: &str) -> Self {
        Self(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl From<String> for EndpointAddress {
    fn from(value: String) -> Self {
        Self(Bytes::from(value.into_bytes()))
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            write!(f, "<unknown>")
        } else {
            write!(f, "{}", String::from_utf8_lossy(&self.0))
        }
    }
}

/// Per-cluster tag identifying one concrete end point within a cluster.
///
/// The default (empty) identifier means "any node in the cluster"; sends
/// carrying it land in the cluster's broadcast inbox instead of a specific
/// node's inbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterNodeId(Bytes);

impl ClusterNodeId {
    /// Creates an identifier from raw bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Encodes a cluster-local counter value as a fixed-width identifier.
    ///
    /// Fixed-width big-endian encoding keeps equality unambiguous across
    /// creations: no counter value is a prefix of another.
    #[must_use]
    pub fn from_counter(value: u64) -> Self {
        Self(Bytes::copy_from_slice(&value.to_be_bytes()))
    }

    /// Whether this is the broadcast-eligible default identifier.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.0.is_empty()
    }

    /// The raw identifier bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ClusterNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            write!(f, "<any>")
        } else {
            for byte in &self.0 {
                write!(f, "{byte:02x}")?;
            }
            Ok(())
        }
    }
}

/// Identifies "who, on which cluster node, for which call".
///
/// A scope names an end-point address, a cluster node within it, and a
/// per-router sequence number distinguishing calls originating from the same
/// node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EndpointScope {
    address: EndpointAddress,
    cluster_node_id: ClusterNodeId,
    seq: i64,
}

impl EndpointScope {
    /// The distinguished scope that names nothing.
    pub const NO_SCOPE: Self = Self {
        address: EndpointAddress::UNKNOWN,
        cluster_node_id: ClusterNodeId(Bytes::new()),
        seq: 0,
    };

    /// Creates a scope from its parts.
    pub fn new(address: EndpointAddress, cluster_node_id: ClusterNodeId, seq: i64) -> Self {
        Self {
            address,
            cluster_node_id,
            seq,
        }
    }

    /// The logical end-point address.
    #[must_use]
    pub fn address(&self) -> &EndpointAddress {
        &self.address
    }

    /// The cluster node within the address.
    #[must_use]
    pub fn cluster_node_id(&self) -> &ClusterNodeId {
        &self.cluster_node_id
    }

    /// The per-router call sequence number.
    #[must_use]
    pub fn seq(&self) -> i64 {
        self.seq
    }

    /// Whether this is [`NO_SCOPE`](Self::NO_SCOPE).
    #[must_use]
    pub fn is_no_scope(&self) -> bool {
        *self == Self::NO_SCOPE
    }

    /// Whether a request originating under `self` may be satisfied by the
    /// end point `other` names: identical address and cluster node.
    ///
    /// Sequence numbers are deliberately not compared; they distinguish
    /// calls, not end points.
    #[must_use]
    pub fn route_compatible(&self, other: &EndpointScope) -> bool {
        self.address == other.address && self.cluster_node_id == other.cluster_node_id
    }
}

impl fmt::Display for EndpointScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.address, self.cluster_node_id, self.seq)
    }
}

/// Hierarchical lexical key used to look up interested end points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Route(String);

impl Route {
    /// Creates a route key.
    pub fn new(route: impl Into<String>) -> Self {
        Self(route.into())
    }

    /// The route key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Route {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered sequence of routes representing the "most specific first" chain
/// the router walks during dispatch. Iteration order is significant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteHierarchy(Vec<Route>);

impl RouteHierarchy {
    /// Creates a hierarchy from an ordered list of routes.
    pub fn new(routes: Vec<Route>) -> Self {
        Self(routes)
    }

    /// Whether the hierarchy contains no routes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The number of route levels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates the routes most specific first.
    pub fn iter(&self) -> std::slice::Iter<'_, Route> {
        self.0.iter()
    }
}

impl From<Vec<Route>> for RouteHierarchy {
    fn from(routes: Vec<Route>) -> Self {
        Self(routes)
    }
}

impl<'a> IntoIterator for &'a RouteHierarchy {
    type Item = &'a Route;
    type IntoIter = std::slice::Iter<'a, Route>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

bitflags! {
    /// Flags attached to a route registration.
    ///
    /// Unknown bits are preserved on the value and ignored by the router, so
    /// registrations written by newer components keep their meaning when read
    /// back.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct RouteRegistrationOptions: u32 {
        /// The registration only matches publish dispatch; p2p dispatch
        /// skips it.
        const PUBLISH_ONLY = 1 << 0;
        /// The registration may only be dispatched from the end point that
        /// owns it; matches seen from other end points are filtered out.
        const LOCAL_DISPATCH_ONLY = 1 << 1;
    }
}

/// One route-table match: the registered end point and its options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    end_point: EndpointAddress,
    options: RouteRegistrationOptions,
}

impl RouteTarget {
    /// Creates a target from an address and registration options.
    pub fn new(end_point: EndpointAddress, options: RouteRegistrationOptions) -> Self {
        Self { end_point, options }
    }

    /// The registered end-point address.
    #[must_use]
    pub fn end_point(&self) -> &EndpointAddress {
        &self.end_point
    }

    /// The registration options recorded with the route.
    #[must_use]
    pub fn options(&self) -> RouteRegistrationOptions {
        self.options
    }
}

/// A route plus its registration options, as handed to the route manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRegistration {
    route: Route,
    options: RouteRegistrationOptions,
}

impl RouteRegistration {
    /// Creates a registration for a route.
    pub fn new(route: Route, options: RouteRegistrationOptions) -> Self {
        Self { route, options }
    }

    /// The registered route.
    #[must_use]
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// The registration options.
    #[must_use]
    pub fn options(&self) -> RouteRegistrationOptions {
        self.options
    }
}

/// A message paired with its dispatch data.
///
/// The message part crosses buffers and carries the encoded routing frame;
/// the dispatch data is an opaque payload higher layers attach for local
/// dispatch, where it survives as a value instead of bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMessage {
    message: Message,
    dispatch_data: Bytes,
}

impl RouteMessage {
    /// Creates a route message from a message and its dispatch data.
    pub fn new(message: Message, dispatch_data: Bytes) -> Self {
        Self {
            message,
            dispatch_data,
        }
    }

    /// Creates a route message carrying only a message.
    pub fn from_message(message: Message) -> Self {
        Self {
            message,
            dispatch_data: Bytes::new(),
        }
    }

    /// The transported message.
    #[must_use]
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// The opaque dispatch data.
    #[must_use]
    pub fn dispatch_data(&self) -> &Bytes {
        &self.dispatch_data
    }

    /// Consumes the route message, yielding the transported message.
    #[must_use]
    pub fn into_message(self) -> Message {
        self.message
    }
}

/// The receiver's verdict on one dispatched message.
///
/// `handled` is the receiver's signal that it took responsibility for the
/// message. The default value (no message, not handled) doubles as the soft
/// failure reported when a target evaporated or declined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMessageHandleResult {
    route_message: RouteMessage,
    handled: bool,
}

impl RouteMessageHandleResult {
    /// Creates a handled result carrying the receiver's response message.
    pub fn handled(route_message: RouteMessage) -> Self {
        Self {
            route_message,
            handled: true,
        }
    }

    /// Whether the receiver took responsibility for the message.
    #[must_use]
    pub fn is_handled(&self) -> bool {
        self.handled
    }

    /// The response route message (default when not handled).
    #[must_use]
    pub fn route_message(&self) -> &RouteMessage {
        &self.route_message
    }

    /// Consumes the result, yielding the response route message.
    #[must_use]
    pub fn into_route_message(self) -> RouteMessage {
        self.route_message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_address_is_distinguished() {
        assert!(EndpointAddress::UNKNOWN.is_unknown());
        assert!(!EndpointAddress::from("a").is_unknown());
        assert_eq!(EndpointAddress::default(), EndpointAddress::UNKNOWN);
    }

    #[test]
    fn addresses_compare_by_content() {
        assert_eq!(
            EndpointAddress::from("a"),
            EndpointAddress::new("a".as_bytes().to_vec())
        );
        assert_ne!(EndpointAddress::from("a"), EndpointAddress::from("b"));
    }

    #[test]
    fn counter_node_ids_are_fixed_width_and_unique() {
        let first = ClusterNodeId::from_counter(1);
        let second = ClusterNodeId::from_counter(256);
        assert_eq!(first.as_bytes().len(), 8);
        assert_eq!(second.as_bytes().len(), 8);
        assert_ne!(first, second);
        assert!(!first.is_default());
        assert!(ClusterNodeId::default().is_default());
    }

    #[test]
    fn route_compatibility_ignores_seq() {
        let a = EndpointScope::new("a".into(), ClusterNodeId::from_counter(1), 1);
        let b = EndpointScope::new("a".into(), ClusterNodeId::from_counter(1), 42);
        let c = EndpointScope::new("a".into(), ClusterNodeId::from_counter(2), 1);
        assert!(a.route_compatible(&b));
        assert!(!a.route_compatible(&c));
    }

    #[test]
    fn no_scope_is_default() {
        assert!(EndpointScope::NO_SCOPE.is_no_scope());
        assert!(EndpointScope::default().is_no_scope());
        let real = EndpointScope::new("a".into(), ClusterNodeId::default(), 0);
        assert!(!real.is_no_scope());
    }

    #[test]
    fn unknown_option_bits_are_retained() {
        let options = RouteRegistrationOptions::from_bits_retain(
            RouteRegistrationOptions::PUBLISH_ONLY.bits() | 0x8000_0000,
        );
        assert!(options.contains(RouteRegistrationOptions::PUBLISH_ONLY));
        assert_eq!(options.bits() & 0x8000_0000, 0x8000_0000);
    }

    #[test]
    fn unhandled_result_is_default() {
        let result = RouteMessageHandleResult::default();
        assert!(!result.is_handled());
        assert_eq!(*result.route_message(), RouteMessage::default());
    }
}
