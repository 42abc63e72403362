//! Routing table collaborator seam.
//!
//! Route computation and population (static configuration, RIP, OSPF) live
//! outside the engine; the pipeline only consults this trait synchronously.

use std::net::Ipv4Addr;

use ipflow_proto::control::InterfaceId;

/// Result of a unicast route lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnicastRoute {
    /// Egress interface.
    pub interface: InterfaceId,
    /// Next-hop gateway; `None` for directly attached destinations.
    pub gateway: Option<Ipv4Addr>,
}

/// One downstream branch of a multicast route.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MulticastChild {
    /// Egress interface of this branch.
    pub interface: InterfaceId,
    /// A leaf has no downstream routers and is only forwarded to when a
    /// local listener has joined the group.
    pub leaf: bool,
}

/// Result of a multicast route lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MulticastRoute {
    /// Interface datagrams of this route are expected to arrive on. `None`
    /// falls back to the shortest-path interface toward the source.
    pub parent: Option<InterfaceId>,
    /// Downstream branches, forwarded to in order.
    pub children: Vec<MulticastChild>,
}

/// Unicast and multicast route lookup plus the node-level predicates the
/// forwarding plane depends on.
pub trait RoutingTable {
    /// Best-matching unicast route for `dest`.
    fn best_unicast_route(&self, dest: Ipv4Addr) -> Option<UnicastRoute>;

    /// Best-matching multicast route for a datagram from `origin` to
    /// `group`.
    fn best_multicast_route(&self, origin: Ipv4Addr, group: Ipv4Addr) -> Option<MulticastRoute>;

    /// The interface the unicast table would route `dest` through. Used as
    /// the reverse-path check when a multicast route declares no parent.
    fn interface_toward(&self, dest: Ipv4Addr) -> Option<InterfaceId> {
        self.best_unicast_route(dest).map(|r| r.interface)
    }

    /// True if `addr` is one of this node's own addresses.
    fn is_local_address(&self, addr: Ipv4Addr) -> bool;

    /// The interface whose subnet broadcast address is `addr`, if any.
    fn interface_for_local_broadcast(&self, addr: Ipv4Addr) -> Option<InterfaceId>;

    /// True if this node forwards multicast datagrams.
    fn is_multicast_forwarding_enabled(&self) -> bool;

    /// True if this node forwards unicast datagrams (acts as a router).
    fn is_ip_forwarding_enabled(&self) -> bool;
}
