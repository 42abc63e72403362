//! Hand-populated routing and ARP tables.
//!
//! Real deployments populate routes from configuration or a routing
//! protocol; these static tables cover simulations and tests where the
//! topology is fixed up front.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;

use ipflow_core::addr;
use ipflow_engine::{ArpCache, MulticastRoute, RoutingTable, UnicastRoute};
use ipflow_proto::control::InterfaceId;
use ipflow_proto::MacAddress;

#[derive(Debug, Clone)]
struct PrefixRoute {
    network: Ipv4Addr,
    netmask: Ipv4Addr,
    route: UnicastRoute,
}

impl PrefixRoute {
    fn matches(&self, dest: Ipv4Addr) -> bool {
        addr::same_subnet(dest, self.network, self.netmask)
    }
}

#[derive(Debug, Clone)]
struct GroupRoute {
    /// Restrict the route to datagrams from this origin subnet; `None`
    /// matches any origin.
    origin: Option<(Ipv4Addr, Ipv4Addr)>,
    group: Ipv4Addr,
    route: MulticastRoute,
}

/// A fixed routing table with longest-prefix unicast matching.
#[derive(Debug, Clone, Default)]
pub struct StaticRoutes {
    unicast: Vec<PrefixRoute>,
    multicast: Vec<GroupRoute>,
    local_addrs: HashSet<Ipv4Addr>,
    local_broadcasts: HashMap<Ipv4Addr, InterfaceId>,
    ip_forwarding: bool,
    multicast_forwarding: bool,
}

impl StaticRoutes {
    /// Creates an empty table with forwarding disabled (host behavior).
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a unicast route for `network`/`netmask`.
    pub fn add_route(
        &mut self,
        network: Ipv4Addr,
        netmask: Ipv4Addr,
        interface: InterfaceId,
        gateway: Option<Ipv4Addr>,
    ) {
        self.unicast.push(PrefixRoute {
            network,
            netmask,
            route: UnicastRoute { interface, gateway },
        });
    }

    /// Adds a default route.
    pub fn add_default_route(&mut self, interface: InterfaceId, gateway: Ipv4Addr) {
        self.add_route(
            Ipv4Addr::new(0, 0, 0, 0),
            Ipv4Addr::new(0, 0, 0, 0),
            interface,
            Some(gateway),
        );
    }

    /// Adds a multicast route for `group`, matching any origin.
    pub fn add_multicast_route(&mut self, group: Ipv4Addr, route: MulticastRoute) {
        self.multicast.push(GroupRoute { origin: None, group, route });
    }

    /// Adds a multicast route restricted to origins in `origin`/`netmask`.
    pub fn add_multicast_route_from(
        &mut self,
        origin: Ipv4Addr,
        netmask: Ipv4Addr,
        group: Ipv4Addr,
        route: MulticastRoute,
    ) {
        self.multicast.push(GroupRoute { origin: Some((origin, netmask)), group, route });
    }

    /// Registers one of this node's own addresses.
    pub fn add_local_address(&mut self, addr: Ipv4Addr) {
        self.local_addrs.insert(addr);
    }

    /// Registers the subnet broadcast address of a local interface.
    pub fn add_local_broadcast(&mut self, addr: Ipv4Addr, interface: InterfaceId) {
        self.local_broadcasts.insert(addr, interface);
    }

    /// Enables or disables unicast forwarding.
    pub fn set_ip_forwarding(&mut self, enabled: bool) {
        self.ip_forwarding = enabled;
    }

    /// Enables or disables multicast forwarding.
    pub fn set_multicast_forwarding(&mut self, enabled: bool) {
        self.multicast_forwarding = enabled;
    }
}

impl RoutingTable for StaticRoutes {
    fn best_unicast_route(&self, dest: Ipv4Addr) -> Option<UnicastRoute> {
        self.unicast
            .iter()
            .filter(|entry| entry.matches(dest))
            .max_by_key(|entry| u32::from(entry.netmask))
            .map(|entry| entry.route)
    }

    fn best_multicast_route(&self, origin: Ipv4Addr, group: Ipv4Addr) -> Option<MulticastRoute> {
        self.multicast
            .iter()
            .filter(|entry| entry.group == group)
            .find(|entry| match entry.origin {
                Some((network, netmask)) => addr::same_subnet(origin, network, netmask),
                None => true,
            })
            .map(|entry| entry.route.clone())
    }

    fn is_local_address(&self, addr: Ipv4Addr) -> bool {
        self.local_addrs.contains(&addr)
    }

    fn interface_for_local_broadcast(&self, addr: Ipv4Addr) -> Option<InterfaceId> {
        self.local_broadcasts.get(&addr).copied()
    }

    fn is_multicast_forwarding_enabled(&self) -> bool {
        self.multicast_forwarding
    }

    fn is_ip_forwarding_enabled(&self) -> bool {
        self.ip_forwarding
    }
}

/// A fixed ARP cache.
#[derive(Debug, Clone, Default)]
pub struct StaticArp {
    entries: HashMap<Ipv4Addr, MacAddress>,
}

impl StaticArp {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a mapping.
    pub fn insert(&mut self, addr: Ipv4Addr, mac: MacAddress) {
        self.entries.insert(addr, mac);
    }
}

impl ArpCache for StaticArp {
    fn resolve(&self, next_hop: Ipv4Addr) -> Option<MacAddress> {
        self.entries.get(&next_hop).copied()
    }
}
