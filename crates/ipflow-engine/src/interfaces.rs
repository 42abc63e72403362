//! Network interface descriptors and the interface table.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use ipflow_core::addr;
use ipflow_proto::control::InterfaceId;
use ipflow_proto::MacAddress;

/// Description of one attached network interface.
#[derive(Clone, Debug)]
pub struct Interface {
    /// Interface identifier, unique within the table.
    pub id: InterfaceId,
    /// Human-readable name for logs.
    pub name: String,
    /// Maximum transmission unit in bytes.
    pub mtu: u16,
    /// True for the loopback interface.
    pub loopback: bool,
    /// True if the interface supports link-layer broadcast.
    pub broadcast: bool,
    /// True if the interface supports multicast.
    pub multicast: bool,
    /// Link-layer address, if the interface has one.
    pub mac: Option<MacAddress>,
    /// Assigned IPv4 address. `None` while address assignment (DHCP) is in
    /// progress.
    pub addr: Option<Ipv4Addr>,
    /// Netmask of the attached subnet.
    pub netmask: Ipv4Addr,
    /// Multicast datagrams with a TTL at or below this threshold are not
    /// forwarded out this interface.
    pub multicast_ttl_threshold: u8,
    joined_groups: HashSet<Ipv4Addr>,
}

impl Interface {
    /// Creates an Ethernet-style interface: broadcast and multicast capable,
    /// with a MAC address.
    pub fn ethernet(
        id: InterfaceId,
        name: &str,
        mtu: u16,
        mac: MacAddress,
        addr: Ipv4Addr,
        netmask: Ipv4Addr,
    ) -> Self {
        Self {
            id,
            name: name.to_owned(),
            mtu,
            loopback: false,
            broadcast: true,
            multicast: true,
            mac: Some(mac),
            addr: Some(addr),
            netmask,
            multicast_ttl_threshold: 0,
            joined_groups: HashSet::new(),
        }
    }

    /// Creates a point-to-point interface without link-layer addressing.
    pub fn point_to_point(id: InterfaceId, name: &str, mtu: u16, addr: Ipv4Addr) -> Self {
        Self {
            id,
            name: name.to_owned(),
            mtu,
            loopback: false,
            broadcast: false,
            multicast: true,
            mac: None,
            addr: Some(addr),
            netmask: Ipv4Addr::new(255, 255, 255, 255),
            multicast_ttl_threshold: 0,
            joined_groups: HashSet::new(),
        }
    }

    /// Creates the loopback interface.
    pub fn loopback(id: InterfaceId) -> Self {
        Self {
            id,
            name: "lo".to_owned(),
            mtu: u16::MAX,
            loopback: true,
            broadcast: false,
            multicast: false,
            mac: None,
            addr: Some(Ipv4Addr::new(127, 0, 0, 1)),
            netmask: Ipv4Addr::new(255, 0, 0, 0),
            multicast_ttl_threshold: 0,
            joined_groups: HashSet::new(),
        }
    }

    /// True if ARP runs on this interface: broadcast capable with a MAC.
    pub fn is_ieee802(&self) -> bool {
        self.broadcast && self.mac.is_some()
    }

    /// Directed broadcast address of the attached subnet.
    pub fn network_broadcast(&self) -> Option<Ipv4Addr> {
        self.addr.map(|a| addr::subnet_broadcast(a, self.netmask))
    }

    /// Joins a multicast group on this interface.
    pub fn join_group(&mut self, group: Ipv4Addr) {
        self.joined_groups.insert(group);
    }

    /// Leaves a multicast group.
    pub fn leave_group(&mut self, group: Ipv4Addr) {
        self.joined_groups.remove(&group);
    }

    /// True if this interface has joined `group`.
    pub fn is_joined(&self, group: Ipv4Addr) -> bool {
        self.joined_groups.contains(&group)
    }
}

/// Ordered collection of the node's interfaces.
///
/// "First" lookups follow insertion order, matching how a node enumerates
/// its interfaces.
#[derive(Clone, Debug, Default)]
pub struct InterfaceTable {
    entries: Vec<Interface>,
}

impl InterfaceTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Adds an interface. Replaces any existing interface with the same id.
    pub fn add(&mut self, interface: Interface) {
        self.entries.retain(|e| e.id != interface.id);
        self.entries.push(interface);
    }

    /// Returns the interface with the given id.
    pub fn get(&self, id: InterfaceId) -> Option<&Interface> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Mutable access to the interface with the given id.
    pub fn get_mut(&mut self, id: InterfaceId) -> Option<&mut Interface> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    /// True if the table holds no interfaces.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of interfaces.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterates over all interfaces in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Interface> {
        self.entries.iter()
    }

    /// Ids of all interfaces in insertion order.
    pub fn ids(&self) -> Vec<InterfaceId> {
        self.entries.iter().map(|e| e.id).collect()
    }

    /// The first loopback interface, if any.
    pub fn first_loopback(&self) -> Option<InterfaceId> {
        self.entries.iter().find(|e| e.loopback).map(|e| e.id)
    }

    /// The first multicast-capable, non-loopback interface, if any.
    pub fn first_multicast_capable(&self) -> Option<InterfaceId> {
        self.entries
            .iter()
            .find(|e| e.multicast && !e.loopback)
            .map(|e| e.id)
    }

    /// The interface that owns `addr`, if any.
    pub fn by_address(&self, addr: Ipv4Addr) -> Option<InterfaceId> {
        self.entries
            .iter()
            .find(|e| e.addr == Some(addr))
            .map(|e| e.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> InterfaceTable {
        let mut table = InterfaceTable::new();
        table.add(Interface::loopback(0));
        table.add(Interface::ethernet(
            1,
            "eth0",
            1500,
            MacAddress([0, 1, 2, 3, 4, 5]),
            Ipv4Addr::new(192, 168, 1, 1),
            Ipv4Addr::new(255, 255, 255, 0),
        ));
        table
    }

    #[test]
    fn test_first_lookups() {
        let table = sample_table();
        assert_eq!(table.first_loopback(), Some(0));
        assert_eq!(table.first_multicast_capable(), Some(1));
        assert_eq!(table.by_address(Ipv4Addr::new(192, 168, 1, 1)), Some(1));
        assert_eq!(table.by_address(Ipv4Addr::new(10, 0, 0, 1)), None);
    }

    #[test]
    fn test_ieee802_requires_broadcast_and_mac() {
        let table = sample_table();
        assert!(table.get(1).unwrap().is_ieee802());
        assert!(!table.get(0).unwrap().is_ieee802());

        let p2p = Interface::point_to_point(2, "ppp0", 1400, Ipv4Addr::new(10, 9, 9, 1));
        assert!(!p2p.is_ieee802());
    }

    #[test]
    fn test_network_broadcast() {
        let table = sample_table();
        assert_eq!(
            table.get(1).unwrap().network_broadcast(),
            Some(Ipv4Addr::new(192, 168, 1, 255))
        );
    }

    #[test]
    fn test_group_membership() {
        let mut table = sample_table();
        let group = Ipv4Addr::new(224, 1, 2, 3);
        assert!(!table.get(1).unwrap().is_joined(group));

        table.get_mut(1).unwrap().join_group(group);
        assert!(table.get(1).unwrap().is_joined(group));

        table.get_mut(1).unwrap().leave_group(group);
        assert!(!table.get(1).unwrap().is_joined(group));
    }

    #[test]
    fn test_add_replaces_same_id() {
        let mut table = sample_table();
        let mut replacement = Interface::ethernet(
            1,
            "eth0b",
            9000,
            MacAddress([9; 6]),
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(255, 0, 0, 0),
        );
        replacement.multicast_ttl_threshold = 4;
        table.add(replacement);

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1).unwrap().mtu, 9000);
    }
}
