//! Control info split into direction-specific types.
//!
//! The simulated network layer exchanges metadata with its neighbors in four
//! distinct shapes, one per seam, so each direction only carries the fields
//! that are meaningful there.

use std::net::Ipv4Addr;

use crate::datagram::Datagram;
use crate::mac::MacAddress;

/// Numeric identifier of a network interface.
pub type InterfaceId = u32;

/// Send request metadata attached by the higher layer (HL -> IPv4).
#[derive(Clone, Debug)]
pub struct SendOptions {
    /// Destination address.
    pub dest: Ipv4Addr,
    /// Explicit source address. Must be bound to a local interface; left
    /// unset, the egress interface's address is filled in during routing.
    pub src: Option<Ipv4Addr>,
    /// Egress interface selector (the MULTICAST_IF-style hint).
    pub interface: Option<InterfaceId>,
    /// Explicit next-hop override.
    pub next_hop: Option<Ipv4Addr>,
    /// Transport protocol number.
    pub protocol: u8,
    /// Type-of-service byte.
    pub tos: u8,
    /// Don't-fragment flag.
    pub dont_fragment: bool,
    /// TTL hint; `None` selects the configured default for the destination
    /// class.
    pub ttl: Option<u8>,
    /// Deliver a local copy of multicast sends back to this host.
    pub multicast_loop: bool,
}

impl SendOptions {
    /// Creates options for `dest` and `protocol` with everything else at its
    /// default.
    pub fn to(dest: Ipv4Addr, protocol: u8) -> Self {
        Self {
            dest,
            src: None,
            interface: None,
            next_hop: None,
            protocol,
            tos: 0,
            dont_fragment: false,
            ttl: None,
            multicast_loop: true,
        }
    }
}

/// Delivery metadata handed to the higher layer with a decapsulated payload
/// (IPv4 -> HL).
#[derive(Clone, Debug)]
pub struct DeliveryInfo {
    /// Transport protocol number the payload was carried under.
    pub protocol: u8,
    /// Source address on the wire.
    pub src: Ipv4Addr,
    /// Destination address on the wire.
    pub dst: Ipv4Addr,
    /// Type-of-service byte as received.
    pub tos: u8,
    /// Interface the datagram arrived on; `None` for internally generated
    /// deliveries.
    pub ingress_interface: Option<InterfaceId>,
    /// TTL observed on the wire.
    pub ttl: u8,
    /// The delivered datagram's header (payload already removed), kept so the
    /// higher layer can construct ICMP replies.
    pub orig_datagram: Box<Datagram>,
}

impl DeliveryInfo {
    /// Builds delivery info from a datagram whose payload has been removed.
    pub fn from_datagram(datagram: Datagram, ingress_interface: Option<InterfaceId>) -> Self {
        Self {
            protocol: datagram.protocol(),
            src: datagram.src(),
            dst: datagram.dst(),
            tos: datagram.tos(),
            ingress_interface,
            ttl: datagram.ttl(),
            orig_datagram: Box::new(datagram),
        }
    }
}

/// Link-layer addressing attached to a frame after next-hop resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkFrame {
    /// Destination MAC address.
    pub dst_mac: MacAddress,
    /// Ethertype of the carried payload.
    pub ethertype: u16,
}

/// Registration of a higher-layer protocol with its egress slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProtocolRegistration {
    /// Transport protocol number being claimed.
    pub protocol: u8,
    /// Egress slot, indexed from the registrant's arrival gate.
    pub egress_slot: u32,
}
