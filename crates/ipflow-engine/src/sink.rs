//! Host integration seam.
//!
//! The engine never talks to a scheduler, a NIC model, or an ICMP module
//! directly; it emits everything through this trait. A recording
//! implementation makes the whole pipeline testable in isolation, and a
//! channel-backed one integrates with an event-driven host.

use std::net::Ipv4Addr;

use ipflow_proto::control::InterfaceId;
use ipflow_proto::{Datagram, DeliveryInfo, IcmpError, LinkFrame, Payload};

/// A datagram leaving through an interface, with link-layer addressing
/// attached once next-hop resolution has happened.
#[derive(Clone, Debug)]
pub struct OutboundFrame {
    /// The datagram to transmit.
    pub datagram: Datagram,
    /// Link-layer control, present on IEEE 802 interfaces after resolution.
    pub link: Option<LinkFrame>,
}

/// Everything the engine can do to the outside world.
pub trait EngineSink {
    /// Hands a frame to an interface's egress queue.
    fn emit_to_interface(&mut self, interface: InterfaceId, frame: OutboundFrame);

    /// Delivers a decapsulated payload to a higher-layer egress slot.
    fn emit_to_transport(&mut self, slot: u32, payload: Payload, info: DeliveryInfo);

    /// Asks the ICMP collaborator to signal `error` about `datagram`.
    /// Ownership of the datagram transfers with the request.
    fn emit_icmp(&mut self, error: IcmpError, datagram: Datagram);

    /// Hands a datagram to the ARP collaborator for next-hop resolution.
    /// The datagram comes back through the engine's ARP ingress once the
    /// address is known.
    fn request_arp(&mut self, interface: InterfaceId, next_hop: Ipv4Addr, datagram: Datagram);
}
