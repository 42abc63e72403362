//! Event types for host integration.
//!
//! Each variant mirrors one method of the engine's sink seam, so a host
//! loop (or a test) can consume everything the engine does as a single
//! event stream.

use std::net::Ipv4Addr;

use ipflow_engine::OutboundFrame;
use ipflow_proto::control::InterfaceId;
use ipflow_proto::{Datagram, DeliveryInfo, IcmpError, Payload};

/// One externally visible action taken by the engine.
#[derive(Debug)]
pub enum EngineEvent {
    /// A frame was handed to an interface's egress queue.
    ToInterface {
        /// Egress interface.
        interface: InterfaceId,
        /// The frame, with link control attached where resolution happened.
        frame: OutboundFrame,
    },
    /// A payload was delivered to a higher-layer egress slot.
    ToTransport {
        /// Egress slot from the protocol registration.
        slot: u32,
        /// The decapsulated payload.
        payload: Payload,
        /// Delivery metadata.
        info: DeliveryInfo,
    },
    /// The ICMP collaborator was asked to signal an error.
    Icmp {
        /// The error condition.
        error: IcmpError,
        /// The offending datagram, ownership included.
        datagram: Datagram,
    },
    /// A datagram was handed to the ARP collaborator for resolution.
    ArpRequest {
        /// Interface the datagram will leave through.
        interface: InterfaceId,
        /// Address to resolve.
        next_hop: Ipv4Addr,
        /// The pending datagram, ownership included.
        datagram: Datagram,
    },
}
