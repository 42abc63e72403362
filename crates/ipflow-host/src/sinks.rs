//! Sink implementations over the engine's emission seam.

use std::net::Ipv4Addr;

use crossbeam_channel::{Receiver, Sender};
use ipflow_engine::{EngineSink, OutboundFrame};
use ipflow_proto::control::InterfaceId;
use ipflow_proto::{Datagram, DeliveryInfo, IcmpError, Payload};

use crate::event_types::EngineEvent;

/// Sink that records every emission, for driving the engine in tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Vec<EngineEvent>,
}

impl RecordingSink {
    /// Creates an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded events, oldest first.
    pub fn events(&self) -> &[EngineEvent] {
        &self.events
    }

    /// Removes and returns all recorded events.
    pub fn drain(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    /// Frames emitted to interfaces, in emission order.
    pub fn frames(&self) -> impl Iterator<Item = (InterfaceId, &OutboundFrame)> {
        self.events.iter().filter_map(|event| match event {
            EngineEvent::ToInterface { interface, frame } => Some((*interface, frame)),
            _ => None,
        })
    }

    /// Transport deliveries, in emission order.
    pub fn deliveries(&self) -> impl Iterator<Item = (u32, &Payload, &DeliveryInfo)> {
        self.events.iter().filter_map(|event| match event {
            EngineEvent::ToTransport { slot, payload, info } => Some((*slot, payload, info)),
            _ => None,
        })
    }

    /// ICMP requests, in emission order.
    pub fn icmp_requests(&self) -> impl Iterator<Item = (IcmpError, &Datagram)> {
        self.events.iter().filter_map(|event| match event {
            EngineEvent::Icmp { error, datagram } => Some((*error, datagram)),
            _ => None,
        })
    }

    /// ARP resolution requests, in emission order.
    pub fn arp_requests(&self) -> impl Iterator<Item = (InterfaceId, Ipv4Addr, &Datagram)> {
        self.events.iter().filter_map(|event| match event {
            EngineEvent::ArpRequest { interface, next_hop, datagram } => {
                Some((*interface, *next_hop, datagram))
            }
            _ => None,
        })
    }
}

impl EngineSink for RecordingSink {
    fn emit_to_interface(&mut self, interface: InterfaceId, frame: OutboundFrame) {
        self.events.push(EngineEvent::ToInterface { interface, frame });
    }

    fn emit_to_transport(&mut self, slot: u32, payload: Payload, info: DeliveryInfo) {
        self.events.push(EngineEvent::ToTransport { slot, payload, info });
    }

    fn emit_icmp(&mut self, error: IcmpError, datagram: Datagram) {
        self.events.push(EngineEvent::Icmp { error, datagram });
    }

    fn request_arp(&mut self, interface: InterfaceId, next_hop: Ipv4Addr, datagram: Datagram) {
        self.events.push(EngineEvent::ArpRequest { interface, next_hop, datagram });
    }
}

/// Sink that forwards every emission into a channel, decoupling the engine
/// from the host's event loop.
#[derive(Debug)]
pub struct ChannelSink {
    sender: Sender<EngineEvent>,
}

impl ChannelSink {
    /// Creates a sink and the receiver a host loop consumes from.
    pub fn unbounded() -> (Self, Receiver<EngineEvent>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self { sender }, receiver)
    }

    fn push(&mut self, event: EngineEvent) {
        if self.sender.send(event).is_err() {
            tracing::warn!("engine event receiver is gone, dropping event");
        }
    }
}

impl EngineSink for ChannelSink {
    fn emit_to_interface(&mut self, interface: InterfaceId, frame: OutboundFrame) {
        self.push(EngineEvent::ToInterface { interface, frame });
    }

    fn emit_to_transport(&mut self, slot: u32, payload: Payload, info: DeliveryInfo) {
        self.push(EngineEvent::ToTransport { slot, payload, info });
    }

    fn emit_icmp(&mut self, error: IcmpError, datagram: Datagram) {
        self.push(EngineEvent::Icmp { error, datagram });
    }

    fn request_arp(&mut self, interface: InterfaceId, next_hop: Ipv4Addr, datagram: Datagram) {
        self.push(EngineEvent::ArpRequest { interface, next_hop, datagram });
    }
}
